//! Sessions: one configured conversational context with a backend, driving
//! one exchange at a time.

mod driver;
pub mod events;
pub mod exchange;

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::llm::{ChatModel, FixedModel, ModelProvider};
use crate::tools::{ToolContext, ToolRegistry, ToolSpec};
use driver::SessionShared;

pub use events::{EventDispatcher, EventHandler, EventKind, SessionEvent, Subscription};
pub use exchange::{ExchangeOutcome, ExchangePhase, PendingExchange};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely, \
and use the provided tools whenever they can give a more accurate answer.";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SystemMessageMode {
    /// Add the content after the default system prompt.
    #[default]
    Append,
    /// Use the content instead of the default system prompt.
    Replace,
}

impl FromStr for SystemMessageMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(SystemMessageMode::Append),
            "replace" => Ok(SystemMessageMode::Replace),
            other => Err(format!("unknown system message mode '{other}' (expected append or replace)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemMessage {
    pub mode: SystemMessageMode,
    pub content: String,
}

impl SystemMessage {
    pub fn resolve(message: Option<&SystemMessage>) -> String {
        match message {
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
            Some(SystemMessage {
                mode: SystemMessageMode::Append,
                content,
            }) => format!("{DEFAULT_SYSTEM_PROMPT}\n\n{content}"),
            Some(SystemMessage {
                mode: SystemMessageMode::Replace,
                content,
            }) => content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub streaming: bool,
    pub system_message: Option<SystemMessage>,
    pub tools: Vec<ToolSpec>,
    pub context: ToolContext,
    pub max_turns: u32,
    pub exchange_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            streaming: false,
            system_message: None,
            tools: Vec::new(),
            context: ToolContext::new(),
            max_turns: 24,
            exchange_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn system_message(mut self, mode: SystemMessageMode, content: impl Into<String>) -> Self {
        self.system_message = Some(SystemMessage {
            mode,
            content: content.into(),
        });
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn context(mut self, context: ToolContext) -> Self {
        self.context = context;
        self
    }

    /// Hands a resource to the session's tools.
    pub fn resource<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.context.insert(value);
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn exchange_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exchange_timeout = timeout;
        self
    }
}

/// Entry point for creating sessions against a backend.
#[derive(Clone)]
pub struct AgentClient {
    provider: Arc<dyn ModelProvider>,
}

impl AgentClient {
    pub fn new<P>(provider: P) -> Self
    where
        P: ModelProvider + 'static,
    {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// A client whose sessions all use `model`, whatever model id they name.
    pub fn with_model<M>(model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        Self::new(FixedModel(Arc::new(model)))
    }

    pub fn create_session(&self, config: SessionConfig) -> Result<Session, SessionError> {
        if config.model.trim().is_empty() {
            return Err(SessionError::Config("model identifier is empty".to_string()));
        }
        if config.max_turns == 0 {
            return Err(SessionError::Config("max_turns must be at least 1".to_string()));
        }

        let model = self.provider.model(&config.model)?;
        let registry = ToolRegistry::new(config.tools, config.context)?;
        let id = format!("session-{}", NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));

        info!(
            session = %id,
            model = %config.model,
            streaming = config.streaming,
            tools = registry.len(),
            "session created"
        );

        let shared = SessionShared {
            id,
            model_id: config.model,
            model,
            registry,
            streaming: config.streaming,
            max_turns: config.max_turns,
            system_prompt: SystemMessage::resolve(config.system_message.as_ref()),
            history: tokio::sync::Mutex::new(Vec::new()),
            phase: Arc::new(Mutex::new(ExchangePhase::Idle)),
            dispatcher: EventDispatcher::new(),
        };

        Ok(Session {
            shared: Arc::new(shared),
            exchange_timeout: config.exchange_timeout,
            running: Mutex::new(None),
        })
    }
}

/// A live session. Dropping it aborts any in-flight exchange and stops event
/// delivery.
pub struct Session {
    shared: Arc<SessionShared>,
    exchange_timeout: Option<Duration>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn model(&self) -> &str {
        &self.shared.model_id
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming
    }

    pub fn phase(&self) -> ExchangePhase {
        self.shared.phase()
    }

    /// Registers the session's event handler, replacing any earlier one.
    pub fn on<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.shared.dispatcher.register(handler)
    }

    pub fn on_events<H>(&self, handler: H) -> Subscription
    where
        H: EventHandler + 'static,
    {
        self.shared.dispatcher.register_handler(handler)
    }

    /// Starts an exchange and returns without waiting for it. Must be called
    /// from within a Tokio runtime.
    pub fn send(&self, prompt: impl Into<String>) -> Result<PendingExchange, SessionError> {
        {
            let mut phase = self
                .shared
                .phase
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *phase = phase.on_send()?;
        }

        let prompt = prompt.into();
        debug!(session = %self.shared.id, chars = prompt.len(), "prompt sent");

        let (signal, pending) = exchange::completion_channel();
        let ticket = exchange::ExchangeTicket::new(
            self.shared.phase.clone(),
            self.shared.dispatcher.clone(),
            signal,
        );
        let task = tokio::spawn(driver::run_exchange(self.shared.clone(), prompt, ticket));
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(pending)
    }

    /// Sends and waits for the terminal event. If the session timeout elapses
    /// the exchange is aborted before [`SessionError::Timeout`] is returned.
    pub async fn send_and_wait(
        &self,
        prompt: impl Into<String>,
    ) -> Result<ExchangeOutcome, SessionError> {
        let pending = self.send(prompt)?;
        let Some(after) = self.exchange_timeout else {
            return pending.wait().await;
        };

        let result = pending.wait_timeout(after).await;
        if matches!(result, Err(SessionError::Timeout { .. })) {
            self.abort().await;
        }
        result
    }

    /// Cancels the in-flight exchange, if any, and waits until the session
    /// is ready for the next prompt. A cancelled exchange ends with a
    /// `SessionError` event and keeps none of its history.
    pub async fn abort(&self) {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            debug!(session = %self.shared.id, "exchange aborted");
        }
    }

    /// Number of messages retained as conversation context.
    pub async fn history_len(&self) -> usize {
        self.shared.history.lock().await.len()
    }

    pub fn dispose(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        // Handler first, so the cancelled exchange reports to nobody.
        self.shared.dispatcher.clear();
        let task = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        info!(session = %self.shared.id, "session disposed");
    }
}

#[cfg(test)]
mod tests;
