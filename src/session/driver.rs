use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tracing::{debug, error, warn};

use crate::error::{ProviderError, SessionError};
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelStreamChunk, ModelToolChoice,
    ModelToolDefinition,
};
use crate::session::events::{EventDispatcher, SessionEvent};
use crate::session::exchange::{ExchangeOutcome, ExchangePhase, ExchangeTicket};
use crate::tools::ToolRegistry;

/// State shared between a [`crate::Session`] handle and its exchange tasks.
pub(crate) struct SessionShared {
    pub(crate) id: String,
    pub(crate) model_id: String,
    pub(crate) model: Arc<dyn ChatModel>,
    pub(crate) registry: ToolRegistry,
    pub(crate) streaming: bool,
    pub(crate) max_turns: u32,
    pub(crate) system_prompt: String,
    pub(crate) history: tokio::sync::Mutex<Vec<ModelMessage>>,
    pub(crate) phase: Arc<Mutex<ExchangePhase>>,
    pub(crate) dispatcher: EventDispatcher,
}

impl SessionShared {
    pub(crate) fn phase(&self) -> ExchangePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks the event against the exchange phase, delivers it, then commits
    /// the new phase. Out-of-order events are dropped.
    fn emit(&self, event: SessionEvent) {
        let next = match self.phase().on_event(&event) {
            Ok(next) => next,
            Err(err) => {
                error!(session = %self.id, error = %err, "dropping out-of-order event");
                return;
            }
        };

        debug!(session = %self.id, kind = event.kind().as_str(), "event");
        self.dispatcher.dispatch(&event);
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

pub(crate) async fn run_exchange(shared: Arc<SessionShared>, prompt: String, ticket: ExchangeTicket) {
    let result = drive(&shared, prompt).await;

    match &result {
        Ok(outcome) => {
            debug!(
                session = %shared.id,
                turns = outcome.turns,
                tool_calls = outcome.tool_calls,
                "exchange completed"
            );
            shared.emit(SessionEvent::SessionIdle);
        }
        Err(err) => {
            error!(session = %shared.id, error = %err, "exchange failed");
            shared.emit(SessionEvent::SessionError {
                message: err.to_string(),
            });
        }
    }

    ticket.finish(result);
}

/// Runs the exchange on a copy of the history. The copy is kept once the
/// exchange ends, so a cancelled exchange leaves no unanswered tool call.
async fn drive(shared: &SessionShared, prompt: String) -> Result<ExchangeOutcome, SessionError> {
    let mut history = shared.history.lock().await;
    let mut working = history.clone();
    let result = drive_turns(shared, &mut working, prompt).await;
    *history = working;
    result
}

async fn drive_turns(
    shared: &SessionShared,
    history: &mut Vec<ModelMessage>,
    prompt: String,
) -> Result<ExchangeOutcome, SessionError> {
    if history.is_empty() {
        history.push(ModelMessage::System(shared.system_prompt.clone()));
    }
    history.push(ModelMessage::User(prompt));

    let definitions = shared.registry.definitions();
    let tool_choice = if definitions.is_empty() {
        ModelToolChoice::None
    } else {
        ModelToolChoice::Auto
    };

    let mut outcome = ExchangeOutcome::default();

    for turn in 1..=shared.max_turns {
        outcome.turns = turn;

        let completion = if shared.streaming {
            stream_turn(shared, history, &definitions, tool_choice.clone()).await?
        } else {
            shared
                .model
                .invoke(history, &definitions, tool_choice.clone())
                .await?
        };

        history.push(ModelMessage::Assistant {
            content: completion.text.clone(),
            tool_calls: completion.tool_calls.clone(),
        });

        if let Some(text) = completion.text.as_ref().filter(|text| !text.is_empty()) {
            shared.emit(SessionEvent::AssistantMessage {
                content: text.clone(),
            });
            outcome.message = Some(text.clone());
        }

        if completion.tool_calls.is_empty() {
            return Ok(outcome);
        }

        for call in &completion.tool_calls {
            shared.emit(SessionEvent::ToolExecutionStart {
                tool_call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            });

            let result = shared.registry.invoke(call).await;
            history.push(ModelMessage::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: result.render(),
                is_error: !result.success,
            });
            outcome.tool_calls += 1;

            shared.emit(SessionEvent::ToolExecutionComplete {
                tool_call_id: call.id.clone(),
                tool: call.name.clone(),
                result,
            });
        }
    }

    Err(SessionError::MaxTurnsReached {
        max_turns: shared.max_turns,
    })
}

async fn stream_turn(
    shared: &SessionShared,
    messages: &[ModelMessage],
    tools: &[ModelToolDefinition],
    tool_choice: ModelToolChoice,
) -> Result<ModelCompletion, SessionError> {
    let mut stream = shared.model.invoke_stream(messages, tools, tool_choice);
    let mut streamed = String::new();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            ModelStreamChunk::TextDelta(delta) => {
                if delta.is_empty() {
                    continue;
                }
                streamed.push_str(&delta);
                shared.emit(SessionEvent::MessageDelta { delta });
            }
            ModelStreamChunk::Completed(mut completion) => {
                if !streamed.is_empty() && completion.text.as_deref() != Some(streamed.as_str()) {
                    warn!(
                        session = %shared.id,
                        "completed text differs from streamed deltas; keeping streamed text"
                    );
                    completion.text = Some(streamed);
                }
                return Ok(completion);
            }
        }
    }

    Err(ProviderError::Response("stream ended before the turn completed".to_string()).into())
}
