//! Lifecycle events of an exchange and the single-handler dispatcher that
//! delivers them.
//!
//! Events for one exchange arrive in this order: any number of
//! `MessageDelta`, `AssistantMessage` and tool start/complete pairs, then
//! exactly one of `SessionIdle` or `SessionError`.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use crate::tools::ToolResult;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Incremental assistant text, only emitted on streaming sessions.
    MessageDelta { delta: String },
    /// The complete text of one assistant message.
    AssistantMessage { content: String },
    ToolExecutionStart {
        tool_call_id: String,
        tool: String,
        arguments: Value,
    },
    ToolExecutionComplete {
        tool_call_id: String,
        tool: String,
        result: ToolResult,
    },
    /// The exchange finished successfully.
    SessionIdle,
    /// The exchange failed.
    SessionError { message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageDelta,
    AssistantMessage,
    ToolExecutionStart,
    ToolExecutionComplete,
    SessionIdle,
    SessionError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MessageDelta,
        EventKind::AssistantMessage,
        EventKind::ToolExecutionStart,
        EventKind::ToolExecutionComplete,
        EventKind::SessionIdle,
        EventKind::SessionError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageDelta => "message_delta",
            EventKind::AssistantMessage => "assistant_message",
            EventKind::ToolExecutionStart => "tool_execution_start",
            EventKind::ToolExecutionComplete => "tool_execution_complete",
            EventKind::SessionIdle => "session_idle",
            EventKind::SessionError => "session_error",
        }
    }
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::MessageDelta { .. } => EventKind::MessageDelta,
            SessionEvent::AssistantMessage { .. } => EventKind::AssistantMessage,
            SessionEvent::ToolExecutionStart { .. } => EventKind::ToolExecutionStart,
            SessionEvent::ToolExecutionComplete { .. } => EventKind::ToolExecutionComplete,
            SessionEvent::SessionIdle => EventKind::SessionIdle,
            SessionEvent::SessionError { .. } => EventKind::SessionError,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::SessionIdle | SessionEvent::SessionError { .. }
        )
    }
}

/// A handler with one method per event kind.
///
/// No method has a default body, so adding an event kind fails to compile
/// until every handler covers it.
pub trait EventHandler: Send {
    fn on_message_delta(&mut self, delta: &str);
    fn on_assistant_message(&mut self, content: &str);
    fn on_tool_start(&mut self, tool_call_id: &str, tool: &str, arguments: &Value);
    fn on_tool_complete(&mut self, tool_call_id: &str, tool: &str, result: &ToolResult);
    fn on_idle(&mut self);
    fn on_error(&mut self, message: &str);

    fn handle(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::MessageDelta { delta } => self.on_message_delta(delta),
            SessionEvent::AssistantMessage { content } => self.on_assistant_message(content),
            SessionEvent::ToolExecutionStart {
                tool_call_id,
                tool,
                arguments,
            } => self.on_tool_start(tool_call_id, tool, arguments),
            SessionEvent::ToolExecutionComplete {
                tool_call_id,
                tool,
                result,
            } => self.on_tool_complete(tool_call_id, tool, result),
            SessionEvent::SessionIdle => self.on_idle(),
            SessionEvent::SessionError { message } => self.on_error(message),
        }
    }
}

type BoxedHandler = Box<dyn FnMut(&SessionEvent) + Send>;

#[derive(Default)]
struct HandlerSlot {
    next_id: u64,
    active: Option<(u64, BoxedHandler)>,
}

/// Holds at most one handler and calls it synchronously, in emission order.
///
/// Handlers run while the slot is locked and must not register or dispose
/// subscriptions on the same dispatcher.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    slot: Arc<Mutex<HandlerSlot>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, replacing any earlier one.
    pub fn register<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.next_id += 1;
        let id = slot.next_id;
        if slot.active.replace((id, Box::new(handler))).is_some() {
            warn!(subscription = id, "replacing existing event handler");
        }

        Subscription {
            id,
            slot: Arc::downgrade(&self.slot),
        }
    }

    pub fn register_handler<H>(&self, mut handler: H) -> Subscription
    where
        H: EventHandler + 'static,
    {
        self.register(move |event| handler.handle(event))
    }

    /// Returns whether a handler received the event.
    pub fn dispatch(&self, event: &SessionEvent) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.active.as_mut() {
            Some((_, handler)) => {
                handler(event);
                true
            }
            None => {
                debug!(kind = event.kind().as_str(), "no handler registered; event dropped");
                false
            }
        }
    }

    pub fn has_handler(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .is_some()
    }

    pub(crate) fn clear(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active = None;
    }
}

/// Keeps a handler installed; disposing or dropping it stops delivery.
#[must_use = "dropping a Subscription immediately unregisters its handler"]
pub struct Subscription {
    id: u64,
    slot: Weak<Mutex<HandlerSlot>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| {
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .active
                .as_ref()
                .is_some_and(|(id, _)| *id == self.id)
        })
    }

    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.active.as_ref().is_some_and(|(id, _)| *id == self.id) {
            slot.active = None;
        }
    }
}
