use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::error;

use crate::error::SessionError;
use crate::session::events::{EventDispatcher, SessionEvent};

/// Where a session is in its current exchange.
///
/// `Idle -> Sent -> Streaming* -> Completed | Errored`; a terminal phase
/// accepts a new send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExchangePhase {
    #[default]
    Idle,
    Sent,
    Streaming,
    Completed,
    Errored,
}

impl ExchangePhase {
    pub fn is_pending(self) -> bool {
        matches!(self, ExchangePhase::Sent | ExchangePhase::Streaming)
    }

    pub fn on_send(self) -> Result<Self, SessionError> {
        if self.is_pending() {
            return Err(SessionError::ExchangeInFlight);
        }
        Ok(ExchangePhase::Sent)
    }

    pub fn on_event(self, event: &SessionEvent) -> Result<Self, SessionError> {
        if !self.is_pending() {
            return Err(SessionError::InvalidTransition {
                from: self,
                event: event.kind().as_str(),
            });
        }

        Ok(match event {
            SessionEvent::SessionIdle => ExchangePhase::Completed,
            SessionEvent::SessionError { .. } => ExchangePhase::Errored,
            SessionEvent::MessageDelta { .. }
            | SessionEvent::AssistantMessage { .. }
            | SessionEvent::ToolExecutionStart { .. }
            | SessionEvent::ToolExecutionComplete { .. } => ExchangePhase::Streaming,
        })
    }
}

/// What a successful exchange produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Text of the last assistant message, if any.
    pub message: Option<String>,
    pub tool_calls: usize,
    pub turns: u32,
}

type ExchangeResult = Result<ExchangeOutcome, SessionError>;

/// Sending half of a pending exchange. Resolves at most once; dropping it
/// unresolved resolves the waiter with [`SessionError::ExchangeAbandoned`].
pub(crate) struct CompletionSignal {
    sender: Option<oneshot::Sender<ExchangeResult>>,
}

impl CompletionSignal {
    pub(crate) fn resolve(&mut self, result: ExchangeResult) -> Result<(), SessionError> {
        let sender = self.sender.take().ok_or(SessionError::AlreadyResolved)?;
        // The waiter may have gone away; that is not an error for the exchange.
        let _ = sender.send(result);
        Ok(())
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.sender.is_none()
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err(SessionError::ExchangeAbandoned));
        }
    }
}

pub(crate) fn completion_channel() -> (CompletionSignal, PendingExchange) {
    let (sender, receiver) = oneshot::channel();
    (
        CompletionSignal {
            sender: Some(sender),
        },
        PendingExchange { receiver },
    )
}

/// Awaitable result of one sent prompt.
#[must_use = "a PendingExchange does nothing unless awaited"]
pub struct PendingExchange {
    receiver: oneshot::Receiver<ExchangeResult>,
}

impl PendingExchange {
    pub async fn wait(self) -> ExchangeResult {
        self.receiver
            .await
            .unwrap_or(Err(SessionError::ExchangeAbandoned))
    }

    /// Waits at most `after`. The exchange keeps running on timeout; use
    /// [`crate::Session::send_and_wait`] to have it aborted.
    pub async fn wait_timeout(self, after: Duration) -> ExchangeResult {
        tokio::time::timeout(after, self.wait())
            .await
            .unwrap_or(Err(SessionError::Timeout { after }))
    }
}

/// Owned by the task running an exchange. Whatever way the task ends, the
/// session leaves the pending phase and the handler sees exactly one terminal
/// event before the waiter is woken.
pub(crate) struct ExchangeTicket {
    phase: Arc<Mutex<ExchangePhase>>,
    dispatcher: EventDispatcher,
    signal: CompletionSignal,
}

impl ExchangeTicket {
    pub(crate) fn new(
        phase: Arc<Mutex<ExchangePhase>>,
        dispatcher: EventDispatcher,
        signal: CompletionSignal,
    ) -> Self {
        Self {
            phase,
            dispatcher,
            signal,
        }
    }

    /// Wakes the waiter. The terminal event has already moved the phase out
    /// of pending, so a send issued from the idle handler is left untouched.
    pub(crate) fn finish(mut self, result: ExchangeResult) {
        if let Err(err) = self.signal.resolve(result) {
            error!(error = %err, "exchange resolved twice");
        }
    }
}

impl Drop for ExchangeTicket {
    fn drop(&mut self) {
        if self.signal.is_resolved() {
            return;
        }
        let abandoned = {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            let pending = phase.is_pending();
            if pending {
                *phase = ExchangePhase::Errored;
            }
            pending
        };
        // Cancelled mid-exchange: no terminal event was emitted yet.
        if abandoned {
            self.dispatcher.dispatch(&SessionEvent::SessionError {
                message: SessionError::ExchangeAbandoned.to_string(),
            });
        }
    }
}
