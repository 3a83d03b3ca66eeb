//! Streaming tool-call sessions against a chat model, plus the helpers the
//! sample programs share.
//!
//! - [`AgentClient`] opens [`Session`]s; each session runs one exchange at a
//!   time and reports progress as [`SessionEvent`]s to a single handler
//! - [`ToolSpec`] describes a tool the model may call; every tool returns a
//!   [`ToolResult`]
//! - Anthropic adapter via [`AnthropicProvider`]

pub mod browser;
pub mod error;
pub mod llm;
pub mod samples;
pub mod session;
pub mod tools;

pub use error::{BrowserError, InputError, ProviderError, SchemaError, SessionError, ToolError};
pub use llm::{
    AnthropicModel, AnthropicModelConfig, AnthropicProvider, ChatModel, FixedModel,
    ModelCompletion, ModelMessage, ModelProvider, ModelToolCall, ModelToolChoice,
    ModelToolDefinition,
};
pub use session::{
    AgentClient, EventHandler, EventKind, ExchangeOutcome, ExchangePhase, PendingExchange,
    Session, SessionConfig, SessionEvent, Subscription, SystemMessageMode,
};
pub use tools::{ParameterType, ToolContext, ToolParameter, ToolResult, ToolSpec};
