use std::time::Duration;

use thiserror::Error;

use crate::session::ExchangePhase;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("missing tool resource: {0}")]
    MissingResource(&'static str),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session configuration error: {0}")]
    Config(String),
    #[error("an exchange is already pending on this session")]
    ExchangeInFlight,
    #[error("backend error: {0}")]
    Backend(#[from] ProviderError),
    #[error("max turns reached ({max_turns})")]
    MaxTurnsReached { max_turns: u32 },
    #[error("exchange timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("exchange ended without a terminal event")]
    ExchangeAbandoned,
    #[error("completion signal already resolved")]
    AlreadyResolved,
    #[error("invalid exchange transition from {from:?} on {event}")]
    InvalidTransition {
        from: ExchangePhase,
        event: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver request failed: {0}")]
    Request(String),
    #[error("webdriver error {error}: {message}")]
    WebDriver { error: String, message: String },
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("browser session is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Request(err.to_string())
    }
}

/// Sample input failures, detected before any backend call.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("could not read {path}: {message}")]
    Unreadable { path: String, message: String },
    #[error("count must be between {min} and {max}, got {value}")]
    CountOutOfRange { value: u32, min: u32, max: u32 },
    #[error("unsupported {kind}: {value}")]
    Unsupported { kind: &'static str, value: String },
    #[error("failed to load {source_name}: {message}")]
    Load {
        source_name: String,
        message: String,
    },
}
