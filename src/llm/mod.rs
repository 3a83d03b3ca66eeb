mod anthropic;

use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::ProviderError;

pub use anthropic::{AnthropicModel, AnthropicModelConfig, AnthropicProvider};

#[derive(Clone, Debug, PartialEq)]
#[doc(hidden)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ModelToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
#[doc(hidden)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
#[doc(hidden)]
pub struct ModelToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[doc(hidden)]
pub enum ModelToolChoice {
    Auto,
    None,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[doc(hidden)]
pub struct ModelCompletion {
    pub text: Option<String>,
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: Option<ModelUsage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[doc(hidden)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One item of a streamed model turn.
///
/// A well-formed stream yields any number of `TextDelta`s and ends with exactly
/// one `Completed` whose text equals the concatenated deltas.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelStreamChunk {
    TextDelta(String),
    Completed(ModelCompletion),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError>;

    /// Streams one turn. Backends without native streaming deliver the whole
    /// text as a single delta.
    fn invoke_stream<'a>(
        &'a self,
        messages: &'a [ModelMessage],
        tools: &'a [ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> BoxStream<'a, Result<ModelStreamChunk, ProviderError>> {
        Box::pin(try_stream! {
            let completion = self.invoke(messages, tools, tool_choice).await?;
            if let Some(text) = completion.text.as_ref().filter(|text| !text.is_empty()) {
                yield ModelStreamChunk::TextDelta(text.clone());
            }
            yield ModelStreamChunk::Completed(completion);
        })
    }
}

/// Resolves a session's model identifier to a backend.
pub trait ModelProvider: Send + Sync {
    fn model(&self, model_id: &str) -> Result<Arc<dyn ChatModel>, ProviderError>;
}

/// Serves the same backend for every model identifier.
#[derive(Clone)]
pub struct FixedModel(pub Arc<dyn ChatModel>);

impl ModelProvider for FixedModel {
    fn model(&self, _model_id: &str) -> Result<Arc<dyn ChatModel>, ProviderError> {
        Ok(self.0.clone())
    }
}
