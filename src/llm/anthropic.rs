use std::sync::Arc;

use anthropic_ai_sdk::client::AnthropicClient;
use anthropic_ai_sdk::types::message::{
    ContentBlock, ContentBlockDelta, CreateMessageParams, CreateMessageResponse, Message,
    MessageClient, MessageError, MessageStartContent, RequiredMessageParams, Role, StopReason,
    StreamEvent, Tool, ToolChoice,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelProvider, ModelStreamChunk, ModelToolCall,
    ModelToolChoice, ModelToolDefinition, ModelUsage,
};

#[derive(Debug, Clone)]
/// Runtime configuration for [`AnthropicModel`].
pub struct AnthropicModelConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Model id (for example `claude-sonnet-4-5`).
    pub model: String,
    /// Anthropic API version header value.
    pub api_version: String,
    /// Optional base URL override for proxies or compatible endpoints.
    pub api_base_url: Option<String>,
    /// Maximum output tokens per call.
    pub max_tokens: u32,
}

impl AnthropicModelConfig {
    /// Creates a config with sensible defaults.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_version: AnthropicClient::DEFAULT_API_VERSION.to_string(),
            api_base_url: None,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone)]
/// Anthropic backend implementing [`ChatModel`], streaming and non-streaming.
pub struct AnthropicModel {
    client: AnthropicClient,
    config: AnthropicModelConfig,
}

impl AnthropicModel {
    /// Creates a model adapter from explicit config.
    pub fn new(config: AnthropicModelConfig) -> Result<Self, ProviderError> {
        let mut builder =
            AnthropicClient::builder(config.api_key.clone(), config.api_version.clone());
        if let Some(url) = &config.api_base_url {
            builder = builder.with_api_base_url(url.clone());
        }

        let client = builder
            .build::<MessageError>()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_request(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
        stream: bool,
    ) -> CreateMessageParams {
        let (history, system) = to_anthropic_messages(messages);

        let required = RequiredMessageParams {
            model: self.config.model.clone(),
            messages: history,
            max_tokens: self.config.max_tokens,
        };

        let mut request = CreateMessageParams::new(required).with_stream(stream);

        if let Some(system_prompt) = system {
            request = request.with_system(system_prompt);
        }

        if !tools.is_empty() {
            let anthropic_tools = tools
                .iter()
                .map(|tool| Tool {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    input_schema: tool.parameters.clone(),
                })
                .collect::<Vec<_>>();

            request = request.with_tools(anthropic_tools);
            request = request.with_tool_choice(match tool_choice {
                ModelToolChoice::Auto => ToolChoice::Auto,
                ModelToolChoice::None => ToolChoice::None,
            });
        }

        request
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        let request = self.build_request(messages, tools, tool_choice, false);

        let response = self
            .client
            .create_message(Some(&request))
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(normalize_response(&response))
    }

    fn invoke_stream<'a>(
        &'a self,
        messages: &'a [ModelMessage],
        tools: &'a [ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> BoxStream<'a, Result<ModelStreamChunk, ProviderError>> {
        Box::pin(try_stream! {
            let request = self.build_request(messages, tools, tool_choice, true);
            let events = self
                .client
                .create_message_streaming(&request)
                .await
                .map_err(|err| ProviderError::Request(err.to_string()))?;
            futures_util::pin_mut!(events);

            let mut accumulator = StreamAccumulator::default();
            while let Some(event) = events.next().await {
                let event = event.map_err(|err| ProviderError::Response(err.to_string()))?;
                let Some(chunk) = normalize_stream_event(&event) else {
                    continue;
                };
                if let Some(delta) = accumulator.push(chunk)? {
                    yield ModelStreamChunk::TextDelta(delta);
                }
            }

            yield ModelStreamChunk::Completed(accumulator.finish()?);
        })
    }
}

/// Builds [`AnthropicModel`]s on demand for each session's model id.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    api_base_url: Option<String>,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: None,
            max_tokens: 4096,
        }
    }

    /// Reads `ANTHROPIC_API_KEY` and the optional `ANTHROPIC_BASE_URL`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Request("ANTHROPIC_API_KEY is not set".to_string()))?;
        let mut provider = Self::new(api_key);
        provider.api_base_url = std::env::var("ANTHROPIC_BASE_URL").ok();
        Ok(provider)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl ModelProvider for AnthropicProvider {
    fn model(&self, model_id: &str) -> Result<Arc<dyn ChatModel>, ProviderError> {
        let mut config = AnthropicModelConfig::new(self.api_key.clone(), model_id);
        config.api_base_url = self.api_base_url.clone();
        config.max_tokens = self.max_tokens;
        Ok(Arc::new(AnthropicModel::new(config)?))
    }
}

fn to_anthropic_messages(messages: &[ModelMessage]) -> (Vec<Message>, Option<String>) {
    let mut system_lines = Vec::new();
    let mut anthropic_messages = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(content) => system_lines.push(content.clone()),
            ModelMessage::User(content) => {
                anthropic_messages.push(Message::new_text(Role::User, content.clone()));
            }
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if let Some(content) = content.as_ref().filter(|content| !content.is_empty()) {
                    blocks.push(ContentBlock::Text {
                        text: content.clone(),
                    });
                }
                for call in tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if !blocks.is_empty() {
                    anthropic_messages.push(Message::new_blocks(Role::Assistant, blocks));
                }
            }
            // Failed results already carry their "Error: " prefix.
            ModelMessage::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                anthropic_messages.push(Message::new_blocks(
                    Role::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: content.clone(),
                    }],
                ));
            }
        }
    }

    let system = if system_lines.is_empty() {
        None
    } else {
        Some(system_lines.join("\n\n"))
    };

    (anthropic_messages, system)
}

fn normalize_response(response: &CreateMessageResponse) -> ModelCompletion {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ModelToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }),
            _ => {}
        }
    }

    let text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    };

    ModelCompletion {
        text,
        tool_calls,
        usage: Some(ModelUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AnthropicStreamChunk {
    Text {
        index: usize,
        text: String,
    },
    ToolInputJson {
        index: usize,
        partial_json: String,
    },
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
        input: serde_json::Value,
    },
    MessageStop {
        stop_reason: Option<String>,
    },
    Error {
        message: String,
    },
}

pub(crate) fn normalize_stream_event(event: &StreamEvent) -> Option<AnthropicStreamChunk> {
    match event {
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            if let ContentBlock::ToolUse { id, name, input } = content_block {
                Some(AnthropicStreamChunk::ToolCallStart {
                    index: *index,
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                })
            } else {
                None
            }
        }
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            ContentBlockDelta::TextDelta { text } => Some(AnthropicStreamChunk::Text {
                index: *index,
                text: text.clone(),
            }),
            ContentBlockDelta::InputJsonDelta { partial_json } => {
                Some(AnthropicStreamChunk::ToolInputJson {
                    index: *index,
                    partial_json: partial_json.clone(),
                })
            }
            ContentBlockDelta::ThinkingDelta { .. } | ContentBlockDelta::SignatureDelta { .. } => None,
        },
        StreamEvent::MessageDelta { delta, usage: _ } => Some(AnthropicStreamChunk::MessageStop {
            stop_reason: delta.stop_reason.as_ref().map(stop_reason_name),
        }),
        StreamEvent::MessageStop => Some(AnthropicStreamChunk::MessageStop { stop_reason: None }),
        StreamEvent::Error { error } => Some(AnthropicStreamChunk::Error {
            message: error.message.clone(),
        }),
        StreamEvent::MessageStart {
            message: MessageStartContent { .. },
        }
        | StreamEvent::ContentBlockStop { .. }
        | StreamEvent::Ping => None,
    }
}

fn stop_reason_name(stop_reason: &StopReason) -> String {
    match stop_reason {
        StopReason::EndTurn => "end_turn",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::ToolUse => "tool_use",
        StopReason::Refusal => "refusal",
    }
    .to_string()
}

#[derive(Debug)]
struct PartialToolCall {
    index: usize,
    id: String,
    name: String,
    input: serde_json::Value,
    partial_json: String,
}

/// Folds stream chunks into a [`ModelCompletion`].
///
/// Text blocks are separated by a newline, emitted as part of the delta that
/// opens the next block, so the deltas always concatenate to the final text.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    text: String,
    last_text_index: Option<usize>,
    tool_calls: Vec<PartialToolCall>,
    stop_reason: Option<String>,
}

impl StreamAccumulator {
    pub(crate) fn push(
        &mut self,
        chunk: AnthropicStreamChunk,
    ) -> Result<Option<String>, ProviderError> {
        match chunk {
            AnthropicStreamChunk::Text { index, text } => {
                let delta = match self.last_text_index {
                    Some(previous) if previous != index && !self.text.is_empty() => {
                        format!("\n{text}")
                    }
                    _ => text,
                };
                self.last_text_index = Some(index);
                if delta.is_empty() {
                    return Ok(None);
                }
                self.text.push_str(&delta);
                Ok(Some(delta))
            }
            AnthropicStreamChunk::ToolCallStart {
                index,
                id,
                name,
                input,
            } => {
                self.tool_calls.push(PartialToolCall {
                    index,
                    id,
                    name,
                    input,
                    partial_json: String::new(),
                });
                Ok(None)
            }
            AnthropicStreamChunk::ToolInputJson {
                index,
                partial_json,
            } => {
                let call = self
                    .tool_calls
                    .iter_mut()
                    .find(|call| call.index == index)
                    .ok_or_else(|| {
                        ProviderError::Response(format!(
                            "tool input delta for unknown block {index}"
                        ))
                    })?;
                call.partial_json.push_str(&partial_json);
                Ok(None)
            }
            AnthropicStreamChunk::MessageStop { stop_reason } => {
                if stop_reason.is_some() {
                    debug!(stop_reason = ?stop_reason, "anthropic stream stopping");
                    self.stop_reason = stop_reason;
                }
                Ok(None)
            }
            AnthropicStreamChunk::Error { message } => Err(ProviderError::Response(message)),
        }
    }

    pub(crate) fn finish(self) -> Result<ModelCompletion, ProviderError> {
        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for call in self.tool_calls {
            let arguments = if call.partial_json.trim().is_empty() {
                call.input
            } else {
                serde_json::from_str(&call.partial_json).map_err(|err| {
                    ProviderError::Response(format!(
                        "invalid tool arguments for {}: {err}",
                        call.name
                    ))
                })?
            };
            tool_calls.push(ModelToolCall {
                id: call.id,
                name: call.name,
                arguments,
            });
        }

        Ok(ModelCompletion {
            text: (!self.text.is_empty()).then_some(self.text),
            tool_calls,
            usage: None,
        })
    }
}
