//! Adapter-level request/response types and their conversion to the shared model.

use std::fmt::Formatter;

use crate::{
    ContentPart, Message, ModelResponse, OutputItem, ProviderError, ProviderId, Role, StopReason,
    TokenUsage, ToolCall, ToolDefinition,
};

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub tools: Vec<OpenAiTool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiContentPart {
    Text(String),
    /// `data:<media type>;base64,<payload>` URL.
    ImageDataUrl(String),
}

impl From<ContentPart> for OpenAiContentPart {
    fn from(value: ContentPart) -> Self {
        match value {
            ContentPart::Text { text } => Self::Text(text),
            ContentPart::Image { media_type, data } => {
                Self::ImageDataUrl(format!("data:{media_type};base64,{data}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiMessage {
    pub role: OpenAiRole,
    pub content: Vec<OpenAiContentPart>,
    pub tool_call_id: Option<String>,
    pub tool_calls: Vec<OpenAiToolCall>,
}

impl OpenAiMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: OpenAiRole::System,
            content: vec![OpenAiContentPart::Text(text.into())],
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub(crate) fn has_images(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, OpenAiContentPart::ImageDataUrl(_)))
    }
}

impl From<Message> for OpenAiMessage {
    fn from(value: Message) -> Self {
        Self {
            role: value.role.into(),
            content: value.content.into_iter().map(OpenAiContentPart::from).collect(),
            tool_call_id: value.tool_call_id,
            tool_calls: value.tool_calls.iter().map(OpenAiToolCall::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiRole {
    System,
    User,
    Assistant,
    Tool,
}

impl OpenAiRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl From<Role> for OpenAiRole {
    fn from(value: Role) -> Self {
        match value {
            Role::System => Self::System,
            Role::Human => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Tool => Self::Tool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<ToolDefinition> for OpenAiTool {
    fn from(value: ToolDefinition) -> Self {
        Self {
            name: value.name,
            description: value.description,
            parameters: value.input_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, as the wire format carries it.
    pub arguments: String,
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(value: &ToolCall) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            arguments: value.arguments_json(),
        }
    }
}

impl TryFrom<OpenAiToolCall> for ToolCall {
    type Error = ProviderError;

    fn try_from(value: OpenAiToolCall) -> Result<Self, Self::Error> {
        ToolCall::from_json_arguments(value.id, value.name, &value.arguments)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiAssistantMessage {
    pub content: String,
    pub tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl From<OpenAiFinishReason> for StopReason {
    fn from(value: OpenAiFinishReason) -> Self {
        match value {
            OpenAiFinishReason::Stop => Self::EndTurn,
            OpenAiFinishReason::Length => Self::MaxTokens,
            OpenAiFinishReason::ToolCalls => Self::ToolUse,
            OpenAiFinishReason::ContentFilter => Self::ContentFilter,
            OpenAiFinishReason::Other => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(value: OpenAiUsage) -> Self {
        Self {
            input_tokens: value.prompt_tokens,
            output_tokens: value.completion_tokens,
            total_tokens: value.total_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiResponse {
    pub model: String,
    pub message: OpenAiAssistantMessage,
    pub finish_reason: OpenAiFinishReason,
    pub usage: OpenAiUsage,
}

impl OpenAiResponse {
    /// Fails when a tool call's arguments are not a JSON object.
    pub(crate) fn into_model_response(
        self,
        provider: ProviderId,
    ) -> Result<ModelResponse, ProviderError> {
        if self.finish_reason == OpenAiFinishReason::ContentFilter {
            return Err(ProviderError::content_policy(
                "response was withheld by the provider content filter",
            ));
        }

        let tool_calls = self
            .message
            .tool_calls
            .into_iter()
            .map(ToolCall::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ModelResponse {
            provider,
            model: self.model,
            output: vec![OutputItem::Message(Message::assistant(
                self.message.content,
                tool_calls,
            ))],
            stop_reason: self.finish_reason.into(),
            usage: self.usage.into(),
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum OpenAiAuth {
    ApiKey(String),
    None,
}

impl std::fmt::Debug for OpenAiAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("OpenAiAuth::ApiKey([REDACTED])"),
            Self::None => f.write_str("OpenAiAuth::None"),
        }
    }
}
