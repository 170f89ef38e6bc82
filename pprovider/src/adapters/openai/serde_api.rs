//! Chat-completions wire payloads and error-status mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProviderError;

use super::types::{
    OpenAiAssistantMessage, OpenAiContentPart, OpenAiFinishReason, OpenAiMessage, OpenAiRequest,
    OpenAiResponse, OpenAiRole, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};

pub(crate) fn build_api_request(request: OpenAiRequest) -> Result<OpenAiApiRequest, ProviderError> {
    let messages = request
        .messages
        .into_iter()
        .map(OpenAiApiMessage::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if messages.is_empty() {
        return Err(ProviderError::invalid_request(
            "OpenAI request requires at least one message",
        ));
    }

    let tools = (!request.tools.is_empty())
        .then(|| request.tools.into_iter().map(OpenAiApiTool::from).collect());

    Ok(OpenAiApiRequest {
        model: request.model,
        messages,
        tools,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    })
}

pub(crate) fn parse_finish_reason(value: Option<&str>) -> OpenAiFinishReason {
    match value {
        Some("stop") => OpenAiFinishReason::Stop,
        Some("length") => OpenAiFinishReason::Length,
        Some("tool_calls") | Some("function_call") => OpenAiFinishReason::ToolCalls,
        Some("content_filter") => OpenAiFinishReason::ContentFilter,
        _ => OpenAiFinishReason::Other,
    }
}

const CONTENT_POLICY_CODES: &[&str] = &["content_policy_violation", "content_filter"];

/// Maps a non-success status and its body onto the provider error taxonomy.
pub fn map_error_response(status: u16, body: &str) -> ProviderError {
    let envelope = serde_json::from_str::<OpenAiApiErrorEnvelope>(body).ok();
    let (message, code) = match envelope {
        Some(envelope) => {
            let code = envelope
                .error
                .code
                .as_ref()
                .and_then(Value::as_str)
                .or(envelope.error.r#type.as_deref())
                .map(str::to_string);
            (envelope.error.message, code)
        }
        None => (format!("OpenAI request failed with status {status}"), None),
    };
    let code = code.unwrap_or_default();
    let lowered = message.to_ascii_lowercase();

    match status {
        401 => ProviderError::authentication(message),
        403 => ProviderError::permission_denied(message),
        402 => ProviderError::credit_exhausted(message),
        429 if code == "insufficient_quota" => ProviderError::credit_exhausted(message),
        429 => ProviderError::rate_limited(message),
        400 | 422 => {
            if CONTENT_POLICY_CODES.contains(&code.as_str()) || lowered.contains("safety system") {
                ProviderError::content_policy(message)
            } else if lowered.contains("tool_call") || lowered.contains("role 'tool'") {
                ProviderError::malformed_history(message)
            } else {
                ProviderError::invalid_request(message)
            }
        }
        408 | 504 => ProviderError::timeout(message),
        400..=499 => ProviderError::invalid_request(message),
        500..=599 => ProviderError::unavailable(message),
        _ => ProviderError::transport(message),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiApiErrorEnvelope {
    pub error: OpenAiApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiApiError {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    /// Sometimes a string, sometimes a number, sometimes absent.
    #[serde(default)]
    pub code: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiApiRequest {
    pub model: String,
    pub messages: Vec<OpenAiApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum OpenAiApiContent {
    Text(String),
    Parts(Vec<OpenAiApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum OpenAiApiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiApiImageUrl },
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiApiImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiApiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAiApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OpenAiApiToolCall>,
}

impl TryFrom<OpenAiMessage> for OpenAiApiMessage {
    type Error = ProviderError;

    fn try_from(value: OpenAiMessage) -> Result<Self, Self::Error> {
        if value.role == OpenAiRole::Tool && value.tool_call_id.is_none() {
            return Err(ProviderError::malformed_history(
                "tool message is missing its tool_call_id",
            ));
        }

        let content = if value.has_images() {
            Some(OpenAiApiContent::Parts(
                value
                    .content
                    .into_iter()
                    .map(|part| match part {
                        OpenAiContentPart::Text(text) => OpenAiApiContentPart::Text { text },
                        OpenAiContentPart::ImageDataUrl(url) => OpenAiApiContentPart::ImageUrl {
                            image_url: OpenAiApiImageUrl { url },
                        },
                    })
                    .collect(),
            ))
        } else {
            let text = value
                .content
                .into_iter()
                .filter_map(|part| match part {
                    OpenAiContentPart::Text(text) => Some(text),
                    OpenAiContentPart::ImageDataUrl(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n");

            match (value.role, text.is_empty()) {
                (OpenAiRole::Assistant, true) if !value.tool_calls.is_empty() => None,
                (OpenAiRole::Assistant, _) => Some(OpenAiApiContent::Text(text)),
                (_, true) => {
                    return Err(ProviderError::invalid_request(
                        "OpenAI message content must not be empty",
                    ));
                }
                (_, false) => Some(OpenAiApiContent::Text(text)),
            }
        };

        Ok(Self {
            role: value.role.as_str().to_string(),
            content,
            tool_call_id: value.tool_call_id,
            tool_calls: value
                .tool_calls
                .into_iter()
                .map(OpenAiApiToolCall::from)
                .collect(),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiApiTool {
    pub r#type: String,
    pub function: OpenAiApiFunction,
}

impl From<OpenAiTool> for OpenAiApiTool {
    fn from(value: OpenAiTool) -> Self {
        Self {
            r#type: "function".to_string(),
            function: OpenAiApiFunction {
                name: value.name,
                description: value.description,
                parameters: value.parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiApiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiApiToolCall {
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: OpenAiApiToolFunction,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<OpenAiToolCall> for OpenAiApiToolCall {
    fn from(value: OpenAiToolCall) -> Self {
        Self {
            id: value.id,
            r#type: function_type(),
            function: OpenAiApiToolFunction {
                name: value.name,
                arguments: value.arguments,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiApiToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiApiResponse {
    pub model: String,
    pub choices: Vec<OpenAiApiChoice>,
    pub usage: Option<OpenAiApiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiApiChoice {
    pub message: OpenAiApiAssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiApiAssistantMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAiApiToolCall>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAiApiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TryFrom<OpenAiApiResponse> for OpenAiResponse {
    type Error = ProviderError;

    fn try_from(value: OpenAiApiResponse) -> Result<Self, Self::Error> {
        let choice = value
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::transport("OpenAI response did not include choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| OpenAiToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        let usage = value.usage.unwrap_or_default();

        Ok(Self {
            model: value.model,
            message: OpenAiAssistantMessage {
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
            },
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
            usage: OpenAiUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}
