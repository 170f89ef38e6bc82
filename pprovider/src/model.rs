//! Provider-agnostic request, response, and message model types.
//!
//! Tool calls are normalized once, at ingestion, into a single
//! `{id, name, arguments}` record regardless of the wire shape they arrived in.
//!
//! ```rust
//! use pprovider::{Message, ModelRequest, ProviderErrorKind, Role, ToolCall};
//! use serde_json::json;
//!
//! let ok = ModelRequest::builder("gpt-4o-mini")
//!     .message(Message::new(Role::Human, "draw a cat"))
//!     .build();
//! assert!(ok.is_ok());
//!
//! let call = ToolCall::from_raw(&json!({
//!     "id": "call_1",
//!     "type": "function",
//!     "function": {"name": "generate_image", "arguments": "{\"prompt\":\"cat\"}"}
//! }))
//! .expect("nested shape should normalize");
//! assert_eq!(call.name, "generate_image");
//!
//! let err = ModelRequest::builder("").message(Message::new(Role::Human, "hi")).build();
//! assert_eq!(err.err().map(|e| e.kind), Some(ProviderErrorKind::InvalidRequest));
//! ```

use std::fmt::{Display, Formatter, Write as _};

use pcommon::{GenerationOptions, MetadataMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProviderError;

pub type ToolArguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    OpenAiCompatible,
    Scripted,
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let id = match self {
            Self::OpenAi => "openai",
            Self::OpenAiCompatible => "openai-compatible",
            Self::Scripted => "scripted",
        };

        f.write_str(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "human" | "user" => Some(Self::Human),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64 payload; never persisted, see the history store.
    Image { media_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    pub tool_call_id: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_parts(role, vec![ContentPart::text(content)])
    }

    pub fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        let parts = if content.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::text(content)]
        };

        Self {
            role: Role::Assistant,
            content: parts,
            tool_call_id: None,
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, payload: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentPart::text(payload.to_string())],
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Concatenated text parts; image parts are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Builds a call from arguments encoded as a JSON string, as most wire
    /// formats deliver them. An empty string is read as `{}`.
    pub fn from_json_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: &str,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let arguments = parse_arguments(&name, arguments)?;
        Ok(Self::new(id, name, arguments))
    }

    /// Normalizes either the nested `{id, function: {name, arguments}}` shape
    /// or the flat `{call_id|id, name, arguments}` shape.
    pub fn from_raw(raw: &Value) -> Result<Self, ProviderError> {
        let object = raw.as_object().ok_or_else(|| {
            ProviderError::malformed_tool_arguments("tool call must be a JSON object")
        })?;

        let id = object
            .get("call_id")
            .or_else(|| object.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::malformed_tool_arguments("tool call is missing an id"))?;

        let body = object
            .get("function")
            .and_then(Value::as_object)
            .unwrap_or(object);

        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::malformed_tool_arguments("tool call is missing a name"))?;

        let arguments = match body.get("arguments") {
            None | Some(Value::Null) => ToolArguments::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(encoded)) => parse_arguments(name, encoded)?,
            Some(other) => {
                return Err(ProviderError::malformed_tool_arguments(format!(
                    "tool '{name}' arguments must be an object, got {other}"
                )));
            }
        };

        Ok(Self::new(id, name, arguments))
    }

    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }

    pub fn canonical_arguments(&self) -> String {
        canonical_json(&Value::Object(self.arguments.clone()))
    }

    /// Two calls with equal keys within one assistant turn are duplicates.
    pub fn dedup_key(&self) -> (String, String) {
        (self.name.clone(), self.canonical_arguments())
    }
}

fn parse_arguments(name: &str, encoded: &str) -> Result<ToolArguments, ProviderError> {
    if encoded.trim().is_empty() {
        return Ok(ToolArguments::new());
    }

    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProviderError::malformed_tool_arguments(format!(
            "tool '{name}' arguments must be an object, got {other}"
        ))),
        Err(error) => Err(ProviderError::malformed_tool_arguments(format!(
            "tool '{name}' arguments are not valid JSON: {error}"
        ))),
    }
}

/// JSON rendering with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(key.clone()));
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub payload: Value,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            payload,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool(self.tool_call_id.clone(), &self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Message(Message),
    ToolCall(ToolCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub provider: ProviderId,
    pub model: String,
    pub output: Vec<OutputItem>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Splits the output into assistant text and the requested tool calls.
    pub fn into_parts(self) -> (String, Vec<ToolCall>) {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for item in self.output {
            match item {
                OutputItem::Message(message) if message.role == Role::Assistant => {
                    text.push_str(&message.text());
                    tool_calls.extend(message.tool_calls);
                }
                OutputItem::Message(_) => {}
                OutputItem::ToolCall(call) => tool_calls.push(call),
            }
        }

        (text, tool_calls)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
    pub tools: Vec<ToolDefinition>,
    pub metadata: MetadataMap,
}

impl ModelRequest {
    pub fn builder(model: impl Into<String>) -> ModelRequestBuilder {
        ModelRequestBuilder::new(model)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.model.trim().is_empty() {
            return Err(ProviderError::invalid_request("model must not be empty"));
        }

        if self.messages.is_empty() {
            return Err(ProviderError::invalid_request(
                "at least one message is required",
            ));
        }

        if let Some(max_tokens) = self.options.max_tokens
            && max_tokens == 0
        {
            return Err(ProviderError::invalid_request(
                "max_tokens must be greater than zero",
            ));
        }

        if let Some(temperature) = self.options.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ProviderError::invalid_request(
                "temperature must be in the inclusive range 0.0..=2.0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequestBuilder {
    request: ModelRequest,
}

impl ModelRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request: ModelRequest {
                model: model.into(),
                system: None,
                messages: Vec::new(),
                options: GenerationOptions::default(),
                tools: Vec::new(),
                metadata: MetadataMap::new(),
            },
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.request.system = Some(system.into());
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.request.messages.extend(messages);
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.request.options = options;
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.request.tools = tools;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ModelRequest, ProviderError> {
        self.request.validate()?;
        Ok(self.request)
    }
}
