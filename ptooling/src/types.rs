//! Tool runtime context, outputs and gating metadata.

use pcommon::{MetadataMap, TraceId, UserId};
use pprovider::{ToolCall, ToolResult};
use serde_json::Value;

/// Paid resource a metered tool draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    Image,
    Video,
}

impl QuotaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Whether a tool needs subscription/quota authorization before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolGate {
    Free,
    Metered(QuotaKind),
}

impl ToolGate {
    pub fn quota_kind(self) -> Option<QuotaKind> {
        match self {
            Self::Free => None,
            Self::Metered(kind) => Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    SubscriptionRequired,
    QuotaExhausted(QuotaKind),
}

/// An image the user attached to the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionContext {
    pub user_id: UserId,
    pub trace_id: Option<TraceId>,
    pub metadata: MetadataMap,
    pub attachments: Vec<ImageAttachment>,
}

impl ToolExecutionContext {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: None,
            metadata: MetadataMap::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<ImageAttachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Something a tool produced for the user, as opposed to the payload fed
/// back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Images(Vec<Vec<u8>>),
    Video { reference: String },
    File { name: String, bytes: Vec<u8> },
    SearchAnswer(String),
    NotificationScheduled { id: String, when: String, text: String },
}

impl Artifact {
    /// Quota units this artifact costs when produced by a metered tool.
    pub fn units(&self) -> u32 {
        match self {
            Self::Images(images) => u32::try_from(images.len()).unwrap_or(u32::MAX),
            Self::Video { .. } | Self::File { .. } => 1,
            Self::SearchAnswer(_) | Self::NotificationScheduled { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub payload: Value,
    pub artifact: Option<Artifact>,
}

impl ToolOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn units(&self) -> u32 {
        self.artifact.as_ref().map_or(0, Artifact::units)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub output: ToolOutput,
}

impl ToolExecutionResult {
    pub fn from_call(call: &ToolCall, output: ToolOutput) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            output,
        }
    }

    pub fn to_tool_result(&self) -> ToolResult {
        ToolResult::new(self.tool_call_id.clone(), self.output.payload.clone())
    }
}
