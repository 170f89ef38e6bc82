//! Conversation log records, inbound input and exchange results.

use chrono::{DateTime, Utc};
use pcommon::UserId;
use pprovider::{ContentPart, Message, Role, ToolCall, ToolResult};
use ptooling::{Artifact, ImageAttachment, QuotaKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ChatErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human" => Some(Self::Human),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// One immutable entry of a user's conversation log.
///
/// Binary content never lands here; images and files are reduced to text
/// markers before a turn is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: String,
    pub user_id: UserId,
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(user_id: UserId, role: TurnRole, content: String) -> Self {
        Self {
            turn_id: Uuid::new_v4().to_string(),
            user_id,
            role,
            content,
            tool_call_id: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn human(user_id: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self::new(user_id.into(), TurnRole::Human, content.into())
    }

    pub fn assistant(
        user_id: impl Into<UserId>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let mut turn = Self::new(user_id.into(), TurnRole::Assistant, content.into());
        turn.tool_calls = tool_calls;
        turn
    }

    pub fn tool(user_id: impl Into<UserId>, result: &ToolResult) -> Self {
        let mut turn = Self::new(user_id.into(), TurnRole::Tool, result.payload.to_string());
        turn.tool_call_id = Some(result.tool_call_id.clone());
        turn
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn to_message(&self) -> Message {
        match self.role {
            TurnRole::Human => Message::new(Role::Human, self.content.clone()),
            TurnRole::Assistant => Message::assistant(self.content.clone(), self.tool_calls.clone()),
            TurnRole::Tool => Message {
                role: Role::Tool,
                content: vec![ContentPart::text(self.content.clone())],
                tool_call_id: self.tool_call_id.clone(),
                tool_calls: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InboundDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Raw input for one exchange, as delivered by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub text: String,
    pub images: Vec<ImageAttachment>,
    pub documents: Vec<InboundDocument>,
    pub audio_transcript: Option<String>,
}

impl InboundMessage {
    pub fn text(user_id: impl Into<UserId>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            images: Vec::new(),
            documents: Vec::new(),
            audio_transcript: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_document(mut self, document: InboundDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn with_audio_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.audio_transcript = Some(transcript.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerKind {
    Text,
    Images,
    Video,
    File,
    Search,
    Notification,
}

/// The normalized final answer of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub kind: AnswerKind,
    pub text: String,
    pub media: Vec<Artifact>,
}

impl Answer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: AnswerKind::Text,
            text: text.into(),
            media: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Answered(Answer),
    DeniedBySubscription { prompt: String },
    DeniedByQuota { kind: QuotaKind, prompt: String },
    Failed { message: String, kind: ChatErrorKind },
}

impl ExchangeOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered(_) => "answered",
            Self::DeniedBySubscription { .. } => "denied_subscription",
            Self::DeniedByQuota { .. } => "denied_quota",
            Self::Failed { .. } => "failed",
        }
    }

    /// Text the transport should show the user.
    pub fn user_text(&self) -> &str {
        match self {
            Self::Answered(answer) => &answer.text,
            Self::DeniedBySubscription { prompt } | Self::DeniedByQuota { prompt, .. } => prompt,
            Self::Failed { message, .. } => message,
        }
    }
}

/// What one exchange did, returned to the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub outcome: ExchangeOutcome,
    pub rounds: u32,
    pub executed_tool_calls: u32,
    pub duplicate_tool_calls: u32,
    pub history_repairs: u32,
    pub storage_failures: u32,
    pub round_limit_reached: bool,
}

pub(crate) const FALLBACK_ANSWER: &str = "Done.";

/// Tool products gathered across the rounds of one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingExchange {
    pub artifacts: Vec<Artifact>,
    pub text_candidates: Vec<String>,
}

impl PendingExchange {
    pub fn absorb(&mut self, artifacts: Vec<Artifact>, text_candidates: Vec<String>) {
        self.artifacts.extend(artifacts);
        self.text_candidates.extend(text_candidates);
    }

    fn kind(&self) -> AnswerKind {
        let has = |predicate: fn(&Artifact) -> bool| self.artifacts.iter().any(predicate);

        if has(|artifact| matches!(artifact, Artifact::Images(_))) {
            AnswerKind::Images
        } else if has(|artifact| matches!(artifact, Artifact::Video { .. })) {
            AnswerKind::Video
        } else if has(|artifact| matches!(artifact, Artifact::File { .. })) {
            AnswerKind::File
        } else if has(|artifact| matches!(artifact, Artifact::NotificationScheduled { .. })) {
            AnswerKind::Notification
        } else if has(|artifact| matches!(artifact, Artifact::SearchAnswer(_))) {
            AnswerKind::Search
        } else {
            AnswerKind::Text
        }
    }

    /// Folds everything gathered so far into one answer. `terminal_text` is
    /// the provider's final reply and wins over tool text when non-empty.
    pub fn into_answer(self, terminal_text: &str) -> Answer {
        let kind = self.kind();
        let terminal = terminal_text.trim();
        let text = if !terminal.is_empty() {
            terminal.to_string()
        } else {
            self.text_candidates
                .last()
                .cloned()
                .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
        };
        let media = self
            .artifacts
            .into_iter()
            .filter(|artifact| {
                !matches!(
                    artifact,
                    Artifact::SearchAnswer(_) | Artifact::NotificationScheduled { .. }
                )
            })
            .collect();

        Answer { kind, text, media }
    }
}
