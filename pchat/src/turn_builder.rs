//! Converts raw inbound input into provider content parts and the text marker
//! form that is persisted to the conversation log.
//!
//! ```rust
//! use pchat::{InboundDocument, InboundMessage, TurnBudget, TurnBuilder};
//!
//! let builder = TurnBuilder::new(TurnBudget::default());
//! let message = InboundMessage::text("u1", "summarize this")
//!     .with_document(InboundDocument::new("notes.md", "# Notes\nship it\n"));
//!
//! let built = builder.build(&message).expect("markdown is supported");
//! assert_eq!(built.parts.len(), 2);
//! assert_eq!(built.persisted_text, "summarize this\n[file: notes.md]");
//! assert!(built.truncations.is_empty());
//! ```

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pprovider::ContentPart;
use ptooling::ImageAttachment;

use crate::{ChatError, InboundMessage, TurnBudget};

pub const IMAGE_MARKER: &str = "[image omitted]";

/// A document that did not fit its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub name: String,
    pub original_chars: usize,
    pub kept_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTurn {
    /// What the provider sees for the current human turn.
    pub parts: Vec<ContentPart>,
    /// What the log keeps: text plus markers, never binary content.
    pub persisted_text: String,
    pub truncations: Vec<Truncation>,
    pub attachments: Vec<ImageAttachment>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnBuilder {
    budget: TurnBudget,
}

impl TurnBuilder {
    pub fn new(budget: TurnBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &TurnBudget {
        &self.budget
    }

    pub fn build(&self, message: &InboundMessage) -> Result<BuiltTurn, ChatError> {
        self.validate(message)?;

        let mut parts = Vec::new();
        let mut persisted = Vec::new();
        let mut truncations = Vec::new();

        let text = message.text.trim();
        if !text.is_empty() {
            parts.push(ContentPart::text(text));
            persisted.push(text.to_string());
        }

        if let Some(transcript) = message.audio_transcript.as_deref().map(str::trim)
            && !transcript.is_empty()
        {
            let rendered = format!("[voice message transcript]\n{transcript}");
            parts.push(ContentPart::text(rendered.clone()));
            persisted.push(rendered);
        }

        let mut remaining = self.budget.total_document_chars();
        for document in &message.documents {
            let content = String::from_utf8_lossy(&document.bytes);
            let limit = self.budget.per_document_chars().min(remaining);
            let (kept, original_chars, kept_chars) = truncate_at_line(&content, limit);
            remaining = remaining.saturating_sub(kept_chars);

            let mut rendered = format!("[file: {}]\n{kept}", document.name);
            if kept_chars < original_chars {
                rendered.push_str(&format!(
                    "\n[truncated: kept {kept_chars} of {original_chars} characters]"
                ));
                truncations.push(Truncation {
                    name: document.name.clone(),
                    original_chars,
                    kept_chars,
                });
            }
            parts.push(ContentPart::text(rendered));
            persisted.push(format!("[file: {}]", document.name));
        }

        for image in &message.images {
            parts.push(ContentPart::image(
                image.media_type.clone(),
                STANDARD.encode(&image.bytes),
            ));
            persisted.push(IMAGE_MARKER.to_string());
        }

        if !truncations.is_empty() {
            tracing::debug!(
                phase = "turn_building",
                user_id = %message.user_id,
                truncated_documents = truncations.len(),
                "documents truncated to fit the turn budget"
            );
        }

        Ok(BuiltTurn {
            parts,
            persisted_text: persisted.join("\n"),
            truncations,
            attachments: message.images.clone(),
        })
    }

    fn validate(&self, message: &InboundMessage) -> Result<(), ChatError> {
        for document in &message.documents {
            let extension = Path::new(&document.name)
                .extension()
                .and_then(|extension| extension.to_str());
            match extension {
                Some(extension) if self.budget.supports_extension(extension) => {}
                Some(extension) => {
                    return Err(ChatError::invalid_request(format!(
                        "documents of type '.{extension}' are not supported"
                    )));
                }
                None => {
                    return Err(ChatError::invalid_request(format!(
                        "document '{}' has no file extension",
                        document.name
                    )));
                }
            }
        }

        if message.images.len() > self.budget.max_images {
            return Err(ChatError::invalid_request(format!(
                "at most {} images can be attached to one message",
                self.budget.max_images
            )));
        }
        if message
            .images
            .iter()
            .any(|image| image.bytes.len() > self.budget.max_image_bytes)
        {
            return Err(ChatError::invalid_request(format!(
                "images must be at most {} bytes",
                self.budget.max_image_bytes
            )));
        }

        let has_text = !message.text.trim().is_empty()
            || message
                .audio_transcript
                .as_deref()
                .is_some_and(|transcript| !transcript.trim().is_empty());
        if !has_text && message.images.is_empty() && message.documents.is_empty() {
            return Err(ChatError::invalid_request("message has no content"));
        }

        Ok(())
    }
}

/// Keeps at most `limit` characters from the head of `content`, cut back to
/// the last complete line. A first line longer than `limit` keeps nothing.
/// Returns the kept text with the original and kept character counts.
fn truncate_at_line(content: &str, limit: usize) -> (&str, usize, usize) {
    let original_chars = content.chars().count();
    if original_chars <= limit {
        return (content, original_chars, original_chars);
    }

    let byte_limit = content
        .char_indices()
        .nth(limit)
        .map_or(content.len(), |(index, _)| index);
    let head = &content[..byte_limit];
    let kept = head.rfind('\n').map_or("", |newline| &head[..newline]);

    (kept, original_chars, kept.chars().count())
}
