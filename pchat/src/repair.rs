//! Restores a loaded history window to a structurally valid sequence.
//!
//! An assistant turn that requests tools must be followed immediately by
//! exactly one tool turn per requested id. Repair keeps the longest
//! subsequence satisfying that rule without inventing missing results.
//!
//! ```rust
//! use pchat::{ConversationTurn, is_structurally_valid, repair_history};
//! use pprovider::{ToolArguments, ToolCall, ToolResult};
//! use serde_json::json;
//!
//! let call = ToolCall::new("call_1", "search_web", ToolArguments::new());
//! let history = vec![
//!     ConversationTurn::tool("u1", &ToolResult::new("stray", json!({}))),
//!     ConversationTurn::human("u1", "hi"),
//!     ConversationTurn::assistant("u1", "", vec![call]),
//! ];
//! assert!(!is_structurally_valid(&history));
//!
//! let repaired = repair_history(history);
//! assert_eq!(repaired.removed, 2);
//! assert!(is_structurally_valid(&repaired.turns));
//! ```

use std::collections::HashSet;

use crate::{ConversationTurn, TurnRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub turns: Vec<ConversationTurn>,
    /// Number of turns dropped from the input.
    pub removed: usize,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        self.removed > 0
    }
}

/// An assistant turn whose tool calls are not all answered yet.
struct OpenGroup {
    assistant: ConversationTurn,
    outstanding: HashSet<String>,
    answered: Vec<ConversationTurn>,
}

impl OpenGroup {
    /// `None` when the turn repeats a call id, which no sequence of tool
    /// turns can answer unambiguously.
    fn open(assistant: ConversationTurn) -> Option<Self> {
        let outstanding = assistant
            .tool_calls
            .iter()
            .map(|call| call.id.clone())
            .collect::<HashSet<_>>();
        if outstanding.len() != assistant.tool_calls.len() {
            return None;
        }

        Some(Self {
            assistant,
            outstanding,
            answered: Vec::new(),
        })
    }
}

pub fn repair_history(turns: Vec<ConversationTurn>) -> RepairOutcome {
    let original = turns.len();
    let mut kept = Vec::with_capacity(original);
    let mut open: Option<OpenGroup> = None;

    for turn in turns {
        match turn.role {
            TurnRole::Tool => {
                let closes_open_call = match (&mut open, turn.tool_call_id.as_deref()) {
                    (Some(group), Some(id)) => group.outstanding.remove(id),
                    _ => false,
                };
                if !closes_open_call {
                    continue;
                }

                if let Some(mut group) = open.take() {
                    group.answered.push(turn);
                    if group.outstanding.is_empty() {
                        kept.push(group.assistant);
                        kept.extend(group.answered);
                    } else {
                        open = Some(group);
                    }
                }
            }
            TurnRole::Assistant if turn.has_tool_calls() => {
                open = OpenGroup::open(turn);
            }
            TurnRole::Human | TurnRole::Assistant => {
                open = None;
                kept.push(turn);
            }
        }
    }

    RepairOutcome {
        removed: original - kept.len(),
        turns: kept,
    }
}

/// Drops every tool turn and every assistant turn that requested tools.
pub fn strip_tool_turns(turns: Vec<ConversationTurn>) -> RepairOutcome {
    let original = turns.len();
    let kept = turns
        .into_iter()
        .filter(|turn| turn.role != TurnRole::Tool && !turn.has_tool_calls())
        .collect::<Vec<_>>();

    RepairOutcome {
        removed: original - kept.len(),
        turns: kept,
    }
}

pub fn is_structurally_valid(turns: &[ConversationTurn]) -> bool {
    let mut outstanding: HashSet<&str> = HashSet::new();

    for turn in turns {
        match turn.role {
            TurnRole::Tool => {
                let closed = turn
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| outstanding.remove(id));
                if !closed {
                    return false;
                }
            }
            _ if !outstanding.is_empty() => return false,
            TurnRole::Assistant => {
                outstanding = turn.tool_calls.iter().map(|call| call.id.as_str()).collect();
                if outstanding.len() != turn.tool_calls.len() {
                    return false;
                }
            }
            TurnRole::Human => {}
        }
    }

    outstanding.is_empty()
}
