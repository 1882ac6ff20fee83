//! Structured event types emitted by `codex exec --json`

use serde::{Deserialize, Serialize};

/// Event type carrying the resumable session id
pub const THREAD_STARTED: &str = "thread.started";

/// Event type carrying a finished item
pub const ITEM_COMPLETED: &str = "item.completed";

/// Item type holding assistant text
pub const AGENT_MESSAGE: &str = "agent_message";

/// Item type holding model reasoning
pub const REASONING: &str = "reasoning";

/// One line of the structured event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexEvent {
    /// Event type (`thread.started`, `item.completed`, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Resumable id on `thread.started`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Payload on `item.*` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<CodexItem>,
}

/// Item payload of an `item.*` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexItem {
    /// Item type (`agent_message`, `reasoning`, `command_execution`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Item text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodexEvent {
    /// Parse one trimmed line; `None` if it is not a JSON object
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        if !value.is_object() {
            return None;
        }
        // Objects with unexpected field types are still events, just unrecognized ones
        Some(serde_json::from_value(value).unwrap_or_else(|_| Self {
            kind: String::new(),
            thread_id: None,
            item: None,
        }))
    }
}
