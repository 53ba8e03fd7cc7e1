use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the conversation history handed to the adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub media_type: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatLogEntry {
    pub fn text(employee_id: Uuid, role: ChatRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id,
            role,
            content: content.into(),
            media_type: "text".to_string(),
            timestamp,
        }
    }

    /// A user turn followed by its assistant reply, one microsecond apart so
    /// ordering by timestamp keeps the pair in order.
    pub fn exchange(employee_id: Uuid, user: &str, assistant: &str, at: DateTime<Utc>) -> [Self; 2] {
        [
            Self::text(employee_id, ChatRole::User, user, at),
            Self::text(
                employee_id,
                ChatRole::Assistant,
                assistant,
                at + chrono::Duration::microseconds(1),
            ),
        ]
    }
}
