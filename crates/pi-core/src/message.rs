//! Chat history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The human side
    User,
    /// An agent reply
    Assistant,
}

/// One entry in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique id
    pub id: Uuid,
    /// Author
    pub role: ChatRole,
    /// Text
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Agent that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl ChatMessage {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        }
    }

    /// Create an assistant message attributed to `agent`
    #[must_use]
    pub fn assistant(content: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            agent: Some(agent.into()),
        }
    }
}
