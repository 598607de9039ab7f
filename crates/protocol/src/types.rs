//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of server-side conversation history (model context)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Machine-readable codes carried by `ServerMessage::Error`
pub mod error_codes {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const EMPTY_MESSAGE: &str = "empty_message";
    pub const BUSY: &str = "busy";
    pub const GENERATION_FAILED: &str = "generation_failed";
    pub const SESSION_CLOSED: &str = "session_closed";
}
