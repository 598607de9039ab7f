//! Server → Client messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::*;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // Connection
    Connected {
        session_id: String,
        message: String,
    },

    // Generation lifecycle
    GenerationStarted,
    /// `full_text` is the whole accumulated response so far, never a delta.
    /// `chunk` is the delta that produced it and is informational only.
    ResponseChunk {
        #[serde(default)]
        chunk: String,
        full_text: String,
    },
    GenerationCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_text: Option<String>,
    },
    GenerationStopped,

    // History
    HistoryCleared,
    History {
        messages: Vec<HistoryEntry>,
    },

    // Visualization payload for the scene renderer
    CanvasExpand {
        simulation_data: Value,
    },

    // Keepalive
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    // Errors
    Error {
        #[serde(default)]
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Wire name of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::GenerationStarted => "generation_started",
            ServerMessage::ResponseChunk { .. } => "response_chunk",
            ServerMessage::GenerationCompleted { .. } => "generation_completed",
            ServerMessage::GenerationStopped => "generation_stopped",
            ServerMessage::HistoryCleared => "history_cleared",
            ServerMessage::History { .. } => "history",
            ServerMessage::CanvasExpand { .. } => "canvas_expand",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}
