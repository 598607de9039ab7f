use thiserror::Error;

/// Errors raised by the chat session. None of them is fatal: each one is a
/// rejected action or a visible state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A new send while a generation is in flight.
    #[error("A generation is already in progress")]
    Busy,

    /// A chunk/complete/stop event arrived with no streaming message.
    #[error("No streaming message is active")]
    NoActiveStream,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("A history clear is waiting for the server")]
    ClearPending,

    /// Connection lost or never established.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failure reported by the server for a generation.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Unexpected {0} event")]
    UnexpectedEvent(&'static str),
}

impl SessionError {
    /// True when the server and client disagree about the generation state.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            SessionError::NoActiveStream | SessionError::UnexpectedEvent(_)
        )
    }
}

/// Errors from the WebSocket transport under a `SessionChannel`
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        SessionError::Transport(e.to_string())
    }
}
