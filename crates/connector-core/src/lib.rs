//! chatdock connector core
//!
//! The model backend is an opaque generator of text chunks. Connectors
//! implement [`Generator`] and hand the server a stream of deltas; the server
//! owns accumulation, cancellation and the wire protocol.

pub mod scripted;

use chatdock_protocol::HistoryEntry;
use futures::stream::BoxStream;
use thiserror::Error;

pub use scripted::ScriptedGenerator;

/// Errors that can occur in connectors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Request failed: {0}")]
    RequestError(String),

    #[error("Backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed stream payload: {0}")]
    StreamError(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Stream of text deltas produced by one generation.
///
/// Dropping the stream cancels the generation.
pub type ChunkStream = BoxStream<'static, Result<String, ConnectorError>>;

/// A model backend.
pub trait Generator: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &str;

    /// Start a generation for the given conversation. The last entry is the
    /// user turn being answered.
    fn generate(&self, history: &[HistoryEntry]) -> ChunkStream;
}
