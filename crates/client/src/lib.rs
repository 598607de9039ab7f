//! chatdock client
//!
//! Keeps a local transcript in sync with a streaming chat server: one
//! session channel, a pure generation state machine, and a sanitizer that
//! keeps half-streamed Markdown from rendering broken images.

pub mod channel;
pub mod error;
pub mod generation;
pub mod history;
pub mod logging;
pub mod sanitizer;
pub mod session;
pub mod transcript;

pub use channel::{ChannelEvent, SessionChannel};
pub use error::{SessionError, TransportError};
pub use generation::{ConnectionState, GenerationState, SessionEvent};
pub use session::{ChatSession, SessionConfig};
pub use transcript::{Message, MessageId, Transcript};
