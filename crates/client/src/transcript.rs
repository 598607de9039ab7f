//! Transcript store
//!
//! Ordered, append-only list of messages for one session. At most one
//! assistant message is streaming at a time; its `raw_content` only ever
//! grows, by replacement with a newer full snapshot.

use chatdock_protocol::Role;
use chrono::{DateTime, Utc};

use crate::error::SessionError;
use crate::sanitizer;

/// Final text of a generation stopped before it produced anything.
pub const STOPPED_PLACEHOLDER: &str = "*(generation stopped before any output)*";

/// Message identifier. Allocated from a per-transcript counter, so ids
/// order the same way messages were appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Authoritative text as accumulated from the server.
    pub raw_content: String,
    /// Derived from `raw_content` by the sanitizer; never authoritative.
    pub display_content: String,
    pub created_at: DateTime<Utc>,
    pub streaming: bool,
    /// Synthetic message carrying a server-reported failure.
    pub is_error: bool,
    /// Bare image URLs seen by the latest streaming pass. Cleared on finalize.
    pub detected_images: Vec<String>,
}

impl Message {
    fn settled(id: MessageId, role: Role, content: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            display_content: sanitizer::finalize(&content),
            raw_content: content,
            created_at: now,
            streaming: false,
            is_error: false,
            detected_images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The unique message with `streaming = true`, if any.
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.streaming)
    }

    fn streaming_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.streaming)
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append a message. A second streaming message is refused.
    pub fn append(&mut self, message: Message) -> Result<&Message, SessionError> {
        if message.streaming && self.streaming().is_some() {
            return Err(SessionError::UnexpectedEvent("generation_started"));
        }
        self.next_id = self.next_id.max(message.id.0 + 1);
        self.messages.push(message);
        Ok(self.last_appended())
    }

    fn last_appended(&self) -> &Message {
        // Only called right after a push.
        &self.messages[self.messages.len() - 1]
    }

    pub fn append_user(&mut self, text: &str, now: DateTime<Utc>) -> &Message {
        let id = self.allocate_id();
        self.messages
            .push(Message::settled(id, Role::User, text.to_string(), now));
        self.last_appended()
    }

    /// Synthetic assistant message carrying an error text.
    pub fn append_error(&mut self, text: &str, now: DateTime<Utc>) -> &Message {
        let id = self.allocate_id();
        let mut message = Message::settled(id, Role::Assistant, text.to_string(), now);
        message.is_error = true;
        self.messages.push(message);
        self.last_appended()
    }

    /// Start the streaming assistant message with empty content.
    pub fn begin_assistant(&mut self, now: DateTime<Utc>) -> Result<&Message, SessionError> {
        let id = MessageId(self.next_id);
        self.append(Message {
            id,
            role: Role::Assistant,
            raw_content: String::new(),
            display_content: String::new(),
            created_at: now,
            streaming: true,
            is_error: false,
            detected_images: Vec::new(),
        })
    }

    /// Replace the streaming message's text with a full snapshot.
    ///
    /// Returns `Ok(false)` when nothing changed: the same snapshot again, or
    /// a stale one that is a strict prefix of what is already held.
    pub fn update_streaming(&mut self, full_text: &str) -> Result<bool, SessionError> {
        let message = self
            .streaming_mut()
            .ok_or(SessionError::NoActiveStream)?;

        if message.raw_content.starts_with(full_text) {
            return Ok(false);
        }

        message.raw_content = full_text.to_string();
        let sanitized = sanitizer::sanitize_streaming(&message.raw_content);
        message.display_content = sanitized.display;
        message.detected_images = sanitized.detected_images;
        Ok(true)
    }

    /// Clear the streaming flag and run the final sanitizer pass. The raw
    /// content is left untouched.
    pub fn finalize(&mut self) -> Result<&Message, SessionError> {
        let message = self
            .streaming_mut()
            .ok_or(SessionError::NoActiveStream)?;
        message.streaming = false;
        message.display_content = sanitizer::finalize(&message.raw_content);
        message.detected_images.clear();
        Ok(message)
    }

    /// Finalize a generation that ended early: keep partial text as final,
    /// or substitute [`STOPPED_PLACEHOLDER`] when nothing was produced.
    pub fn finalize_partial(&mut self) -> Result<&Message, SessionError> {
        let message = self
            .streaming_mut()
            .ok_or(SessionError::NoActiveStream)?;
        if message.raw_content.trim().is_empty() {
            message.raw_content = STOPPED_PLACEHOLDER.to_string();
        }
        self.finalize()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    #[test]
    fn ids_follow_append_order() {
        let mut transcript = Transcript::new();
        let a = transcript.append_user("a", now()).id;
        let b = transcript.begin_assistant(now()).expect("begin").id;
        transcript.finalize().expect("finalize");
        let c = transcript.append_error("boom", now()).id;

        assert!(a < b && b < c);
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn only_one_streaming_message() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant(now()).expect("first");
        let err = transcript.begin_assistant(now()).unwrap_err();
        assert_eq!(err, SessionError::UnexpectedEvent("generation_started"));
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn update_replaces_instead_of_appending() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant(now()).expect("begin");

        assert!(transcript.update_streaming("Hi the").expect("update"));
        assert!(transcript.update_streaming("Hi there!").expect("update"));
        assert_eq!(
            transcript.streaming().map(|m| m.raw_content.as_str()),
            Some("Hi there!")
        );
    }

    #[test]
    fn repeated_and_stale_snapshots_are_ignored() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant(now()).expect("begin");
        transcript.update_streaming("Hi there!").expect("update");

        assert!(!transcript.update_streaming("Hi there!").expect("same"));
        assert!(!transcript.update_streaming("Hi").expect("stale"));
        assert_eq!(
            transcript.streaming().map(|m| m.raw_content.as_str()),
            Some("Hi there!")
        );
    }

    #[test]
    fn update_without_stream_fails() {
        let mut transcript = Transcript::new();
        transcript.append_user("hello", now());
        assert_eq!(
            transcript.update_streaming("x"),
            Err(SessionError::NoActiveStream)
        );
        assert_eq!(transcript.messages()[0].raw_content, "hello");
    }

    #[test]
    fn finalize_clears_flag_but_keeps_content() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant(now()).expect("begin");
        transcript
            .update_streaming("see https://img.example.com/a/cat.png")
            .expect("update");
        assert_eq!(
            transcript.streaming().map(|m| m.detected_images.len()),
            Some(1)
        );

        let message = transcript.finalize().expect("finalize").clone();
        assert!(!message.streaming);
        assert_eq!(message.raw_content, "see https://img.example.com/a/cat.png");
        assert_eq!(
            message.display_content,
            "see ![generated image](https://img.example.com/a/cat.png)"
        );
        assert!(message.detected_images.is_empty());
        assert!(transcript.streaming().is_none());
    }

    #[test]
    fn finalize_partial_substitutes_placeholder_only_when_empty() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant(now()).expect("begin");
        transcript.update_streaming("  \n").expect("update");
        let message = transcript.finalize_partial().expect("finalize");
        assert_eq!(message.raw_content, STOPPED_PLACEHOLDER);

        transcript.begin_assistant(now()).expect("begin");
        transcript.update_streaming("Partial ans").expect("update");
        let message = transcript.finalize_partial().expect("finalize");
        assert_eq!(message.raw_content, "Partial ans");
        assert_eq!(message.display_content, "Partial ans");
    }

    #[test]
    fn clear_empties_but_ids_keep_growing() {
        let mut transcript = Transcript::new();
        let first = transcript.append_user("one", now()).id;
        transcript.clear();
        assert!(transcript.is_empty());

        let second = transcript.append_user("two", now()).id;
        assert!(second > first);
    }
}
