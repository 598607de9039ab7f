//! Scripted generator
//!
//! Deterministic backend used by tests and the `echo` server backend.

use std::time::Duration;

use chatdock_protocol::{HistoryEntry, Role};
use futures::stream::{self, StreamExt};

use crate::{ChunkStream, ConnectorError, Generator};

#[derive(Debug, Clone)]
enum Script {
    /// Echo the last user turn back, one word per chunk.
    Echo,
    /// Replay fixed chunks regardless of input.
    Fixed(Vec<String>),
    /// Replay fixed chunks, then fail.
    FailAfter(Vec<String>, String),
}

#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    script: Script,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn echo(delay: Duration) -> Self {
        Self {
            script: Script::Echo,
            delay,
        }
    }

    pub fn fixed<I, S>(chunks: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Fixed(chunks.into_iter().map(Into::into).collect()),
            delay,
        }
    }

    pub fn failing<I, S>(chunks: I, error: impl Into<String>, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::FailAfter(chunks.into_iter().map(Into::into).collect(), error.into()),
            delay,
        }
    }

    fn chunks_for(&self, history: &[HistoryEntry]) -> (Vec<String>, Option<String>) {
        match &self.script {
            Script::Echo => {
                let prompt = history
                    .iter()
                    .rev()
                    .find(|entry| entry.role == Role::User)
                    .map(|entry| entry.content.as_str())
                    .unwrap_or_default();
                (echo_chunks(prompt), None)
            }
            Script::Fixed(chunks) => (chunks.clone(), None),
            Script::FailAfter(chunks, error) => (chunks.clone(), Some(error.clone())),
        }
    }
}

/// Split `prompt` into word-sized chunks that concatenate back to
/// `"You said: {prompt}"`.
fn echo_chunks(prompt: &str) -> Vec<String> {
    let mut chunks = vec!["You said:".to_string()];
    chunks.extend(prompt.split_inclusive(char::is_whitespace).enumerate().map(
        |(index, word)| {
            if index == 0 {
                format!(" {}", word)
            } else {
                word.to_string()
            }
        },
    ));
    chunks
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, history: &[HistoryEntry]) -> ChunkStream {
        let (chunks, failure) = self.chunks_for(history);
        let delay = self.delay;

        let items = chunks
            .into_iter()
            .map(Ok)
            .chain(failure.map(|e| Err(ConnectorError::RequestError(e))));

        stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(generator: &ScriptedGenerator, history: &[HistoryEntry]) -> Vec<String> {
        generator
            .generate(history)
            .filter_map(|item| async move { item.ok() })
            .collect()
            .await
    }

    #[tokio::test]
    async fn echo_reassembles_prompt() {
        let generator = ScriptedGenerator::echo(Duration::ZERO);
        let history = vec![HistoryEntry::user("hello big world")];

        let chunks = collect(&generator, &history).await;

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), "You said: hello big world");
    }

    #[tokio::test]
    async fn echo_uses_latest_user_turn() {
        let generator = ScriptedGenerator::echo(Duration::ZERO);
        let history = vec![
            HistoryEntry::user("first"),
            HistoryEntry::assistant("You said: first"),
            HistoryEntry::user("second"),
        ];

        let chunks = collect(&generator, &history).await;
        assert_eq!(chunks.concat(), "You said: second");
    }

    #[tokio::test]
    async fn fixed_replays_chunks_in_order() {
        let generator = ScriptedGenerator::fixed(["Hi", " the", "re!"], Duration::ZERO);
        let chunks = collect(&generator, &[]).await;
        assert_eq!(chunks, vec!["Hi", " the", "re!"]);
    }

    #[tokio::test]
    async fn failing_ends_with_error() {
        let generator = ScriptedGenerator::failing(["partial"], "backend down", Duration::ZERO);
        let items: Vec<_> = generator.generate(&[]).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(ref s) if s == "partial"));
        match &items[1] {
            Err(ConnectorError::RequestError(msg)) => assert_eq!(msg, "backend down"),
            other => panic!("expected request error, got {:?}", other),
        }
    }
}
