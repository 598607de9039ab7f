//! Incremental decoder for `text/event-stream` chat-completion bodies.
//!
//! Bytes arrive in arbitrary slices (a line, or even a UTF-8 code point, may
//! be split across network reads), so complete lines are buffered before
//! decoding.

use chatdock_connector_core::ConnectorError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content delta from `choices[0].delta.content`
    Delta(String),
    /// The `data: [DONE]` terminator
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl SseDecoder {
    /// Feed the next slice of the body. Returns every event completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent, ConnectorError>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final unterminated line once the body has ended.
    pub fn finish(&mut self) -> Option<Result<SseEvent, ConnectorError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<SseEvent, ConnectorError>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim_end_matches(['\r', '\n']),
        Err(e) => return Some(Err(ConnectorError::StreamError(e.to_string()))),
    };

    // Comments, `event:`/`id:` fields and blank separators carry no content.
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }

    let chunk: CompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(ConnectorError::JsonError(e))),
    };
    if let Some(error) = chunk.error {
        return Some(Err(ConnectorError::StreamError(error.message)));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(|content| Ok(SseEvent::Delta(content)))
}
