//! OpenAI-compatible connector
//!
//! Streams `/chat/completions` from any server speaking the OpenAI wire format
//! (vLLM, llama.cpp server, hosted APIs). Deltas are forwarded through an
//! mpsc channel; dropping the returned stream closes the channel, which
//! aborts the HTTP request.

pub mod sse;

use std::sync::Arc;

use chatdock_connector_core::{ChunkStream, ConnectorError, Generator};
use chatdock_protocol::HistoryEntry;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sse::{SseDecoder, SseEvent};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
pub const DEFAULT_TOP_P: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub top_p: f64,
    pub system_prompt: Option<String>,
}

impl OpenAiConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: None,
            top_p: DEFAULT_TOP_P,
            system_prompt: None,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    top_p: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: Arc<OpenAiConfig>,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    fn request_body(&self, history: &[HistoryEntry]) -> Result<Vec<u8>, ConnectorError> {
        let config = &self.config;
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = config.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(history.iter().map(|entry| ChatMessage {
            role: entry.role.as_str(),
            content: &entry.content,
        }));

        let body = ChatRequest {
            model: &config.model,
            messages,
            stream: true,
            top_p: config.top_p,
        };
        Ok(serde_json::to_vec(&body)?)
    }
}

impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, history: &[HistoryEntry]) -> ChunkStream {
        let (tx, rx) = mpsc::channel::<Result<String, ConnectorError>>(64);

        match self.request_body(history) {
            Ok(body) => {
                let mut request = self
                    .client
                    .post(self.config.completions_url())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body);
                if let Some(key) = self.config.api_key.as_deref() {
                    request = request.bearer_auth(key);
                }
                tokio::spawn(forward_completion(request, tx));
            }
            Err(e) => {
                // Capacity is non-zero and the receiver is alive, so this cannot fail.
                let _ = tx.try_send(Err(e));
            }
        }

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }
}

async fn forward_completion(
    request: reqwest::RequestBuilder,
    tx: mpsc::Sender<Result<String, ConnectorError>>,
) {
    if let Err(e) = stream_completion(request, &tx).await {
        warn!(
            component = "connector_openai",
            event = "openai.stream.failed",
            error = %e,
            "Completion stream failed"
        );
        let _ = tx.send(Err(e)).await;
    }
}

async fn stream_completion(
    request: reqwest::RequestBuilder,
    tx: &mpsc::Sender<Result<String, ConnectorError>>,
) -> Result<(), ConnectorError> {
    let response = request
        .send()
        .await
        .map_err(|e| ConnectorError::RequestError(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!(
                    component = "connector_openai",
                    event = "openai.stream.cancelled",
                    "Consumer dropped the stream, aborting request"
                );
                return Ok(());
            }
            next = body.next() => next,
        };

        let Some(bytes) = next else {
            // Body ended without a [DONE] terminator; flush whatever is buffered.
            if let Some(event) = decoder.finish() {
                if let SseEvent::Delta(text) = event? {
                    let _ = tx.send(Ok(text)).await;
                }
            }
            return Ok(());
        };

        let bytes = bytes.map_err(|e| ConnectorError::RequestError(e.to_string()))?;
        for event in decoder.push(&bytes) {
            match event? {
                SseEvent::Delta(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        return Ok(());
                    }
                }
                SseEvent::Done => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_prepends_system_prompt() {
        let mut config = OpenAiConfig::new("qwen");
        config.system_prompt = Some("Be brief.".to_string());
        let generator = OpenAiGenerator::new(config);

        let body = generator
            .request_body(&[HistoryEntry::user("hello")])
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");

        assert_eq!(json["model"], "qwen");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        let mut config = OpenAiConfig::new("m");
        config.base_url = "http://localhost:8000/v1/".to_string();
        assert_eq!(
            config.completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );
    }
}
