//! Session channel
//!
//! One long-lived, full-duplex connection carrying typed messages. The
//! socket is split between a writer task fed by an mpsc queue and a reader
//! task that decodes frames and forwards them in arrival order. Loss of the
//! connection is delivered once, as [`ChannelEvent::Disconnected`].

use chatdock_protocol::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::TransportError;

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(ServerMessage),
    Disconnected { reason: String },
}

pub struct SessionChannel {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<ChannelEvent>,
    closed: bool,
}

impl SessionChannel {
    /// Open a WebSocket to `url` and start the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        info!(
            component = "channel",
            event = "channel.connected",
            url = %url,
            "Connected to chat server"
        );

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ChannelEvent>(INBOUND_CAPACITY);

        // Writer: drains the outbound queue until the session drops its sender.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(
                            component = "channel",
                            event = "channel.serialize_failed",
                            error = %e,
                            "Failed to serialize outbound message"
                        );
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: decodes server frames, reports the disconnect reason once.
        tokio::spawn(async move {
            let reason = loop {
                match ws_rx.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => {
                                if inbound_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(
                                    component = "channel",
                                    event = "channel.decode_failed",
                                    error = %e,
                                    payload_bytes = text.len(),
                                    "Dropping undecodable server frame"
                                );
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| format!("server closed the connection: {}", f.reason))
                            .unwrap_or_else(|| "server closed the connection".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "connection closed".to_string(),
                }
            };

            debug!(
                component = "channel",
                event = "channel.reader_finished",
                reason = %reason,
                "Reader task finished"
            );
            let _ = inbound_tx.send(ChannelEvent::Disconnected { reason }).await;
        });

        Ok(Self::from_parts(outbound_tx, inbound_rx))
    }

    /// Build a channel over arbitrary queues. The far ends stand in for the
    /// server: drop the `ChannelEvent` sender to simulate a lost connection.
    pub fn from_parts(
        outbound: mpsc::Sender<ClientMessage>,
        inbound: mpsc::Receiver<ChannelEvent>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            closed: false,
        }
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Next inbound event. After the first `Disconnected`, returns `None`.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        let event = self
            .inbound
            .recv()
            .await
            .unwrap_or_else(|| ChannelEvent::Disconnected {
                reason: "channel closed".to_string(),
            });
        if matches!(event, ChannelEvent::Disconnected { .. }) {
            self.closed = true;
        }
        Some(event)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
