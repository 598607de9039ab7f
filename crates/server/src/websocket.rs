//! WebSocket handling

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use chatdock_protocol::{error_codes, new_id, ClientMessage, ServerMessage};

use crate::session_actor::SessionActorHandle;
use crate::session_command::SessionCommand;
use crate::state::SessionRegistry;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const GREETING: &str = "Connected to chatdock";

/// Messages that can be sent through the WebSocket
#[derive(Debug)]
pub enum OutboundMessage {
    /// JSON-serialized ServerMessage
    Json(ServerMessage),
    /// Raw pong response
    Pong(Bytes),
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SessionRegistry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<SessionRegistry>) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let session_id = format!("session_{}", new_id());
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        session_id = %session_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending messages to this client
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(100);

    // Spawn task to forward messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let result = match msg {
                OutboundMessage::Json(server_msg) => match serde_json::to_string(&server_msg) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = conn_id,
                            error = %e,
                            "Failed to serialize server message"
                        );
                        continue;
                    }
                },
                OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    let (actor, actor_task) =
        SessionActorHandle::spawn(session_id.clone(), state.generator(), outbound_tx.clone());
    state.add_session(actor.clone());

    send_json(
        &outbound_tx,
        ServerMessage::Connected {
            session_id: session_id.clone(),
            message: GREETING.to_string(),
        },
    )
    .await;

    // Handle incoming messages
    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = conn_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        // Parse client message
        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    connection_id = conn_id,
                    error = %e,
                    payload_bytes = msg.len(),
                    payload_preview = %truncate_for_log(&msg, 240),
                    "Failed to parse client message"
                );
                send_json(
                    &outbound_tx,
                    ServerMessage::error(error_codes::PARSE_ERROR, e.to_string()),
                )
                .await;
                continue;
            }
        };

        handle_client_message(client_msg, &outbound_tx, &actor, conn_id).await;
    }

    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        session_id = %session_id,
        "WebSocket connection closed"
    );

    state.remove_session(&session_id);
    actor.send(SessionCommand::Shutdown).await;
    let _ = actor_task.await;
    send_task.abort();
}

async fn handle_client_message(
    msg: ClientMessage,
    client_tx: &mpsc::Sender<OutboundMessage>,
    actor: &SessionActorHandle,
    conn_id: u64,
) {
    debug!(
        component = "websocket",
        event = "ws.message.received",
        connection_id = conn_id,
        session_id = %actor.id,
        message_type = msg.kind(),
        "Client message"
    );

    match msg {
        ClientMessage::Message { text } => {
            actor.send(SessionCommand::UserMessage { text }).await;
        }

        ClientMessage::StopGeneration => {
            actor.send(SessionCommand::StopGeneration).await;
        }

        ClientMessage::ClearHistory => {
            actor.send(SessionCommand::ClearHistory).await;
        }

        ClientMessage::GetHistory => {
            let (reply_tx, reply_rx) = oneshot::channel();
            actor
                .send(SessionCommand::GetHistory { reply: reply_tx })
                .await;
            match reply_rx.await {
                Ok(messages) => send_json(client_tx, ServerMessage::History { messages }).await,
                Err(_) => {
                    send_json(
                        client_tx,
                        ServerMessage::error(error_codes::SESSION_CLOSED, "Session is closed"),
                    )
                    .await
                }
            }
        }

        ClientMessage::Ping { timestamp } => {
            send_json(client_tx, ServerMessage::Pong { timestamp }).await;
        }
    }
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Send a ServerMessage through the outbound channel
async fn send_json(tx: &mpsc::Sender<OutboundMessage>, msg: ServerMessage) {
    let _ = tx.send(OutboundMessage::Json(msg)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chatdock_connector_core::ScriptedGenerator;
    use chatdock_protocol::HistoryEntry;

    fn spawn_actor() -> (
        SessionActorHandle,
        mpsc::Sender<OutboundMessage>,
        mpsc::Receiver<OutboundMessage>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (actor, _task) = SessionActorHandle::spawn(
            "session_test".to_string(),
            Arc::new(ScriptedGenerator::echo(Duration::ZERO)),
            tx.clone(),
        );
        (actor, tx, rx)
    }

    async fn next_json(rx: &mut mpsc::Receiver<OutboundMessage>) -> ServerMessage {
        match rx.recv().await {
            Some(OutboundMessage::Json(msg)) => msg,
            other => panic!("expected json frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_is_answered_directly() {
        let (actor, tx, mut rx) = spawn_actor();
        handle_client_message(ClientMessage::Ping { timestamp: Some(7) }, &tx, &actor, 1).await;
        assert_eq!(
            next_json(&mut rx).await,
            ServerMessage::Pong { timestamp: Some(7) }
        );
    }

    #[tokio::test]
    async fn history_round_trips_through_actor() {
        let (actor, tx, mut rx) = spawn_actor();
        handle_client_message(
            ClientMessage::Message {
                text: "hi".to_string(),
            },
            &tx,
            &actor,
            1,
        )
        .await;
        loop {
            if let ServerMessage::GenerationCompleted { .. } = next_json(&mut rx).await {
                break;
            }
        }

        handle_client_message(ClientMessage::GetHistory, &tx, &actor, 1).await;
        assert_eq!(
            next_json(&mut rx).await,
            ServerMessage::History {
                messages: vec![
                    HistoryEntry::user("hi"),
                    HistoryEntry::assistant("You said: hi"),
                ]
            }
        );
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 2), "hé");
    }
}
