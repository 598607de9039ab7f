//! Conversation actor: owns one connection's history and drives generations.
//!
//! Each session runs as an independent tokio task. The websocket handler
//! talks to it through `SessionActorHandle`, which sends `SessionCommand`s
//! over an mpsc channel. The loop selects between commands and the running
//! generation's chunk stream, so a stop is handled between two chunks.

use std::sync::Arc;

use chatdock_connector_core::{ChunkStream, ConnectorError, Generator};
use chatdock_protocol::{error_codes, ServerMessage};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::session_command::SessionCommand;
use crate::visualization::extract_visualization;
use crate::websocket::OutboundMessage;

/// Handle to a running conversation actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionActorHandle {
    pub id: String,
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionActorHandle {
    /// Spawn an actor that writes its events to `outbound`.
    pub fn spawn(
        id: String,
        generator: Arc<dyn Generator>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let actor = ConversationActor {
            id: id.clone(),
            generator,
            conversation: Conversation::new(),
            active: None,
            outbound,
        };
        let task = tokio::spawn(actor.run(command_rx));
        (SessionActorHandle { id, command_tx }, task)
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, cmd: SessionCommand) {
        let kind = cmd.kind();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                session_id = %self.id,
                command = kind,
                "Actor channel closed, command dropped"
            );
        }
    }
}

struct ActiveGeneration {
    user_text: String,
    accumulated: String,
    stream: ChunkStream,
}

struct ConversationActor {
    id: String,
    generator: Arc<dyn Generator>,
    conversation: Conversation,
    active: Option<ActiveGeneration>,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl ConversationActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                item = next_chunk(&mut self.active), if self.active.is_some() => {
                    self.handle_stream_item(item).await;
                }
            }
        }

        if let Some(generation) = self.active.take() {
            info!(
                component = "session_actor",
                event = "generation.cancelled",
                session_id = %self.id,
                partial_bytes = generation.accumulated.len(),
                "Session closed with a generation in flight"
            );
        }
        debug!(
            component = "session_actor",
            event = "session_actor.stopped",
            session_id = %self.id,
            "Conversation actor stopped"
        );
    }

    // `&mut self`: the chunk stream is not `Sync`.
    async fn emit(&mut self, msg: ServerMessage) {
        let _ = self.outbound.send(OutboundMessage::Json(msg)).await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::UserMessage { text } => self.start_generation(text).await,

            SessionCommand::StopGeneration => {
                let Some(generation) = self.active.take() else {
                    // A stop that raced a completion; nothing left to cancel.
                    debug!(
                        component = "session_actor",
                        event = "generation.stop_ignored",
                        session_id = %self.id,
                        "Stop requested while idle"
                    );
                    return;
                };
                let ActiveGeneration {
                    user_text,
                    accumulated,
                    stream,
                } = generation;
                drop(stream);

                info!(
                    component = "session_actor",
                    event = "generation.stopped",
                    session_id = %self.id,
                    partial_bytes = accumulated.len(),
                    "Generation stopped by client"
                );
                if !accumulated.trim().is_empty() {
                    self.conversation.record_turn(user_text, accumulated);
                }
                self.emit(ServerMessage::GenerationStopped).await;
            }

            SessionCommand::ClearHistory => {
                if self.active.take().is_some() {
                    self.emit(ServerMessage::GenerationStopped).await;
                }
                self.conversation.clear();
                info!(
                    component = "session_actor",
                    event = "history.cleared",
                    session_id = %self.id,
                    "History cleared"
                );
                self.emit(ServerMessage::HistoryCleared).await;
            }

            SessionCommand::GetHistory { reply } => {
                let _ = reply.send(self.conversation.entries().to_vec());
            }

            // Handled by the loop.
            SessionCommand::Shutdown => {}
        }
    }

    async fn start_generation(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.emit(ServerMessage::error(
                error_codes::EMPTY_MESSAGE,
                "Message cannot be empty",
            ))
            .await;
            return;
        }
        if self.active.is_some() {
            self.emit(ServerMessage::error(
                error_codes::BUSY,
                "A generation is already in progress",
            ))
            .await;
            return;
        }

        info!(
            component = "session_actor",
            event = "generation.started",
            session_id = %self.id,
            generator = self.generator.name(),
            history_len = self.conversation.len(),
            prompt_bytes = text.len(),
            "Starting generation"
        );

        let stream = self.generator.generate(&self.conversation.context_with(&text));
        self.active = Some(ActiveGeneration {
            user_text: text,
            accumulated: String::new(),
            stream,
        });
        self.emit(ServerMessage::GenerationStarted).await;
    }

    async fn handle_stream_item(&mut self, item: Option<Result<String, ConnectorError>>) {
        match item {
            Some(Ok(delta)) => {
                if delta.is_empty() {
                    return;
                }
                let Some(generation) = self.active.as_mut() else {
                    return;
                };
                generation.accumulated.push_str(&delta);
                let full_text = generation.accumulated.clone();
                let visualization = extract_visualization(&delta);

                self.emit(ServerMessage::ResponseChunk {
                    chunk: delta,
                    full_text,
                })
                .await;

                if let Some(simulation_data) = visualization {
                    info!(
                        component = "session_actor",
                        event = "generation.visualization",
                        session_id = %self.id,
                        "Forwarding visualization payload"
                    );
                    self.emit(ServerMessage::CanvasExpand { simulation_data })
                        .await;
                }
            }

            Some(Err(e)) => {
                let partial = self.active.take().map(|g| g.accumulated.len());
                warn!(
                    component = "session_actor",
                    event = "generation.failed",
                    session_id = %self.id,
                    partial_bytes = ?partial,
                    error = %e,
                    "Generation failed"
                );
                self.emit(ServerMessage::error(
                    error_codes::GENERATION_FAILED,
                    e.to_string(),
                ))
                .await;
            }

            None => {
                let Some(generation) = self.active.take() else {
                    return;
                };
                info!(
                    component = "session_actor",
                    event = "generation.completed",
                    session_id = %self.id,
                    response_bytes = generation.accumulated.len(),
                    "Generation completed"
                );
                self.conversation
                    .record_turn(generation.user_text, generation.accumulated.clone());
                self.emit(ServerMessage::GenerationCompleted {
                    final_text: Some(generation.accumulated),
                })
                .await;
            }
        }
    }
}

async fn next_chunk(
    active: &mut Option<ActiveGeneration>,
) -> Option<Result<String, ConnectorError>> {
    match active {
        Some(generation) => generation.stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chatdock_connector_core::ScriptedGenerator;
    use chatdock_protocol::HistoryEntry;
    use tokio::sync::oneshot;

    fn spawn_with(
        generator: ScriptedGenerator,
    ) -> (SessionActorHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let (handle, _task) =
            SessionActorHandle::spawn("session_test".to_string(), Arc::new(generator), tx);
        (handle, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<OutboundMessage>) -> ServerMessage {
        match rx.recv().await {
            Some(OutboundMessage::Json(msg)) => msg,
            Some(other) => panic!("unexpected outbound frame: {:?}", other),
            None => panic!("actor closed outbound channel"),
        }
    }

    async fn history(handle: &SessionActorHandle) -> Vec<HistoryEntry> {
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::GetHistory { reply: tx }).await;
        rx.await.expect("history reply")
    }

    #[tokio::test]
    async fn streams_snapshots_and_records_turn() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::fixed(
            ["Hi", " the", "re!"],
            Duration::ZERO,
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: " hello ".to_string(),
            })
            .await;

        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);
        let mut snapshots = Vec::new();
        loop {
            match next(&mut rx).await {
                ServerMessage::ResponseChunk { full_text, .. } => snapshots.push(full_text),
                ServerMessage::GenerationCompleted { final_text } => {
                    assert_eq!(final_text.as_deref(), Some("Hi there!"));
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(snapshots, vec!["Hi", "Hi the", "Hi there!"]);
        assert_eq!(
            history(&handle).await,
            vec![HistoryEntry::user("hello"), HistoryEntry::assistant("Hi there!")]
        );
    }

    #[tokio::test]
    async fn rejects_empty_and_concurrent_messages() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::fixed(
            ["slow"],
            Duration::from_secs(60),
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: "   ".to_string(),
            })
            .await;
        assert!(matches!(
            next(&mut rx).await,
            ServerMessage::Error { code, .. } if code == error_codes::EMPTY_MESSAGE
        ));

        handle
            .send(SessionCommand::UserMessage {
                text: "one".to_string(),
            })
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);

        handle
            .send(SessionCommand::UserMessage {
                text: "two".to_string(),
            })
            .await;
        assert!(matches!(
            next(&mut rx).await,
            ServerMessage::Error { code, .. } if code == error_codes::BUSY
        ));
    }

    #[tokio::test]
    async fn stop_keeps_partial_output() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::fixed(
            ["Partial", " answer", " never sent"],
            Duration::from_millis(50),
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);
        assert!(matches!(
            next(&mut rx).await,
            ServerMessage::ResponseChunk { full_text, .. } if full_text == "Partial"
        ));

        handle.send(SessionCommand::StopGeneration).await;
        loop {
            match next(&mut rx).await {
                ServerMessage::GenerationStopped => break,
                ServerMessage::ResponseChunk { .. } => continue,
                other => panic!("unexpected {:?}", other),
            }
        }

        let recorded = history(&handle).await;
        assert_eq!(recorded.len(), 2);
        assert!(recorded[1].content.starts_with("Partial"));
        assert_ne!(recorded[1].content, "Partial answer never sent");
    }

    #[tokio::test]
    async fn stop_while_idle_is_ignored() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::echo(Duration::ZERO));
        handle.send(SessionCommand::StopGeneration).await;
        assert!(history(&handle).await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_reports_error_and_records_nothing() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::failing(
            ["Half"],
            "model crashed",
            Duration::ZERO,
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);
        assert!(matches!(next(&mut rx).await, ServerMessage::ResponseChunk { .. }));
        match next(&mut rx).await {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, error_codes::GENERATION_FAILED);
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(history(&handle).await.is_empty());
    }

    #[tokio::test]
    async fn clear_stops_generation_and_resets_history() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::fixed(
            ["slow"],
            Duration::from_secs(60),
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);

        handle.send(SessionCommand::ClearHistory).await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStopped);
        assert_eq!(next(&mut rx).await, ServerMessage::HistoryCleared);
        assert!(history(&handle).await.is_empty());
    }

    #[tokio::test]
    async fn visualization_chunk_emits_canvas_expand() {
        let (handle, mut rx) = spawn_with(ScriptedGenerator::fixed(
            [r#"Here: {"visualization_type": "pic_simulation", "frames": 2}"#],
            Duration::ZERO,
        ));
        handle
            .send(SessionCommand::UserMessage {
                text: "simulate".to_string(),
            })
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::GenerationStarted);
        assert!(matches!(next(&mut rx).await, ServerMessage::ResponseChunk { .. }));
        match next(&mut rx).await {
            ServerMessage::CanvasExpand { simulation_data } => {
                assert_eq!(simulation_data["visualization_type"], "pic_simulation");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_ends_the_actor() {
        let (tx, _rx) = mpsc::channel(8);
        let (handle, task) = SessionActorHandle::spawn(
            "session_test".to_string(),
            Arc::new(ScriptedGenerator::echo(Duration::ZERO)),
            tx,
        );
        handle.send(SessionCommand::Shutdown).await;
        task.await.expect("actor task");
    }
}
