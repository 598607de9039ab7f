//! Generation state machine
//!
//! All session logic lives here as a pure, synchronous function:
//! `transition(state, input, now) -> (state, effects)`. User actions,
//! server events and transport changes all arrive as [`Input`]s; the
//! caller executes the returned [`Effect`]s.

use chatdock_protocol::{ClientMessage, HistoryEntry, ServerMessage};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SessionError;
use crate::history;
use crate::transcript::{Message, Transcript};

/// Text of the synthetic error message appended when a generation stalls.
pub const STALLED_MESSAGE: &str = "generation stalled: no response from server";

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    /// Message sent, waiting for `generation_started`.
    AwaitingStart,
    Streaming,
    /// Stop sent, waiting for the server to acknowledge. Chunks are still
    /// applied until it does.
    Completing,
}

impl GenerationState {
    pub fn in_flight(self) -> bool {
        self != GenerationState::Idle
    }

    fn has_stream(self) -> bool {
        matches!(
            self,
            GenerationState::Streaming | GenerationState::Completing
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub generation: GenerationState,
    /// A `clear_history` was sent and not yet acknowledged.
    pub pending_clear: bool,
    pub server_session_id: Option<String>,
    pub transcript: Transcript,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    // User actions
    Submit { text: String },
    StopRequested,
    ClearRequested,
    HistoryRequested,
    PingRequested { timestamp: Option<i64> },

    // Transport
    TransportConnected,
    TransportLost { reason: String },
    /// No server event within the stall timeout while a generation was in flight.
    Stalled,

    // Server events
    ServerHello { session_id: String, message: String },
    GenerationStarted,
    ResponseChunk { full_text: String },
    GenerationCompleted { final_text: Option<String> },
    GenerationStopped,
    ServerError { code: String, message: String },
    HistoryCleared,
    History { messages: Vec<HistoryEntry> },
    Visualization(Value),
    Pong { timestamp: Option<i64> },
}

impl From<ServerMessage> for Input {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Connected {
                session_id,
                message,
            } => Input::ServerHello {
                session_id,
                message,
            },
            ServerMessage::GenerationStarted => Input::GenerationStarted,
            ServerMessage::ResponseChunk { full_text, .. } => Input::ResponseChunk { full_text },
            ServerMessage::GenerationCompleted { final_text } => {
                Input::GenerationCompleted { final_text }
            }
            ServerMessage::GenerationStopped => Input::GenerationStopped,
            ServerMessage::Error { code, message } => Input::ServerError { code, message },
            ServerMessage::HistoryCleared => Input::HistoryCleared,
            ServerMessage::History { messages } => Input::History { messages },
            ServerMessage::CanvasExpand { simulation_data } => {
                Input::Visualization(simulation_data)
            }
            ServerMessage::Pong { timestamp } => Input::Pong { timestamp },
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Observable change, delivered to session subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionState),
    GenerationChanged(GenerationState),
    ServerHello { session_id: String, message: String },
    MessageAppended(Message),
    MessageUpdated(Message),
    MessageFinalized(Message),
    TranscriptCleared,
    /// Server history, and whether it disagrees with the local transcript.
    HistoryReceived {
        entries: Vec<HistoryEntry>,
        diverged: bool,
    },
    Visualization(Value),
    Pong { timestamp: Option<i64> },
    Failed(SessionError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Transmit(ClientMessage),
    Notify(Box<SessionEvent>),
    /// The input was refused; state is unchanged.
    Reject(SessionError),
}

pub(crate) fn notify(effects: &mut Vec<Effect>, event: SessionEvent) {
    effects.push(Effect::Notify(Box::new(event)));
}

fn set_generation(state: &mut SessionState, effects: &mut Vec<Effect>, next: GenerationState) {
    if state.generation != next {
        state.generation = next;
        notify(effects, SessionEvent::GenerationChanged(next));
    }
}

fn set_connection(state: &mut SessionState, effects: &mut Vec<Effect>, next: ConnectionState) {
    if state.connection != next {
        state.connection = next;
        notify(effects, SessionEvent::ConnectionChanged(next));
    }
}

/// End the in-flight generation with an error: keep whatever streamed so
/// far as final, append a synthetic error message, return to Idle.
fn fail_generation(
    state: &mut SessionState,
    effects: &mut Vec<Effect>,
    message: &str,
    now: DateTime<Utc>,
) {
    if let Ok(finalized) = state.transcript.finalize() {
        notify(effects, SessionEvent::MessageFinalized(finalized.clone()));
    }
    let appended = state.transcript.append_error(message, now).clone();
    notify(effects, SessionEvent::MessageAppended(appended));
    state.pending_clear = false;
    set_generation(state, effects, GenerationState::Idle);
    notify(
        effects,
        SessionEvent::Failed(SessionError::Generation(message.to_string())),
    );
}

// ---------------------------------------------------------------------------
// transition(): the pure core
// ---------------------------------------------------------------------------

pub fn transition(
    mut state: SessionState,
    input: Input,
    now: DateTime<Utc>,
) -> (SessionState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();

    match input {
        // -- User actions ----------------------------------------------------
        Input::Submit { text } => {
            let text = text.trim();
            if state.connection == ConnectionState::Disconnected {
                effects.push(Effect::Reject(SessionError::Transport(
                    "not connected".to_string(),
                )));
            } else if state.generation.in_flight() {
                effects.push(Effect::Reject(SessionError::Busy));
            } else if state.pending_clear {
                effects.push(Effect::Reject(SessionError::ClearPending));
            } else if text.is_empty() {
                effects.push(Effect::Reject(SessionError::EmptyMessage));
            } else {
                let appended = state.transcript.append_user(text, now).clone();
                effects.push(Effect::Transmit(ClientMessage::Message {
                    text: text.to_string(),
                }));
                notify(&mut effects, SessionEvent::MessageAppended(appended));
                set_generation(&mut state, &mut effects, GenerationState::AwaitingStart);
            }
        }

        Input::StopRequested => {
            // Only meaningful while streaming; a repeated stop is a no-op.
            if state.generation == GenerationState::Streaming {
                effects.push(Effect::Transmit(ClientMessage::StopGeneration));
                set_generation(&mut state, &mut effects, GenerationState::Completing);
            }
        }

        Input::ClearRequested => history::request_clear(&mut state, &mut effects),

        Input::HistoryRequested => history::request_history(&state, &mut effects),

        Input::PingRequested { timestamp } => {
            if state.connection == ConnectionState::Connected {
                effects.push(Effect::Transmit(ClientMessage::Ping { timestamp }));
            } else {
                effects.push(Effect::Reject(SessionError::Transport(
                    "not connected".to_string(),
                )));
            }
        }

        // -- Transport -------------------------------------------------------
        Input::TransportConnected => {
            set_connection(&mut state, &mut effects, ConnectionState::Connected);
        }

        Input::TransportLost { reason } => {
            if state.generation.has_stream() {
                if let Ok(finalized) = state.transcript.finalize_partial() {
                    notify(&mut effects, SessionEvent::MessageFinalized(finalized.clone()));
                }
            }
            set_generation(&mut state, &mut effects, GenerationState::Idle);
            state.pending_clear = false;
            state.server_session_id = None;
            set_connection(&mut state, &mut effects, ConnectionState::Disconnected);
            notify(
                &mut effects,
                SessionEvent::Failed(SessionError::Transport(reason)),
            );
        }

        Input::Stalled => {
            if state.generation.in_flight() {
                fail_generation(&mut state, &mut effects, STALLED_MESSAGE, now);
            }
        }

        // -- Server events ---------------------------------------------------
        Input::ServerHello {
            session_id,
            message,
        } => {
            state.server_session_id = Some(session_id.clone());
            notify(
                &mut effects,
                SessionEvent::ServerHello {
                    session_id,
                    message,
                },
            );
        }

        Input::GenerationStarted => {
            if state.generation != GenerationState::AwaitingStart {
                effects.push(Effect::Reject(SessionError::UnexpectedEvent(
                    "generation_started",
                )));
            } else {
                match state.transcript.begin_assistant(now) {
                    Ok(started) => {
                        let started = started.clone();
                        notify(&mut effects, SessionEvent::MessageAppended(started));
                        set_generation(&mut state, &mut effects, GenerationState::Streaming);
                    }
                    Err(e) => effects.push(Effect::Reject(e)),
                }
            }
        }

        Input::ResponseChunk { full_text } => {
            if !state.generation.has_stream() {
                effects.push(Effect::Reject(SessionError::NoActiveStream));
            } else {
                match state.transcript.update_streaming(&full_text) {
                    Ok(true) => {
                        if let Some(updated) = state.transcript.streaming() {
                            notify(&mut effects, SessionEvent::MessageUpdated(updated.clone()));
                        }
                    }
                    Ok(false) => {}
                    Err(e) => effects.push(Effect::Reject(e)),
                }
            }
        }

        Input::GenerationCompleted { final_text } => {
            if state.generation.has_stream() {
                if let Some(final_text) = final_text {
                    match state.transcript.update_streaming(&final_text) {
                        Ok(true) => {
                            if let Some(updated) = state.transcript.streaming() {
                                notify(&mut effects, SessionEvent::MessageUpdated(updated.clone()));
                            }
                        }
                        Ok(false) => {}
                        Err(e) => effects.push(Effect::Reject(e)),
                    }
                }
                match state.transcript.finalize() {
                    Ok(finalized) => {
                        let finalized = finalized.clone();
                        notify(&mut effects, SessionEvent::MessageFinalized(finalized));
                    }
                    Err(e) => effects.push(Effect::Reject(e)),
                }
            } else {
                effects.push(Effect::Reject(SessionError::NoActiveStream));
            }
            set_generation(&mut state, &mut effects, GenerationState::Idle);
        }

        Input::GenerationStopped => {
            if state.generation.has_stream() {
                match state.transcript.finalize_partial() {
                    Ok(finalized) => {
                        let finalized = finalized.clone();
                        notify(&mut effects, SessionEvent::MessageFinalized(finalized));
                    }
                    Err(e) => effects.push(Effect::Reject(e)),
                }
            } else {
                effects.push(Effect::Reject(SessionError::NoActiveStream));
            }
            set_generation(&mut state, &mut effects, GenerationState::Idle);
        }

        Input::ServerError { message, .. } => {
            fail_generation(&mut state, &mut effects, &message, now);
        }

        Input::HistoryCleared => history::apply_cleared(&mut state, &mut effects),

        Input::History { messages } => {
            history::apply_history(&state, &mut effects, messages);
        }

        Input::Visualization(data) => {
            notify(&mut effects, SessionEvent::Visualization(data));
        }

        Input::Pong { timestamp } => {
            notify(&mut effects, SessionEvent::Pong { timestamp });
        }
    }

    if state.generation == GenerationState::Idle {
        debug_assert!(state.transcript.streaming().is_none());
    }

    (state, effects)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
