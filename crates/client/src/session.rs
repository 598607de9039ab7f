//! Chat session
//!
//! Owns the `SessionState` and the channel. Every user action and inbound
//! event goes through [`transition`]; this type only executes the effects
//! and fans session events out to subscribers.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, SessionChannel};
use crate::error::{SessionError, TransportError};
use crate::generation::{
    transition, ConnectionState, Effect, GenerationState, Input, SessionEvent, SessionState,
};
use crate::transcript::Transcript;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Fail an in-flight generation when the server goes quiet this long.
    /// `None` waits indefinitely.
    pub stall_timeout: Option<Duration>,
}

pub struct ChatSession {
    state: SessionState,
    channel: SessionChannel,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    /// Set while a generation is in flight; only server events move it.
    stall_deadline: Option<Instant>,
}

impl ChatSession {
    /// Wrap an established channel.
    pub async fn new(channel: SessionChannel, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut session = Self {
            state: SessionState::default(),
            channel,
            config,
            events,
            stall_deadline: None,
        };
        let _ = session.apply(Input::TransportConnected).await;
        session
    }

    pub async fn connect(url: &str, config: SessionConfig) -> Result<Self, TransportError> {
        let channel = SessionChannel::connect(url).await?;
        Ok(Self::new(channel, config).await)
    }

    /// Swap in a fresh channel after a disconnect. The transcript is kept;
    /// the server starts a new conversation.
    pub async fn reconnect(&mut self, channel: SessionChannel) {
        if self.is_connected() {
            let _ = self
                .apply(Input::TransportLost {
                    reason: "reconnecting".to_string(),
                })
                .await;
        }
        self.channel = channel;
        let _ = self.apply(Input::TransportConnected).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.state.transcript
    }

    pub fn generation_state(&self) -> GenerationState {
        self.state.generation
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection == ConnectionState::Connected
    }

    // -- User actions --------------------------------------------------------

    pub async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.apply(Input::Submit {
            text: text.to_string(),
        })
        .await
    }

    pub async fn request_stop(&mut self) -> Result<(), SessionError> {
        self.apply(Input::StopRequested).await
    }

    pub async fn request_clear(&mut self) -> Result<(), SessionError> {
        self.apply(Input::ClearRequested).await
    }

    pub async fn request_history(&mut self) -> Result<(), SessionError> {
        self.apply(Input::HistoryRequested).await
    }

    pub async fn ping(&mut self) -> Result<(), SessionError> {
        self.apply(Input::PingRequested {
            timestamp: Some(Utc::now().timestamp_millis()),
        })
        .await
    }

    // -- Inbound -------------------------------------------------------------

    /// Wait for the next inbound event, or the stall deadline, and apply it.
    /// Returns `false` when there is no connection to wait on. Cancel safe.
    pub async fn next_event(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let event = match self.stall_deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, self.channel.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    warn!(
                        component = "session",
                        event = "session.generation_stalled",
                        timeout_ms = self
                            .config
                            .stall_timeout
                            .map_or(0, |limit| limit.as_millis() as u64),
                        "No server event before the stall timeout"
                    );
                    let _ = self.apply(Input::Stalled).await;
                    return true;
                }
            },
            None => self.channel.recv().await,
        };
        self.stall_deadline = None;

        let input = match event {
            Some(ChannelEvent::Message(msg)) => Input::from(msg),
            Some(ChannelEvent::Disconnected { reason }) => Input::TransportLost { reason },
            None => Input::TransportLost {
                reason: "channel closed".to_string(),
            },
        };
        let _ = self.apply(input).await;
        true
    }

    // -- Effect execution ----------------------------------------------------

    /// Run `input` (and anything it triggers) through the state machine.
    /// Returns the first rejection, if any.
    async fn apply(&mut self, input: Input) -> Result<(), SessionError> {
        let mut queue = VecDeque::from([input]);
        let mut rejection = None;

        while let Some(input) = queue.pop_front() {
            let state = std::mem::take(&mut self.state);
            let (next, effects) = transition(state, input, Utc::now());
            self.state = next;

            for effect in effects {
                match effect {
                    Effect::Transmit(msg) => {
                        let kind = msg.kind();
                        if let Err(e) = self.channel.send(msg).await {
                            warn!(
                                component = "session",
                                event = "session.transmit_failed",
                                message_type = kind,
                                error = %e,
                                "Failed to transmit message"
                            );
                            queue.push_back(Input::TransportLost {
                                reason: e.to_string(),
                            });
                        }
                    }
                    Effect::Notify(event) => {
                        log_event(&event);
                        // No subscribers is fine.
                        let _ = self.events.send(*event);
                    }
                    Effect::Reject(err) => {
                        log_rejection(&err);
                        if rejection.is_none() {
                            rejection = Some(err);
                        }
                    }
                }
            }
        }

        self.refresh_stall_deadline();

        match rejection {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn refresh_stall_deadline(&mut self) {
        match self.config.stall_timeout {
            Some(limit) if self.state.generation.in_flight() => {
                self.stall_deadline.get_or_insert_with(|| Instant::now() + limit);
            }
            _ => self.stall_deadline = None,
        }
    }
}

fn log_rejection(err: &SessionError) {
    if err.is_desync() {
        warn!(
            component = "session",
            event = "session.desync",
            error = %err,
            "Server event does not match local generation state"
        );
    } else {
        debug!(
            component = "session",
            event = "session.rejected",
            error = %err,
            "Action rejected"
        );
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionChanged(state) => info!(
            component = "session",
            event = "session.connection_changed",
            state = ?state,
            "Connection state changed"
        ),
        SessionEvent::GenerationChanged(state) => debug!(
            component = "session",
            event = "session.generation_changed",
            state = ?state,
            "Generation state changed"
        ),
        SessionEvent::ServerHello { session_id, .. } => info!(
            component = "session",
            event = "session.server_hello",
            session_id = %session_id,
            "Server assigned session"
        ),
        SessionEvent::Failed(err) => warn!(
            component = "session",
            event = "session.failed",
            error = %err,
            "Session failure"
        ),
        _ => {}
    }
}
