//! History sync
//!
//! The server owns conversation history; the client transcript mirrors it.
//! A clear is a round trip: the local transcript is only emptied when the
//! server acknowledges with `history_cleared`.

use chatdock_protocol::{ClientMessage, HistoryEntry, Role};

use crate::error::SessionError;
use crate::generation::{notify, ConnectionState, Effect, GenerationState, SessionEvent, SessionState};
use crate::transcript::{Transcript, STOPPED_PLACEHOLDER};

pub(crate) fn request_clear(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if state.connection == ConnectionState::Disconnected {
        effects.push(Effect::Reject(SessionError::Transport(
            "not connected".to_string(),
        )));
        return;
    }
    // One clear at a time, and never while a generation is in flight.
    if state.pending_clear || state.generation.in_flight() {
        return;
    }
    state.pending_clear = true;
    effects.push(Effect::Transmit(ClientMessage::ClearHistory));
}

/// Applied on `history_cleared`, requested or not: the server is the
/// authority on what history exists.
pub(crate) fn apply_cleared(state: &mut SessionState, effects: &mut Vec<Effect>) {
    state.transcript.clear();
    state.pending_clear = false;
    if state.generation != GenerationState::Idle {
        state.generation = GenerationState::Idle;
        notify(effects, SessionEvent::GenerationChanged(GenerationState::Idle));
    }
    notify(effects, SessionEvent::TranscriptCleared);
}

pub(crate) fn request_history(state: &SessionState, effects: &mut Vec<Effect>) {
    if state.connection == ConnectionState::Connected {
        effects.push(Effect::Transmit(ClientMessage::GetHistory));
    } else {
        effects.push(Effect::Reject(SessionError::Transport(
            "not connected".to_string(),
        )));
    }
}

/// Applied on `history`: report the server's entries and whether they
/// still match the local transcript.
pub(crate) fn apply_history(
    state: &SessionState,
    effects: &mut Vec<Effect>,
    entries: Vec<HistoryEntry>,
) {
    let diverged = diverged(&state.transcript, &entries);
    notify(effects, SessionEvent::HistoryReceived { entries, diverged });
}

/// The history the server should hold for this transcript: settled user and
/// assistant turns, without synthetic error messages or stop placeholders.
fn expected_history(transcript: &Transcript) -> Vec<HistoryEntry> {
    transcript
        .messages()
        .iter()
        .filter(|m| !m.streaming && !m.is_error && m.raw_content != STOPPED_PLACEHOLDER)
        .map(|m| HistoryEntry {
            role: m.role,
            content: m.raw_content.clone(),
        })
        .collect()
}

/// True when the server's history and the local transcript disagree.
///
/// A user turn without a reply is allowed on the server side: a failed
/// generation records nothing, so compare only through the last assistant
/// turn the server reports.
fn diverged(transcript: &Transcript, server: &[HistoryEntry]) -> bool {
    let local = expected_history(transcript);
    answered(&local) != answered(server)
}

fn answered(entries: &[HistoryEntry]) -> Vec<&HistoryEntry> {
    entries
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            entry.role == Role::Assistant
                || entries
                    .get(i + 1)
                    .is_some_and(|next| next.role == Role::Assistant)
        })
        .map(|(_, entry)| entry)
        .collect()
}
