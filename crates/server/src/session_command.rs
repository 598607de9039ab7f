//! Commands sent to a conversation actor from its websocket connection.

use chatdock_protocol::HistoryEntry;
use tokio::sync::oneshot;

pub enum SessionCommand {
    /// Start a generation for a user turn.
    UserMessage { text: String },

    /// Cancel the running generation, keeping any partial output.
    StopGeneration,

    /// Reset history. Stops a running generation first.
    ClearHistory,

    // -- Queries (use oneshot reply channels) --
    GetHistory {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },

    /// Cancel everything and end the actor loop.
    Shutdown,
}

impl SessionCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionCommand::UserMessage { .. } => "user_message",
            SessionCommand::StopGeneration => "stop_generation",
            SessionCommand::ClearHistory => "clear_history",
            SessionCommand::GetHistory { .. } => "get_history",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}
