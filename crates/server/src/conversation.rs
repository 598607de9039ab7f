//! In-memory conversation history used as model context.

use chatdock_protocol::HistoryEntry;

#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<HistoryEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Context for a new generation: committed history plus the pending
    /// user turn, which is only recorded once the generation settles.
    pub fn context_with(&self, user_text: &str) -> Vec<HistoryEntry> {
        let mut context = self.history.clone();
        context.push(HistoryEntry::user(user_text));
        context
    }

    pub fn record_turn(&mut self, user_text: String, assistant_text: String) {
        self.history.push(HistoryEntry::user(user_text));
        self.history.push(HistoryEntry::assistant(assistant_text));
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
