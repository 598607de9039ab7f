//! Session registry shared by all connections.

use std::sync::Arc;

use chatdock_connector_core::Generator;
use dashmap::DashMap;

use crate::session_actor::SessionActorHandle;

pub struct SessionRegistry {
    /// Live sessions keyed by session id
    sessions: DashMap<String, SessionActorHandle>,

    /// Backend every new conversation generates with
    generator: Arc<dyn Generator>,
}

impl SessionRegistry {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            sessions: DashMap::new(),
            generator,
        }
    }

    pub fn generator(&self) -> Arc<dyn Generator> {
        self.generator.clone()
    }

    pub fn add_session(&self, handle: SessionActorHandle) {
        self.sessions.insert(handle.id.clone(), handle);
    }

    pub fn remove_session(&self, id: &str) -> Option<SessionActorHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn get_session(&self, id: &str) -> Option<SessionActorHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
