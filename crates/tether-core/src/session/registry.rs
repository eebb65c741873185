//! Concurrent session id → session map

use std::sync::Arc;

use dashmap::DashMap;

use super::Session;

/// Sessions known to one client, shared by the read loop and callers
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a session, replacing any previous entry with the same id.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions
            .insert(session.session_id().to_string(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    /// Remove the entry for `session`'s id only if it is still `session`,
    /// leaving a newer session registered under the same id in place.
    pub fn remove_if_same(&self, session: &Session) -> bool {
        self.sessions
            .remove_if(session.session_id(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), session)
            })
            .is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
