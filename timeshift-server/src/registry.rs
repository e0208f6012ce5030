//! Live sessions, keyed by match id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::session::MatchSession;

pub type SharedSession = Arc<Mutex<MatchSession>>;

/// Lock a session, recovering from a poisoned lock.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, MatchSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: MatchSession) -> SharedSession {
        let id = session.id().to_string();
        let shared = Arc::new(Mutex::new(session));
        self.map().insert(id, Arc::clone(&shared));
        shared
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.map().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<SharedSession> {
        self.map().remove(id)
    }

    /// Every live session, cloned out so no registry lock is held while the
    /// caller locks individual sessions.
    pub fn all(&self) -> Vec<SharedSession> {
        self.map().values().cloned().collect()
    }

    /// Live sessions `player_id` takes part in.
    pub fn sessions_for(&self, player_id: &str) -> Vec<SharedSession> {
        self.all()
            .into_iter()
            .filter(|s| lock_session(s).is_participant(player_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
