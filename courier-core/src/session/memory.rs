//! In-memory session storage
//!
//! Sessions are kept in a `RwLock<HashMap>` for the life of the process.

use super::store::{Session, SessionHandle, SessionStore};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory session store
///
/// ```
/// use courier_core::session::MemorySessionStore;
///
/// let store = MemorySessionStore::new();
/// ```
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<RwLock<Session>>>>>,
}

impl MemorySessionStore {
    /// Create a new in-memory session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of sessions currently stored
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: Option<&str>) -> SessionHandle {
        if let Some(id) = id {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(session) = sessions.get(id) {
                session.write().unwrap_or_else(PoisonError::into_inner).touch();
                return SessionHandle::new(Arc::clone(session), false);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(RwLock::new(Session::new(id.clone())));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::clone(&session));
        log::debug!("Created session {}", id);
        SessionHandle::new(session, true)
    }
}
