//! Session storage trait and types

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Session data - flexible key-value store
pub type SessionData = HashMap<String, serde_json::Value>;

/// User session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: String,

    /// Session data (flexible key-value store)
    pub data: SessionData,

    /// Session creation time
    pub created_at: DateTime<Utc>,

    /// Last access time
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self { id, data: HashMap::new(), created_at: now, last_accessed_at: now }
    }

    /// Update last accessed time
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Get a value from session data
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in session data
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Remove a value from session data
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Session storage trait
///
/// `load` never fails: an unknown or missing id yields a fresh session
/// flagged as new, which the dispatcher announces with a cookie.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: Option<&str>) -> SessionHandle;
}

impl<S: SessionStore> SessionStore for Arc<S> {
    fn load(&self, id: Option<&str>) -> SessionHandle {
        (**self).load(id)
    }
}

/// A request's view of one session; clones share the same data
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<RwLock<Session>>,
    id: String,
    is_new: bool,
}

impl SessionHandle {
    pub fn new(session: Arc<RwLock<Session>>, is_new: bool) -> Self {
        let id = session.read().unwrap_or_else(PoisonError::into_inner).id.clone();
        Self { session, id, is_new }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the store created this session for the current request
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Raw stored value
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).data.get(key).cloned()
    }

    /// Stored value deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).get(key)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.session.write().unwrap_or_else(PoisonError::into_inner).set(key, value)
    }

    pub fn put_value(&self, key: &str, value: serde_json::Value) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.session.write().unwrap_or_else(PoisonError::into_inner).remove(key)
    }

    pub fn len(&self) -> usize {
        self.session.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).created_at
    }
}
