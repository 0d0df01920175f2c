//! Server-side sessions.
//!
//! A [`Session`] is a cheaply-cloneable handle to one visitor's key/value
//! data. The dispatch engine loads it from the app's [`SessionStore`] before
//! the handler chain runs (keyed by the `session_id` cookie) and writes it
//! back afterwards, but only when the handler actually modified it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use uuid::Uuid;

/// Cookie under which the session id travels.
pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Default)]
struct SessionInner {
    id: String,
    data: HashMap<String, Value>,
    dirty: bool,
}

/// One visitor's session data.
///
/// Clones share the same underlying map, so a middleware and the handler it
/// wraps observe each other's writes within a single dispatch.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    fn new(id: String, data: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id,
                data,
                dirty: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session id, as carried by the `session_id` cookie.
    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// Returns a stored value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    /// Returns a stored string value.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Stores a value and marks the session for persistence.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut inner = self.lock();
        inner.data.insert(key.into(), value.into());
        inner.dirty = true;
    }

    /// Removes a value, returning it when it was present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.dirty = true;
        }
        removed
    }

    /// Drops every stored value.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if !inner.data.is_empty() {
            inner.data.clear();
            inner.dirty = true;
        }
    }

    /// `true` once a handler has written to this session during the current
    /// dispatch.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    fn snapshot(&self) -> (String, HashMap<String, Value>) {
        let inner = self.lock();
        (inner.id.clone(), inner.data.clone())
    }
}

/// Backing storage for sessions.
pub trait SessionStore: Send + Sync {
    /// Creates a fresh, empty session with a new id. Nothing is stored
    /// until `save`.
    fn create(&self) -> Session;

    /// Loads the session with the given id, if it exists.
    fn get(&self, id: &str) -> Option<Session>;

    /// Persists the session's current data under its id.
    fn save(&self, session: &Session);
}

/// In-process session store. Sessions vanish on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Value>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self) -> Session {
        Session::new(Uuid::new_v4().to_string(), HashMap::new())
    }

    fn get(&self, id: &str) -> Option<Session> {
        let data = self.lock().get(id).cloned()?;
        Some(Session::new(id.to_owned(), data))
    }

    fn save(&self, session: &Session) {
        let (id, data) = session.snapshot();
        self.lock().insert(id, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_clean() {
        let store = MemorySessionStore::new();
        let session = store.create();
        assert!(!session.is_dirty());
        assert!(session.get("user").is_none());
    }

    #[test]
    fn set_marks_dirty() {
        let store = MemorySessionStore::new();
        let session = store.create();
        session.set("user", "max");
        assert!(session.is_dirty());
        assert_eq!(session.get_str("user").as_deref(), Some("max"));
    }

    #[test]
    fn save_then_reload() {
        let store = MemorySessionStore::new();
        let session = store.create();
        session.set("count", 3);
        store.save(&session);

        let reloaded = store.get(&session.id()).unwrap();
        assert_eq!(reloaded.get("count"), Some(3.into()));
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn create_does_not_persist() {
        let store = MemorySessionStore::new();
        let session = store.create();
        assert!(store.get(&session.id()).is_none());
    }

    #[test]
    fn unknown_id_yields_none() {
        let store = MemorySessionStore::new();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn clones_share_data() {
        let store = MemorySessionStore::new();
        let session = store.create();
        let alias = session.clone();
        alias.set("k", "v");
        assert_eq!(session.get_str("k").as_deref(), Some("v"));
        assert!(session.is_dirty());
    }

    #[test]
    fn remove_only_dirties_on_hit() {
        let store = MemorySessionStore::new();
        let session = store.create();
        assert!(session.remove("missing").is_none());
        assert!(!session.is_dirty());
        session.set("k", 1);
        session.remove("k");
        assert!(session.get("k").is_none());
    }
}
