//! Sessions and the session-store collaborator.
//!
//! kiri reads and writes a session through the request [`Context`]; where
//! the data lives between requests is the [`SessionStore`]'s business. The
//! browser only ever holds the session id, in a cookie.
//!
//! [`Context`]: crate::Context

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::DEFAULT_SESSION_IDLE_SECS;
use crate::error::BoxError;

/// A session: an id plus a JSON object of values.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    data: Map<String, Value>,
    modified: bool,
    fresh: bool,
}

impl Session {
    /// A new, empty session. It is only saved once something is written.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: Map::new(), modified: false, fresh: true }
    }

    /// An existing session loaded from a store.
    pub fn from_data(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { id: id.into(), data, modified: false, fresh: false }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn data(&self) -> &Map<String, Value> { &self.data }
    pub fn is_new(&self) -> bool { self.fresh }
    pub fn is_modified(&self) -> bool { self.modified }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Reads `key` as `T`. `None` if absent or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| T::deserialize(v).ok())
    }

    /// Serializes `value` into `key`.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_owned(), value);
        self.modified = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let old = self.data.remove(key);
        if old.is_some() {
            self.modified = true;
        }
        old
    }

    pub fn clear(&mut self) {
        if !self.data.is_empty() {
            self.data.clear();
            self.modified = true;
        }
    }
}

/// Persists sessions between requests.
///
/// Calls are synchronous and made outside any kiri lock. An implementation
/// backed by slow storage should keep its own latency in check.
pub trait SessionStore: Send + Sync + 'static {
    /// A fresh session with a new, unguessable id.
    fn create(&self) -> Session {
        Session::new(Uuid::new_v4().simple().to_string())
    }

    /// The stored session with this id, if any.
    fn load(&self, id: &str) -> Option<Session>;

    fn save(&self, session: &Session) -> Result<(), BoxError>;

    /// Forgets the session. Deleting an unknown id is not an error.
    fn delete(&self, id: &str) -> Result<(), BoxError>;
}

/// Process-local session store.
///
/// Suitable for tests and single-process deployments; sessions vanish on
/// restart. A session untouched for longer than the idle timeout is
/// forgotten: `load` no longer finds it and the next `save` drops it.
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Entry>>,
    idle: Duration,
}

struct Entry {
    data: Map<String, Value>,
    touched: Instant,
}

impl MemoryStore {
    /// A store with the default idle timeout of two weeks.
    pub fn new() -> Self {
        Self::with_idle_timeout(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS))
    }

    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), idle }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let entry = sessions.get_mut(id)?;
        if entry.touched.elapsed() > self.idle {
            sessions.remove(id);
            return None;
        }
        entry.touched = Instant::now();
        Some(Session::from_data(id, entry.data.clone()))
    }

    fn save(&self, session: &Session) -> Result<(), BoxError> {
        let mut sessions = self.sessions.write();
        let idle = self.idle;
        sessions.retain(|_, entry| entry.touched.elapsed() <= idle);
        sessions.insert(
            session.id.clone(),
            Entry { data: session.data.clone(), touched: Instant::now() },
        );
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), BoxError> {
        self.sessions.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_mark_modified() {
        let mut s = Session::new("abc");
        assert!(s.is_new());
        assert!(!s.is_modified());

        assert!(s.remove("missing").is_none());
        assert!(!s.is_modified());

        s.set("username", "alice").unwrap();
        assert!(s.is_modified());
        assert_eq!(s.get_as::<String>("username").as_deref(), Some("alice"));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let mut s = store.create();
        s.set("n", 3).unwrap();
        store.save(&s).unwrap();

        let loaded = store.load(s.id()).unwrap();
        assert!(!loaded.is_new());
        assert!(!loaded.is_modified());
        assert_eq!(loaded.get_as::<i32>("n"), Some(3));
        assert!(store.load("nope").is_none());
    }

    #[test]
    fn created_ids_differ() {
        let store = MemoryStore::new();
        assert_ne!(store.create().id(), store.create().id());
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let store = MemoryStore::with_idle_timeout(Duration::from_millis(20));
        let mut stale = store.create();
        stale.set("n", 1).unwrap();
        store.save(&stale).unwrap();

        std::thread::sleep(Duration::from_millis(40));

        let mut fresh = store.create();
        fresh.set("n", 2).unwrap();
        store.save(&fresh).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.load(stale.id()).is_none());
        assert!(store.load(fresh.id()).is_some());
    }

    #[test]
    fn expired_session_is_not_loaded() {
        let store = MemoryStore::with_idle_timeout(Duration::from_millis(20));
        let mut s = store.create();
        s.set("n", 1).unwrap();
        store.save(&s).unwrap();

        std::thread::sleep(Duration::from_millis(40));
        assert!(store.load(s.id()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn delete_forgets() {
        let store = MemoryStore::new();
        let mut s = store.create();
        s.set("n", 1).unwrap();
        store.save(&s).unwrap();

        store.delete(s.id()).unwrap();
        store.delete("never-existed").unwrap();
        assert!(store.is_empty());
    }
}
