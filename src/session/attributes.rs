//! Per-request session handle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::AuthnResult;
use crate::session::SessionStore;

/// Serialized session attributes, keyed by attribute name.
pub type SessionData = BTreeMap<String, Vec<u8>>;

/// Attribute writes made by one request: `Some` sets a value, `None` removes it.
pub type SessionChanges = BTreeMap<String, Option<Vec<u8>>>;

#[derive(Default)]
struct Attributes {
    values: SessionData,
    changes: SessionChanges,
}

/// Session attributes for the current request.
///
/// Cloning shares the same attributes. Plain writes are kept as pending
/// changes until the store commits them. `claim_attribute` and
/// `take_attribute` go straight to the backing store, so they hold across
/// concurrent requests on the same session.
#[derive(Clone)]
pub struct Session {
    id: String,
    is_new: bool,
    attributes: Arc<Mutex<Attributes>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl Session {
    /// Start a brand new session.
    pub fn new() -> Self {
        Self::with_values(Uuid::new_v4().to_string(), true, SessionData::new())
    }

    /// Resume a session loaded from a store.
    pub fn resume(id: impl Into<String>, attributes: SessionData) -> Self {
        Self::with_values(id.into(), false, attributes)
    }

    fn with_values(id: String, is_new: bool, values: SessionData) -> Self {
        Self {
            id,
            is_new,
            attributes: Arc::new(Mutex::new(Attributes {
                values,
                changes: SessionChanges::new(),
            })),
            store: None,
        }
    }

    /// Write claims and takes through to `store`.
    pub fn backed_by(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session was created by this request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether there are writes the store has not seen yet.
    pub fn is_dirty(&self) -> bool {
        !self.attributes.lock().changes.is_empty()
    }

    pub fn get_attribute(&self, key: &str) -> Option<Vec<u8>> {
        self.attributes.lock().values.get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        let mut attributes = self.attributes.lock();
        attributes.values.insert(key.clone(), value.clone());
        attributes.changes.insert(key, Some(value));
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Vec<u8>> {
        let mut attributes = self.attributes.lock();
        let removed = attributes.values.remove(key);
        if removed.is_some() {
            attributes.changes.insert(key.to_string(), None);
        }
        removed
    }

    /// Store `value` only if no request has stored `key` yet.
    ///
    /// Returns `true` when the value was stored. When another request won,
    /// its value replaces the local view.
    pub async fn claim_attribute(&self, key: &str, value: Vec<u8>) -> AuthnResult<bool> {
        if self.attributes.lock().values.contains_key(key) {
            return Ok(false);
        }

        let Some(store) = &self.store else {
            let mut attributes = self.attributes.lock();
            if attributes.values.contains_key(key) {
                return Ok(false);
            }
            attributes.values.insert(key.to_string(), value.clone());
            attributes.changes.insert(key.to_string(), Some(value));
            return Ok(true);
        };

        let claimed = store.set_attribute_if_absent(&self.id, key, &value).await?;
        let current = if claimed {
            Some(value)
        } else {
            store
                .load(&self.id)
                .await?
                .and_then(|mut data| data.remove(key))
        };

        let mut attributes = self.attributes.lock();
        attributes.changes.remove(key);
        if let Some(current) = current {
            attributes.values.insert(key.to_string(), current);
        }
        Ok(claimed)
    }

    /// Remove `key` and return its value. Across concurrent requests on the
    /// same session, at most one receives the value.
    pub async fn take_attribute(&self, key: &str) -> AuthnResult<Option<Vec<u8>>> {
        let Some(store) = &self.store else {
            return Ok(self.remove_attribute(key));
        };

        let taken = store.take_attribute(&self.id, key).await?;

        let mut attributes = self.attributes.lock();
        attributes.values.remove(key);
        let pending = attributes.changes.remove(key).flatten();
        Ok(taken.or(pending))
    }

    /// Copy of all attributes as this request sees them.
    pub fn snapshot(&self) -> SessionData {
        self.attributes.lock().values.clone()
    }

    /// Hand the pending writes to the store.
    pub fn take_changes(&self) -> SessionChanges {
        std::mem::take(&mut self.attributes.lock().changes)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .field("backed", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_keeps_first_value() {
        let session = Session::new();

        assert!(session.claim_attribute("momento", b"first".to_vec()).await.unwrap());
        assert!(!session.claim_attribute("momento", b"second".to_vec()).await.unwrap());

        assert_eq!(session.get_attribute("momento"), Some(b"first".to_vec()));
    }

    #[test]
    fn test_resumed_session_tracks_changes() {
        let mut data = SessionData::new();
        data.insert("user".to_string(), b"alice".to_vec());
        let session = Session::resume("abc", data);

        assert!(!session.is_new());
        assert!(!session.is_dirty());

        // Removing a missing attribute is not a change
        assert!(session.remove_attribute("missing").is_none());
        assert!(!session.is_dirty());

        assert_eq!(session.remove_attribute("user"), Some(b"alice".to_vec()));
        assert!(session.is_dirty());
        assert!(session.snapshot().is_empty());

        let changes = session.take_changes();
        assert_eq!(changes.get("user"), Some(&None));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_clones_share_attributes() {
        let session = Session::new();
        let other = session.clone();

        other.set_attribute("k", b"v".to_vec());
        assert_eq!(session.get_attribute("k"), Some(b"v".to_vec()));
        assert_eq!(session.id(), other.id());
    }

    #[tokio::test]
    async fn test_take_without_store_removes_locally() {
        let session = Session::new();
        session.set_attribute("k", b"v".to_vec());

        assert_eq!(session.take_attribute("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(session.take_attribute("k").await.unwrap(), None);
    }
}
