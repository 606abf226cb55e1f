//! Session persistence between requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tokio::sync::RwLock;

use crate::error::AuthnResult;
use crate::session::{Session, SessionChanges, SessionData};

/// Backend keeping session attributes between requests.
///
/// Several requests of one client may run at once. Stores therefore merge
/// per-attribute writes instead of replacing whole sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the attributes of a session, if it exists.
    async fn load(&self, id: &str) -> AuthnResult<Option<SessionData>>;

    /// Apply attribute writes, creating the session if needed. Attributes
    /// not named in `changes` keep their stored value.
    async fn apply(&self, id: &str, changes: &SessionChanges) -> AuthnResult<()>;

    /// Atomically store `value` unless `key` is already stored.
    async fn set_attribute_if_absent(&self, id: &str, key: &str, value: &[u8])
        -> AuthnResult<bool>;

    /// Atomically remove `key`, returning the value to exactly one caller.
    async fn take_attribute(&self, id: &str, key: &str) -> AuthnResult<Option<Vec<u8>>>;

    /// Forget a session.
    async fn delete(&self, id: &str) -> AuthnResult<()>;

    /// Handle that sessions opened from this store write through to.
    fn shared(&self) -> Arc<dyn SessionStore>;

    /// Resume the session named by `id`, or start a new one.
    async fn open(&self, id: Option<&str>) -> AuthnResult<Session> {
        if let Some(id) = id {
            if let Some(data) = self.load(id).await? {
                return Ok(Session::resume(id, data).backed_by(self.shared()));
            }
        }
        Ok(Session::new().backed_by(self.shared()))
    }

    /// Persist the writes the session made since it was opened.
    async fn commit(&self, session: &Session) -> AuthnResult<()> {
        let changes = session.take_changes();
        if !changes.is_empty() {
            self.apply(session.id(), &changes).await?;
        }
        Ok(())
    }
}

/// In-memory session store (for development and tests).
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> AuthnResult<Option<SessionData>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn apply(&self, id: &str, changes: &SessionChanges) -> AuthnResult<()> {
        let mut sessions = self.sessions.write().await;
        let data = sessions.entry(id.to_string()).or_default();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    data.insert(key.clone(), value.clone());
                }
                None => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn set_attribute_if_absent(
        &self,
        id: &str,
        key: &str,
        value: &[u8],
    ) -> AuthnResult<bool> {
        let mut sessions = self.sessions.write().await;
        let data = sessions.entry(id.to_string()).or_default();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn take_attribute(&self, id: &str, key: &str) -> AuthnResult<Option<Vec<u8>>> {
        Ok(self
            .sessions
            .write()
            .await
            .get_mut(id)
            .and_then(|data| data.remove(key)))
    }

    async fn delete(&self, id: &str) -> AuthnResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    fn shared(&self) -> Arc<dyn SessionStore> {
        Arc::new(self.clone())
    }
}

/// Database row for the session_attributes table.
#[derive(Debug, Clone, FromRow)]
struct AttributeRow {
    name: String,
    value: Vec<u8>,
}

const TOUCH_SESSION: &str = r#"
    INSERT INTO sessions (id, created_at, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
"#;

/// SQLite backed session store. One row per attribute, so concurrent
/// requests only contend on the attributes they write.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init_schema(&self) -> AuthnResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_attributes (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (session_id, name)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, id: &str) -> AuthnResult<Option<SessionData>> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows: Vec<AttributeRow> =
            sqlx::query_as("SELECT name, value FROM session_attributes WHERE session_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(
            rows.into_iter().map(|row| (row.name, row.value)).collect(),
        ))
    }

    async fn apply(&self, id: &str, changes: &SessionChanges) -> AuthnResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(TOUCH_SESSION)
            .bind(id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        for (name, value) in changes {
            match value {
                Some(value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO session_attributes (session_id, name, value)
                        VALUES (?, ?, ?)
                        ON CONFLICT(session_id, name) DO UPDATE SET value = excluded.value
                        "#,
                    )
                    .bind(id)
                    .bind(name)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM session_attributes WHERE session_id = ? AND name = ?")
                        .bind(id)
                        .bind(name)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_attribute_if_absent(
        &self,
        id: &str,
        key: &str,
        value: &[u8],
    ) -> AuthnResult<bool> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(TOUCH_SESSION)
            .bind(id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO session_attributes (session_id, name, value)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id, name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn take_attribute(&self, id: &str, key: &str) -> AuthnResult<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "DELETE FROM session_attributes WHERE session_id = ? AND name = ? RETURNING value",
        )
        .bind(id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn delete(&self, id: &str) -> AuthnResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session_attributes WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    fn shared(&self) -> Arc<dyn SessionStore> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sqlite_store() -> SqliteSessionStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteSessionStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn changes(entries: &[(&str, Option<&[u8]>)]) -> SessionChanges {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.map(<[u8]>::to_vec)))
            .collect()
    }

    /// Two requests of one client claim and take the same attribute.
    async fn assert_claim_is_first_wins(store: &dyn SessionStore) {
        let first = store.open(None).await.unwrap();
        first.set_attribute("user", b"alice".to_vec());
        store.commit(&first).await.unwrap();

        let a = store.open(Some(first.id())).await.unwrap();
        let b = store.open(Some(first.id())).await.unwrap();
        assert!(a.claim_attribute("momento", b"/reports/q3".to_vec()).await.unwrap());
        assert!(!b.claim_attribute("momento", b"/favicon.ico".to_vec()).await.unwrap());
        assert_eq!(b.get_attribute("momento"), Some(b"/reports/q3".to_vec()));

        // Committing either request must not disturb the claimed value
        b.set_attribute("theme", b"dark".to_vec());
        store.commit(&a).await.unwrap();
        store.commit(&b).await.unwrap();

        let stored = store.load(first.id()).await.unwrap().unwrap();
        assert_eq!(stored.get("momento"), Some(&b"/reports/q3".to_vec()));
        assert_eq!(stored.get("user"), Some(&b"alice".to_vec()));
        assert_eq!(stored.get("theme"), Some(&b"dark".to_vec()));

        let c = store.open(Some(first.id())).await.unwrap();
        let d = store.open(Some(first.id())).await.unwrap();
        assert_eq!(
            c.take_attribute("momento").await.unwrap(),
            Some(b"/reports/q3".to_vec())
        );
        assert_eq!(d.take_attribute("momento").await.unwrap(), None);
        assert!(!store.load(first.id()).await.unwrap().unwrap().contains_key("momento"));
    }

    #[tokio::test]
    async fn test_memory_store_commit_and_resume() {
        let store = MemorySessionStore::new();

        let session = store.open(None).await.unwrap();
        assert!(session.is_new());
        session.set_attribute("user", b"alice".to_vec());
        store.commit(&session).await.unwrap();
        assert!(!session.is_dirty());

        let resumed = store.open(Some(session.id())).await.unwrap();
        assert!(!resumed.is_new());
        assert_eq!(resumed.get_attribute("user"), Some(b"alice".to_vec()));
    }

    #[tokio::test]
    async fn test_unknown_session_starts_fresh() {
        let store = MemorySessionStore::new();
        let session = store.open(Some("does-not-exist")).await.unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), "does-not-exist");
    }

    #[tokio::test]
    async fn test_memory_store_claim_across_requests() {
        assert_claim_is_first_wins(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_claim_across_requests() {
        assert_claim_is_first_wins(&sqlite_store().await).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_applies_binary_changes() {
        let store = sqlite_store().await;

        let blob: &[u8] = &[0, 159, 146, 150, 255];
        store
            .apply("s1", &changes(&[("blob", Some(blob)), ("other", Some(b"x"))]))
            .await
            .unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.get("blob"), Some(&blob.to_vec()));

        // Removals only touch the named attribute
        store.apply("s1", &changes(&[("blob", None)])).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert!(!loaded.contains_key("blob"));
        assert_eq!(loaded.get("other"), Some(&b"x".to_vec()));

        store.delete("s1").await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
