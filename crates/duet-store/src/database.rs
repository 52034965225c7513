//! Embedded SQLite document store.
//!
//! [`Database`] owns a [`rusqlite::Connection`] and implements
//! [`DocumentStore`] on top of a single `documents` table. Live queries are
//! served by an in-process watcher list: every committed write re-evaluates
//! the watchers of the touched collection and pushes a snapshot to those
//! whose result changed.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{DocumentStore, SnapshotSender, Subscription};
use crate::document::{DocRef, Document, Patch};
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::query::{Query, Snapshot};

/// SQLite-backed implementation of the document-store contract.
pub struct Database {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

struct Inner {
    conn: Connection,
    watchers: Vec<Watcher>,
    last_timestamp: i64,
}

struct Watcher {
    query: Query,
    tx: SnapshotSender,
    last: Vec<Document>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/duet/duet.db`
    /// - macOS:   `~/Library/Application Support/dev.duet.duet/duet.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\duet\duet\data\duet.db`
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("dev", "duet", "duet").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("duet.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private, non-persistent database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&mut conn)?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                watchers: Vec::new(),
                last_timestamp: 0,
            }),
            path,
        })
    }

    /// Filesystem path of the open database, if it has one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of live subscriptions still attached.
    pub fn watcher_count(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.watchers.retain(|w| !w.tx.is_closed());
        Ok(inner.watchers.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Inner {
    fn read(&self, doc: &DocRef) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![doc.collection, doc.id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(&self, doc: &DocRef, data: &Value, timestamp: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO documents (collection, id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE
             SET data = excluded.data, updated_at = excluded.updated_at",
            params![doc.collection, doc.id, serde_json::to_string(data)?, timestamp],
        )?;
        Ok(())
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")?;

        let rows = stmt.query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, data) = row?;
            docs.push(Document::new(id, serde_json::from_str(&data)?));
        }
        Ok(docs)
    }

    // Server clock. Strictly increasing so store-assigned timestamps never tie.
    fn server_now(&mut self) -> i64 {
        let mut now = Utc::now().timestamp_micros();
        if now <= self.last_timestamp {
            now = self.last_timestamp + 1;
        }
        self.last_timestamp = now;
        now
    }

    fn create_doc(&mut self, doc: &DocRef, patch: &Patch) -> Result<()> {
        if self.read(doc)?.is_some() {
            return Err(StoreError::AlreadyExists(doc.path()));
        }
        let now = self.server_now();
        let mut data = Value::Object(Default::default());
        patch.apply(&mut data, now);
        self.write(doc, &data, now)?;
        self.notify(&doc.collection);
        Ok(())
    }

    fn notify(&mut self, collection: &str) {
        self.watchers.retain(|w| !w.tx.is_closed());
        if !self.watchers.iter().any(|w| w.query.collection == collection) {
            return;
        }

        let docs = match self.scan(collection) {
            Ok(docs) => docs,
            Err(e) => {
                warn!(collection, error = %e, "failed to refresh live queries");
                for w in self.watchers.iter().filter(|w| w.query.collection == collection) {
                    let _ = w.tx.send(Err(StoreError::Unavailable(e.to_string())));
                }
                return;
            }
        };

        for w in self.watchers.iter_mut().filter(|w| w.query.collection == collection) {
            let rows = w.query.evaluate(docs.clone());
            if rows != w.last {
                w.last = rows.clone();
                let _ = w.tx.send(Ok(Snapshot::new(rows)));
            }
        }
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>> {
        let inner = self.lock()?;
        Ok(inner.read(doc)?.map(|data| Document::new(doc.id.clone(), data)))
    }

    async fn create(&self, doc: &DocRef, patch: Patch) -> Result<()> {
        let mut inner = self.lock()?;
        inner.create_doc(doc, &patch)?;
        debug!(doc = %doc, "created document");
        Ok(())
    }

    async fn add(&self, collection: &str, patch: Patch) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let doc = DocRef::new(collection, id.clone());
        let mut inner = self.lock()?;
        inner.create_doc(&doc, &patch)?;
        debug!(doc = %doc, "added document");
        Ok(id)
    }

    async fn update(&self, doc: &DocRef, patch: Patch) -> Result<()> {
        let mut inner = self.lock()?;
        let mut data = inner
            .read(doc)?
            .ok_or_else(|| StoreError::NotFound(doc.path()))?;
        let now = inner.server_now();
        patch.apply(&mut data, now);
        inner.write(doc, &data, now)?;
        inner.notify(&doc.collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let inner = self.lock()?;
        let docs = inner.scan(&query.collection)?;
        Ok(query.evaluate(docs))
    }

    fn subscribe(&self, query: Query) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel();
        self.attach(query, tx)?;
        Ok(subscription)
    }
}

impl Database {
    /// Register a live query that feeds an existing sender. The current
    /// result is sent immediately.
    pub fn attach(&self, query: Query, tx: SnapshotSender) -> Result<()> {
        let mut inner = self.lock()?;
        let rows = query.evaluate(inner.scan(&query.collection)?);
        let _ = tx.send(Ok(Snapshot::new(rows.clone())));

        debug!(collection = %query.collection, "live query attached");
        inner.watchers.push(Watcher {
            query,
            tx,
            last: rows,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::query::{Direction, Filter};

    fn chat_ref() -> DocRef {
        DocRef::new("chats", "u1_u2")
    }

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let db = Database::open_in_memory().unwrap();
        db.create(&chat_ref(), Patch::from_object(json!({"typing": {"u1": false}})))
            .await
            .unwrap();

        db.update(&chat_ref(), Patch::new().set("typing.u1", true))
            .await
            .unwrap();

        let doc = db.get(&chat_ref()).await.unwrap().unwrap();
        assert_eq!(doc.field("typing.u1"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let db = Database::open_in_memory().unwrap();
        db.create(&chat_ref(), Patch::new()).await.unwrap();
        let err = db.create(&chat_ref(), Patch::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update(&chat_ref(), Patch::new().set("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_timestamps_strictly_increase() {
        let db = Database::open_in_memory().unwrap();
        let mut last = i64::MIN;
        for _ in 0..20 {
            let id = db
                .add("m", Patch::new().server_timestamp("createdAt"))
                .await
                .unwrap();
            let doc = db.get(&DocRef::new("m", id)).await.unwrap().unwrap();
            let ts = doc.field("createdAt").and_then(Value::as_i64).unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    #[tokio::test]
    async fn test_live_query_pushes_initial_and_changes() {
        let db = Database::open_in_memory().unwrap();
        db.add("m", Patch::new().set("n", 1)).await.unwrap();

        let mut sub = db
            .subscribe(Query::collection("m").order_by("n", Direction::Ascending))
            .unwrap();
        let first = sub.try_next().unwrap().unwrap();
        assert_eq!(first.docs.len(), 1);

        db.add("m", Patch::new().set("n", 2)).await.unwrap();
        let second = sub.try_next().unwrap().unwrap();
        assert_eq!(second.docs.len(), 2);

        // A write to another collection does not wake this query.
        db.add("other", Patch::new().set("n", 3)).await.unwrap();
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_unchanged_result_is_not_pushed() {
        let db = Database::open_in_memory().unwrap();
        db.create(&chat_ref(), Patch::new().set("users", json!(["u1", "u2"])))
            .await
            .unwrap();
        db.create(&DocRef::new("chats", "u3_u4"), Patch::new().set("users", json!(["u3", "u4"])))
            .await
            .unwrap();

        let mut sub = db.subscribe_doc(&chat_ref()).unwrap();
        assert!(sub.try_next().is_some());

        db.update(&DocRef::new("chats", "u3_u4"), Patch::new().set("typing.u3", true))
            .await
            .unwrap();
        assert!(sub.try_next().is_none());

        let mut by_member = db
            .subscribe(
                Query::collection("chats").filter(Filter::ArrayContains("users".into(), json!("u1"))),
            )
            .unwrap();
        let initial = by_member.try_next().unwrap().unwrap();
        assert_eq!(initial.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let db = Database::open_in_memory().unwrap();
        let sub = db.subscribe(Query::collection("m")).unwrap();
        assert_eq!(db.watcher_count().unwrap(), 1);
        drop(sub);
        assert_eq!(db.watcher_count().unwrap(), 0);
    }
}
