//! SQLite document engine.
//!
//! Each logical database maps to `<root>/<encoded name>.sqlite`. All
//! collections of a database share one `documents` table; the collection
//! name is a column, so any string is a valid collection without touching
//! the schema. Documents are stored as JSON text.

use crate::storage::{CommitGate, DocumentStore, StorageError};
use common::model::record::{DocumentId, Record, StoredDocument};
use common::model::target::Target;
use log::debug;
use rusqlite::{params, Connection};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

const CREATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        id         TEXT NOT NULL UNIQUE,
        body       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS documents_by_collection ON documents (collection, seq);
";

const INSERT_DOCUMENT: &str = "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)";

const SELECT_COLLECTION: &str =
    "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Caps on the connections kept open between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Idle connections kept for a single logical database.
    pub per_database: usize,
    /// Idle connections kept across all databases. The least recently used
    /// database loses its connections first.
    pub total: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            per_database: 8,
            total: 64,
        }
    }
}

pub struct SqliteStore {
    root: PathBuf,
    limits: PoolLimits,
    idle: Mutex<IdlePool>,
}

impl SqliteStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, limits: PoolLimits) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            limits,
            idle: Mutex::new(IdlePool::default()),
        })
    }

    pub fn database_path(&self, database: &str) -> PathBuf {
        self.root.join(format!("{}.sqlite", encode_file_stem(database)))
    }

    /// Takes an idle connection for `database` or opens a new one.
    fn acquire(&self, database: &str) -> Result<PooledConnection<'_>, StorageError> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .take(database);

        let conn = match reused {
            Some(conn) => conn,
            None => open_connection(&self.database_path(database))?,
        };
        Ok(PooledConnection {
            store: self,
            database: database.to_string(),
            conn: Some(conn),
        })
    }

    fn release(&self, database: String, conn: Connection) {
        // a poisoned pool just stops recycling
        if let Ok(mut idle) = self.idle.lock() {
            idle.put(database, conn, self.limits);
        }
    }

    #[cfg(test)]
    fn idle_count(&self, database: &str) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.by_database.get(database).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn idle_total(&self) -> usize {
        self.idle.lock().map(|idle| idle.total).unwrap_or(0)
    }
}

/// Idle connections grouped by database, with a recency order used to
/// evict once the total cap is reached.
#[derive(Default)]
struct IdlePool {
    by_database: HashMap<String, Vec<Connection>>,
    /// Databases holding idle connections, least recently released first.
    recency: VecDeque<String>,
    total: usize,
}

impl IdlePool {
    fn take(&mut self, database: &str) -> Option<Connection> {
        let slot = self.by_database.get_mut(database)?;
        let conn = slot.pop()?;
        let drained = slot.is_empty();
        self.total -= 1;
        if drained {
            self.forget(database);
        }
        Some(conn)
    }

    fn put(&mut self, database: String, conn: Connection, limits: PoolLimits) {
        let held = self.by_database.get(&database).map_or(0, Vec::len);
        if held >= limits.per_database || limits.total == 0 {
            return;
        }
        self.touch(&database);
        self.by_database.entry(database).or_default().push(conn);
        self.total += 1;
        while self.total > limits.total && self.evict_oldest() {}
    }

    fn touch(&mut self, database: &str) {
        if let Some(pos) = self.recency.iter().position(|d| d == database) {
            self.recency.remove(pos);
        }
        self.recency.push_back(database.to_string());
    }

    fn forget(&mut self, database: &str) {
        self.by_database.remove(database);
        if let Some(pos) = self.recency.iter().position(|d| d == database) {
            self.recency.remove(pos);
        }
    }

    /// Closes one connection of the least recently used database.
    fn evict_oldest(&mut self) -> bool {
        let Some(database) = self.recency.front().cloned() else {
            return false;
        };
        match self.take(&database) {
            Some(conn) => {
                debug!("sqlite: closing idle connection to {}", database);
                drop(conn);
            }
            None => self.forget(&database),
        }
        true
    }
}

impl DocumentStore for SqliteStore {
    fn insert_many(
        &self,
        target: &Target,
        records: &[Record],
        gate: &CommitGate,
    ) -> Result<Vec<DocumentId>, StorageError> {
        let bodies = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.acquire(target.database())?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(bodies.len());
        {
            let mut stmt = tx.prepare_cached(INSERT_DOCUMENT)?;
            for body in &bodies {
                let id = Uuid::new_v4().to_string();
                stmt.execute(params![target.collection(), id, body])?;
                ids.push(DocumentId::new(id));
            }
        }
        // dropping an uncommitted transaction rolls it back
        gate.begin_commit()?;
        tx.commit()?;

        debug!("sqlite: committed {} document(s) to {}", ids.len(), target);
        Ok(ids)
    }

    fn find_all(&self, target: &Target) -> Result<Vec<StoredDocument>, StorageError> {
        if !self.database_path(target.database()).exists() {
            return Ok(Vec::new());
        }

        let conn = self.acquire(target.database())?;
        let mut stmt = conn.prepare_cached(SELECT_COLLECTION)?;
        let rows = stmt
            .query_map(params![target.collection()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| -> Result<StoredDocument, StorageError> {
                Ok(StoredDocument {
                    id: DocumentId::new(id),
                    record: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }
}

/// A connection borrowed from the pool. Goes back to the idle set on drop.
struct PooledConnection<'a> {
    store: &'a SqliteStore,
    database: String,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.store.release(std::mem::take(&mut self.database), conn);
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.execute_batch(CREATE_SCHEMA)?;
    Ok(conn)
}

/// Maps an arbitrary database name to a file stem that cannot escape the
/// root directory. Bytes outside `[A-Za-z0-9_-]` become `%XX`.
fn encode_file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::record::FieldValue;
    use tempfile::TempDir;

    fn record(raw: &str, h: f64) -> Record {
        [
            ("raw".to_string(), FieldValue::String(raw.into())),
            ("H".to_string(), FieldValue::Float(h)),
            ("count".to_string(), FieldValue::Integer(3)),
            (
                "timestamp".to_string(),
                FieldValue::String("2024-05-01T12:30:00.000000Z".into()),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn store_with(limits: PoolLimits) -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (SqliteStore::open(dir.path(), limits).unwrap(), dir)
    }

    fn store() -> (SqliteStore, TempDir) {
        store_with(PoolLimits {
            per_database: 2,
            total: 8,
        })
    }

    fn insert(store: &SqliteStore, target: &Target, records: &[Record]) -> Vec<DocumentId> {
        store
            .insert_many(target, records, &CommitGate::new())
            .unwrap()
    }

    #[test]
    fn insert_then_find_all_round_trips_types() {
        let (store, _dir) = store();
        let target = Target::new("test", "sensors").unwrap();

        let ids = insert(&store, &target, &[record("a", 1.0), record("b", 2.5)]);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let docs = store.find_all(&target).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, ids[0]);
        assert_eq!(docs[0].record, record("a", 1.0));
        assert_eq!(docs[1].record.get("H"), Some(&FieldValue::Float(2.5)));
        assert_eq!(docs[1].record.get("count"), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn collections_and_databases_are_isolated() {
        let (store, _dir) = store();
        let a = Target::new("tenant-a", "sensors").unwrap();
        let b = Target::new("tenant-a", "other").unwrap();
        let c = Target::new("tenant-b", "sensors").unwrap();

        insert(&store, &a, &[record("a", 1.0)]);

        assert_eq!(store.find_all(&a).unwrap().len(), 1);
        assert!(store.find_all(&b).unwrap().is_empty());
        assert!(store.find_all(&c).unwrap().is_empty());
    }

    #[test]
    fn reading_unknown_database_does_not_create_it() {
        let (store, _dir) = store();
        let target = Target::new("never-written", "x").unwrap();

        assert!(store.find_all(&target).unwrap().is_empty());
        assert!(!store.database_path("never-written").exists());
    }

    #[test]
    fn connections_are_recycled_up_to_per_database_limit() {
        let (store, _dir) = store();
        {
            let _first = store.acquire("db").unwrap();
            let _second = store.acquire("db").unwrap();
            let _third = store.acquire("db").unwrap();
        }
        assert_eq!(store.idle_count("db"), 2);

        let _reused = store.acquire("db").unwrap();
        assert_eq!(store.idle_count("db"), 1);
    }

    #[test]
    fn idle_connections_stay_bounded_across_many_databases() {
        let (store, _dir) = store_with(PoolLimits {
            per_database: 2,
            total: 5,
        });

        for n in 0..20 {
            let target = Target::new(format!("tenant{n}"), "sensors").unwrap();
            insert(&store, &target, &[record("a", 1.0)]);
            assert!(store.idle_total() <= 5);
        }

        assert_eq!(store.idle_total(), 5);
        assert_eq!(store.idle_count("tenant19"), 1);
        assert_eq!(store.idle_count("tenant0"), 0);

        // evicted databases still open on demand
        let first = Target::new("tenant0", "sensors").unwrap();
        assert_eq!(store.find_all(&first).unwrap().len(), 1);
        assert!(store.idle_total() <= 5);
    }

    #[test]
    fn zero_total_limit_disables_recycling() {
        let (store, _dir) = store_with(PoolLimits {
            per_database: 4,
            total: 0,
        });
        let target = Target::new("db", "sensors").unwrap();
        insert(&store, &target, &[record("a", 1.0)]);
        assert_eq!(store.idle_total(), 0);
    }

    #[test]
    fn database_names_cannot_escape_the_root() {
        let (store, dir) = store();
        let path = store.database_path("../../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(encode_file_stem("a.b/c d"), "a%2Eb%2Fc%20d");
    }

    #[test]
    fn failed_batch_leaves_no_documents() {
        let (store, _dir) = store();
        let target = Target::new("test", "sensors").unwrap();
        let ids = insert(&store, &target, &[record("a", 1.0)]);

        store
            .acquire("test")
            .unwrap()
            .execute_batch(
                r#"CREATE TRIGGER reject_boom BEFORE INSERT ON documents
                   WHEN NEW.body LIKE '%"raw":"boom"%'
                   BEGIN SELECT RAISE(ABORT, 'rejected'); END;"#,
            )
            .unwrap();

        let result = store.insert_many(
            &target,
            &[record("b", 2.0), record("boom", 3.0), record("c", 4.0)],
            &CommitGate::new(),
        );
        assert!(matches!(result, Err(StorageError::Sqlite(_))));

        let docs = store.find_all(&target).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, ids[0]);
    }

    #[test]
    fn abandoned_batch_is_rolled_back() {
        let (store, _dir) = store();
        let target = Target::new("test", "sensors").unwrap();
        let gate = CommitGate::new();
        assert!(gate.abandon());

        let result = store.insert_many(&target, &[record("a", 1.0)], &gate);
        assert!(matches!(result, Err(StorageError::Abandoned)));
        assert!(store.find_all(&target).unwrap().is_empty());
    }
}
