//! # Storage
//!
//! The document store behind the ingestion and retrieval routes. Handlers
//! never talk to an engine directly: they hold an `Arc<dyn DocumentStore>`
//! in the shared `AppState` and call it from the blocking thread pool.
//!
//! Two engines are provided:
//! - `sqlite`: durable. One SQLite file per logical database, connections
//!   pooled per file.
//! - `memory`: process-local maps, used by the tests and for throwaway runs.
//!
//! Both engines insert a batch all-or-nothing: either every record of the
//! call is stored and an id is returned for each, or nothing is stored. A
//! batch whose caller gave up (see [`CommitGate`]) is rolled back.

pub mod memory;
pub mod sqlite;

use common::model::record::{DocumentId, Record, StoredDocument};
use common::model::target::Target;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use sqlite::PoolLimits;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported storage uri '{0}', expected sqlite://<dir> or memory://")]
    UnsupportedUri(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("document encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("batch abandoned by caller before commit")]
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Committing,
    Abandoned,
}

/// Decides, exactly once, whether a write commits or is abandoned.
///
/// The engine calls [`CommitGate::begin_commit`] right before making a batch
/// durable; a caller that stops waiting calls [`CommitGate::abandon`]. Only
/// one of the two can win. Once `abandon` has returned `true` the batch is
/// guaranteed not to be stored.
#[derive(Debug, Clone)]
pub struct CommitGate(Arc<Mutex<GateState>>);

impl Default for CommitGate {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(GateState::Open)))
    }
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the commit. Fails with [`StorageError::Abandoned`] if the
    /// caller is gone, in which case the write must be rolled back.
    pub fn begin_commit(&self) -> Result<(), StorageError> {
        let mut state = self.0.lock().map_err(|_| StorageError::Poisoned)?;
        match *state {
            GateState::Abandoned => Err(StorageError::Abandoned),
            _ => {
                *state = GateState::Committing;
                Ok(())
            }
        }
    }

    /// `true` if the write can no longer commit. `false` means a commit is
    /// already under way and its outcome has to be awaited.
    pub fn abandon(&self) -> bool {
        match self.0.lock() {
            Ok(mut state) if *state == GateState::Open => {
                *state = GateState::Abandoned;
                true
            }
            Ok(state) => *state == GateState::Abandoned,
            Err(_) => false,
        }
    }
}

/// Driver interface of a document engine.
///
/// Calls block; async callers go through `services::run_storage`.
pub trait DocumentStore: Send + Sync {
    /// Stores `records` in `target` as one batch and returns their ids in
    /// input order. Creates the database and collection on first use.
    ///
    /// Implementations call `gate.begin_commit()` before the batch becomes
    /// visible and store nothing if it fails.
    fn insert_many(
        &self,
        target: &Target,
        records: &[Record],
        gate: &CommitGate,
    ) -> Result<Vec<DocumentId>, StorageError>;

    /// Every document of `target`, in insertion order. A target that was
    /// never written yields an empty list.
    fn find_all(&self, target: &Target) -> Result<Vec<StoredDocument>, StorageError>;
}

/// The parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    Sqlite { root: PathBuf },
    Memory,
}

impl StorageUri {
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let unsupported = || StorageError::UnsupportedUri(redact(uri));
        let (scheme, rest) = uri.split_once("://").ok_or_else(unsupported)?;
        let location = match rest.rsplit_once('@') {
            Some((_credentials, location)) => location,
            None => rest,
        };
        match scheme {
            "sqlite" if !location.is_empty() => Ok(StorageUri::Sqlite {
                root: PathBuf::from(location),
            }),
            "memory" => Ok(StorageUri::Memory),
            _ => Err(unsupported()),
        }
    }
}

/// Opens the engine named by `uri`.
///
/// `limits` bounds the idle SQLite connections; the memory engine ignores it.
pub fn connect(
    uri: &StorageUri,
    limits: PoolLimits,
) -> Result<Arc<dyn DocumentStore>, StorageError> {
    match uri {
        StorageUri::Sqlite { root } => Ok(Arc::new(sqlite::SqliteStore::open(root, limits)?)),
        StorageUri::Memory => Ok(Arc::new(memory::MemoryStore::new())),
    }
}

/// Replaces the user-info part of a connection string so it can be logged.
pub fn redact(uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, location)) => format!("{scheme}://***@{location}"),
            None => uri.to_string(),
        },
        None => uri.to_string(),
    }
}
