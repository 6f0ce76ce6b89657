//! In-process document engine backed by nested maps.

use crate::storage::{CommitGate, DocumentStore, StorageError};
use common::model::record::{DocumentId, Record, StoredDocument};
use common::model::target::Target;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

type Collections = HashMap<String, Vec<StoredDocument>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<HashMap<String, Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_many(
        &self,
        target: &Target,
        records: &[Record],
        gate: &CommitGate,
    ) -> Result<Vec<DocumentId>, StorageError> {
        let documents: Vec<StoredDocument> = records
            .iter()
            .map(|record| StoredDocument {
                id: DocumentId::new(Uuid::new_v4().to_string()),
                record: record.clone(),
            })
            .collect();
        let ids = documents.iter().map(|doc| doc.id.clone()).collect();

        let mut databases = self.databases.write().map_err(|_| StorageError::Poisoned)?;
        gate.begin_commit()?;
        databases
            .entry(target.database().to_string())
            .or_default()
            .entry(target.collection().to_string())
            .or_default()
            .extend(documents);
        Ok(ids)
    }

    fn find_all(&self, target: &Target) -> Result<Vec<StoredDocument>, StorageError> {
        let databases = self.databases.read().map_err(|_| StorageError::Poisoned)?;
        Ok(databases
            .get(target.database())
            .and_then(|collections| collections.get(target.collection()))
            .cloned()
            .unwrap_or_default())
    }
}
