use crate::config::{Config, ConfigError};
use crate::storage::{self, DocumentStore};
use common::schema::SchemaRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state, handed to every handler as `web::Data`.
///
/// Holds no mutable state of its own; the store is the only shared resource
/// and is safe for concurrent use.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<SchemaRegistry>,
    /// Kind bound to the plain `/add_many` route.
    pub default_kind: String,
    pub storage_timeout: Duration,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registry = config.registry()?;
        let storage_timeout = config.storage_timeout()?;
        let store = storage::connect(&config.storage_uri()?, config.pool_limits())?;
        Ok(Self {
            store,
            registry: Arc::new(registry),
            default_kind: config.default_kind.clone(),
            storage_timeout,
        })
    }
}
