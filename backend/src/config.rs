//! Process configuration, read from the command line with environment
//! fallbacks.

use crate::storage::{PoolLimits, StorageError, StorageUri};
use clap::Parser;
use common::schema::{SchemaError, SchemaRegistry};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("could not read schema file {path}: {source}")]
    SchemaFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("default record kind '{0}' is not registered")]
    UnknownDefaultKind(String),
    #[error("storage timeout must be at least one second")]
    ZeroTimeout,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "backend", about = "Bulk document ingestion and retrieval API")]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "INGEST_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "INGEST_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Storage connection string: sqlite://<dir> or memory://
    #[arg(long, env = "INGEST_STORAGE_URI", default_value = "sqlite://data")]
    pub storage_uri: String,

    /// Upper bound on a single storage call, in seconds
    #[arg(long, env = "INGEST_STORAGE_TIMEOUT_SECS", default_value_t = 30)]
    pub storage_timeout_secs: u64,

    /// Idle connections kept per logical database
    #[arg(long, env = "INGEST_POOL_SIZE", default_value_t = 8)]
    pub pool_size: usize,

    /// Idle connections kept across all logical databases
    #[arg(long, env = "INGEST_MAX_IDLE_CONNECTIONS", default_value_t = 64)]
    pub max_idle_connections: usize,

    /// Record kind bound to the plain /add_many route
    #[arg(long, env = "INGEST_DEFAULT_KIND", default_value = "hsv")]
    pub default_kind: String,

    /// JSON file with additional record kinds
    #[arg(long, env = "INGEST_SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// Maximum accepted request body, in bytes
    #[arg(long, env = "INGEST_JSON_LIMIT_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub json_limit_bytes: usize,
}

impl Config {
    pub fn storage_uri(&self) -> Result<StorageUri, ConfigError> {
        Ok(StorageUri::parse(&self.storage_uri)?)
    }

    pub fn storage_timeout(&self) -> Result<Duration, ConfigError> {
        match self.storage_timeout_secs {
            0 => Err(ConfigError::ZeroTimeout),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            per_database: self.pool_size,
            total: self.max_idle_connections,
        }
    }

    /// Builtin kinds plus those of `schema_file`, checked to contain the
    /// default kind.
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let mut registry = SchemaRegistry::builtin();
        if let Some(path) = &self.schema_file {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SchemaFile {
                path: path.clone(),
                source,
            })?;
            registry.extend_from_json(&text)?;
        }
        if registry.get(&self.default_kind).is_none() {
            return Err(ConfigError::UnknownDefaultKind(self.default_kind.clone()));
        }
        Ok(registry)
    }
}
