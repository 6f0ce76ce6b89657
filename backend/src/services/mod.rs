//! HTTP services.
//!
//! Each sub-module exposes functions returning an Actix `Scope`, mounted
//! with `.service(...)` in `main.rs`:
//! - `records`: bulk ingestion and full-collection retrieval.
//! - `kinds`: the record kinds accepted by the ingestion routes.
//! - `health`: liveness probe.

pub mod health;
pub mod kinds;
pub mod records;

use crate::errors::ApiError;
use crate::storage::{CommitGate, StorageError};
use actix_web::web;
use log::{error, warn};
use std::time::Duration;

/// JSON extractor settings shared by every route.
///
/// Bodies that are not JSON (or exceed `limit`) are answered with a 400
/// in the same error shape as the rest of the API.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| ApiError::BadRequest(format!("invalid JSON body: {err}")).into())
}

/// Runs a blocking storage call on the blocking pool, bounded by `limit`.
///
/// The call receives a [`CommitGate`] that engines claim right before they
/// commit. On timeout the gate is abandoned so a late call rolls back
/// instead of committing; if the commit was already claimed the result is
/// awaited and reported as is.
pub async fn run_storage<T, F>(limit: Duration, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&CommitGate) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let gate = CommitGate::new();
    let worker_gate = gate.clone();
    let mut handle = tokio::task::spawn_blocking(move || call(&worker_gate));

    let joined = match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => joined,
        Err(_) if gate.abandon() => {
            error!("storage call exceeded {:?}; batch abandoned", limit);
            return Err(ApiError::Timeout(limit));
        }
        Err(_) => {
            warn!("storage call exceeded {:?} while committing; awaiting result", limit);
            handle.await
        }
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!("storage call failed: {}", err);
            Err(ApiError::Storage(err))
        }
        Err(join_err) => {
            error!("storage task aborted: {}", join_err);
            Err(ApiError::Internal(format!("storage task aborted: {join_err}")))
        }
    }
}
