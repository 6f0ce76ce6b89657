//! # Bulk Ingestion
//!
//! 1.  **Kind lookup**: the route decides the record kind, either the
//!     configured default or the `{kind}` path segment.
//! 2.  **Validation**: the body is checked against the kind before any I/O.
//!     A single bad field rejects the whole batch with a 422.
//! 3.  **Insert**: the validated records are written to `{db}`/`{collection}`
//!     in one all-or-nothing call on the blocking pool. An empty batch never
//!     reaches the store.
//! 4.  **Response**: `{"inserted_ids": [...]}`, ids in input order.

use crate::errors::ApiError;
use crate::services::run_storage;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use common::model::record::{DocumentId, Record};
use common::model::target::Target;
use common::responses::InsertManyResponse;
use common::schema::validate_batch;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// Handler for `POST /add_many/{collection}/{db}`.
pub(crate) async fn process_default(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let (collection, db) = path.into_inner();
    let target = Target::new(db, collection)?;
    add_many(&state, &state.default_kind, target, payload.into_inner()).await
}

/// Handler for `POST /kinds/{kind}/add_many/{collection}/{db}`.
pub(crate) async fn process(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    payload: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let (kind, collection, db) = path.into_inner();
    let target = Target::new(db, collection)?;
    add_many(&state, &kind, target, payload.into_inner()).await
}

async fn add_many(
    state: &AppState,
    kind_name: &str,
    target: Target,
    payload: Value,
) -> Result<HttpResponse, ApiError> {
    let kind = state
        .registry
        .get(kind_name)
        .ok_or_else(|| ApiError::UnknownKind(kind_name.to_string()))?;

    let records = validate_batch(kind, &payload).map_err(|err| {
        warn!("rejected batch for {}: {}", target, err);
        err
    })?;

    let inserted_ids = ingest(state, target, records).await?;
    Ok(HttpResponse::Ok().json(InsertManyResponse { inserted_ids }))
}

/// Persists already validated records into `target` as a single batch.
///
/// Returns one id per record, in the order of `records`.
pub async fn ingest(
    state: &AppState,
    target: Target,
    records: Vec<Record>,
) -> Result<Vec<DocumentId>, ApiError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let store = Arc::clone(&state.store);
    let count = records.len();
    let label = target.to_string();
    let ids = run_storage(state.storage_timeout, move |gate| {
        store.insert_many(&target, &records, gate)
    })
    .await?;

    debug!("inserted {} record(s) into {}", count, label);
    Ok(ids)
}
