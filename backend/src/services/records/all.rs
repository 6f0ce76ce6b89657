//! # Collection Retrieval
//!
//! Reads every document of a collection and streams it back as one JSON
//! array, each element `{"_id": "...", <fields>}`. There is no filter,
//! paging or ordering contract; the store's insertion order is used.

use crate::errors::ApiError;
use crate::services::run_storage;
use crate::state::AppState;
use actix_web::http::header::ContentType;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use futures_util::stream::{self, Stream, StreamExt};
use common::model::record::StoredDocument;
use common::model::target::Target;
use log::debug;
use std::sync::Arc;

/// Handler for `GET /all/{db}/{collection}`.
pub(crate) async fn process(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (db, collection) = path.into_inner();
    let target = Target::new(db, collection)?;
    let documents = retrieve(&state, target).await?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::json())
        .streaming(json_array(documents)))
}

/// Every document stored in `target`. Never-written targets yield an empty
/// list rather than an error.
pub async fn retrieve(state: &AppState, target: Target) -> Result<Vec<StoredDocument>, ApiError> {
    let store = Arc::clone(&state.store);
    let label = target.to_string();
    let documents = run_storage(state.storage_timeout, move |_| store.find_all(&target)).await?;
    debug!("read {} document(s) from {}", documents.len(), label);
    Ok(documents)
}

/// Encodes `documents` as a JSON array, one chunk per document.
fn json_array(documents: Vec<StoredDocument>) -> impl Stream<Item = Result<Bytes, ApiError>> {
    let elements = stream::iter(documents.into_iter().enumerate()).map(
        |(i, doc)| -> Result<Bytes, ApiError> {
            let mut chunk = Vec::new();
            if i > 0 {
                chunk.push(b',');
            }
            serde_json::to_writer(&mut chunk, &doc).map_err(|err| {
                ApiError::Internal(format!("encoding document {}: {err}", doc.id))
            })?;
            Ok(Bytes::from(chunk))
        },
    );

    stream::once(async { Ok(Bytes::from_static(b"[")) })
        .chain(elements)
        .chain(stream::once(async { Ok(Bytes::from_static(b"]")) }))
}
