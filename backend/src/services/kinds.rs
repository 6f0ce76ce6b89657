//! # Record Kind Service Module
//!
//! Everything addressed by record kind, under `/kinds`.

use crate::services::records::add_many;
use crate::state::AppState;
use actix_web::web::{self, get, post, scope};
use actix_web::{HttpResponse, Scope};
use common::model::kind::RecordKind;

/// The base path for all kind-related API endpoints.
const API_PATH: &str = "/kinds";

/// Configures and returns the Actix `Scope` for all kind-related routes.
///
/// # Registered Routes:
///
/// *   **`GET /kinds`**:
///     - **Handler**: `process`
///     - **Description**: Lists every registered record kind with its declared
///       fields and names the default kind. The implicit `timestamp` field is
///       not listed.
///
/// *   **`POST /kinds/{kind}/add_many/{collection}/{db}`**:
///     - **Handler**: `records::add_many::process`
///     - **Description**: Bulk ingestion validated against `{kind}`. Unknown
///       kinds are a 404.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", get().to(process))
        .route("/{kind}/add_many/{collection}/{db}", post().to(add_many::process))
}

async fn process(state: web::Data<AppState>) -> HttpResponse {
    let kinds: Vec<&RecordKind> = state.registry.kinds().collect();
    HttpResponse::Ok().json(serde_json::json!({
        "default": state.default_kind,
        "kinds": kinds,
    }))
}
