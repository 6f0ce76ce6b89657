//! # Record Service Module
//!
//! Bulk ingestion and retrieval of records. The same handlers serve every
//! record kind; the kind only decides which field schema the body is
//! validated against.
//!
//! Routes are split over two scopes, `/add_many` and `/all`. Ingestion for
//! a named kind lives under the `/kinds` scope (see `services::kinds`) and
//! reuses `add_many::process`.

pub(crate) mod add_many;
mod all;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

/// Configures the `/add_many` scope.
///
/// # Registered Routes:
///
/// *   **`POST /{collection}/{db}`**:
///     - **Handler**: `add_many::process_default`
///     - **Description**: Validates a JSON array against the configured default
///       kind and inserts it as one batch. Returns `{"inserted_ids": [...]}`.
pub fn configure_ingest_routes() -> Scope {
    scope("/add_many").route("/{collection}/{db}", post().to(add_many::process_default))
}

/// Configures the `/all` scope.
///
/// # Registered Routes:
///
/// *   **`GET /{db}/{collection}`**:
///     - **Handler**: `all::process`
///     - **Description**: Streams every stored document of the collection as a
///       JSON array. A collection that was never written yields `[]`.
pub fn configure_retrieval_routes() -> Scope {
    scope("/all").route("/{db}/{collection}", get().to(all::process))
}
