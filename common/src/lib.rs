//! Shared model types for the ingestion server.
//!
//! Nothing in this crate performs I/O: it describes records, the kinds they
//! are validated against, and the payloads exchanged over HTTP.

pub mod model;
pub mod responses;
pub mod schema;
