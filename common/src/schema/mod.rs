//! Record kinds and the validator that turns raw JSON into typed records.
//!
//! A [`SchemaRegistry`] maps a kind name to its [`RecordKind`]. The
//! ingestion routes look a kind up here and hand the request body to
//! [`validate_batch`], which either yields records ready to persist or a
//! [`ValidationError`] listing every offending field in the batch.
//!
//! [`RecordKind`]: crate::model::kind::RecordKind

mod registry;
mod validate;

pub use registry::{SchemaError, SchemaFile, SchemaRegistry};
pub use validate::{validate_batch, validate_batch_at, FieldViolation, Problem, ValidationError};
