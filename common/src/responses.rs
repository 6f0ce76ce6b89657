//! Payloads returned by the HTTP endpoints.

use crate::model::record::DocumentId;
use crate::schema::FieldViolation;
use serde::{Deserialize, Serialize};

/// Body of a successful bulk insert: one id per input record, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertManyResponse {
    pub inserted_ids: Vec<DocumentId>,
}

/// Body of every error response.
///
/// `violations` is only present for validation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}
