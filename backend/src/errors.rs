//! Errors surfaced at the HTTP boundary.
//!
//! Every [`ApiError`] renders as a JSON [`ErrorResponse`]:
//! - `BadRequest` → 400
//! - `UnknownKind` → 404
//! - `Validation` → 422, with the field-level violations
//! - `Storage` → 500, with the engine's diagnostic
//! - `Timeout` → 504
//! - `Internal` → 500

use crate::storage::StorageError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::model::target::TargetError;
use common::responses::ErrorResponse;
use common::schema::ValidationError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unknown record kind '{0}'")]
    UnknownKind(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("storage call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Internal(String),
}

impl From<TargetError> for ApiError {
    fn from(err: TargetError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownKind(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let violations = match self {
            ApiError::Validation(err) => err.violations.clone(),
            _ => Vec::new(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::{FieldViolation, Problem};

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownKind("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Storage(StorageError::Poisoned).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(3)).to_string(),
            "storage call timed out after 3s"
        );
    }

    #[test]
    fn validation_response_carries_violations() {
        let err = ApiError::from(ValidationError {
            kind: "hsv".into(),
            violations: vec![FieldViolation {
                index: Some(0),
                field: Some("H".into()),
                expected: None,
                found: None,
                problem: Problem::Missing,
            }],
        });
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
