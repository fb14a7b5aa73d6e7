//! # Error Responses
//!
//! Maps engine errors onto HTTP status codes and the `{error, detail,
//! retryable}` body.

use super::types::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nounwire_core::NounwireError;

/// A `NounwireError` on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub NounwireError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NounwireError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            NounwireError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            NounwireError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            NounwireError::UnknownNounName(_)
            | NounwireError::MalformedConstraint(_)
            | NounwireError::Serialization(_) => StatusCode::BAD_REQUEST,
            NounwireError::QueryTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            NounwireError::UnknownRuntimeNounType(_)
            | NounwireError::DanglingReference { .. }
            | NounwireError::ValueMismatch { .. }
            | NounwireError::InconsistentSet(_)
            | NounwireError::SlotConflict(_)
            | NounwireError::SchemaConfig(_)
            | NounwireError::ProviderFailed(_)
            | NounwireError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for the `error` field.
    pub fn code(&self) -> &'static str {
        match &self.0 {
            NounwireError::AuthenticationFailed => "authentication_failed",
            NounwireError::UnknownEndpoint(_) => "unknown_endpoint",
            NounwireError::MethodNotAllowed(_) => "method_not_allowed",
            NounwireError::UnknownNounName(_) => "unknown_noun_name",
            NounwireError::MalformedConstraint(_) => "malformed_constraint",
            NounwireError::Serialization(_) => "malformed_request",
            NounwireError::QueryTimeout(_) => "query_timeout",
            NounwireError::UnknownRuntimeNounType(_) => "unknown_runtime_noun_type",
            NounwireError::DanglingReference { .. } => "dangling_reference",
            NounwireError::ValueMismatch { .. } => "value_mismatch",
            NounwireError::InconsistentSet(_) => "inconsistent_set",
            NounwireError::SlotConflict(_) => "slot_conflict",
            NounwireError::SchemaConfig(_) => "schema_config",
            NounwireError::ProviderFailed(_) => "provider_failed",
            NounwireError::Io(_) => "io_error",
        }
    }
}

impl From<NounwireError> for ApiError {
    fn from(error: NounwireError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            detail: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
