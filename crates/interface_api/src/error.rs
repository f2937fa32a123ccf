//! API error handling
//!
//! Domain errors arrive here already classified by [`ErrorKind`]; this
//! module only chooses the transport status and body. Infrastructure
//! failures are logged in full and answered with a generic message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::ErrorKind;
use domain_claims::ClaimError;
use domain_jobs::JobError;
use domain_tenancy::AccessError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Tenant access denied: {0}")]
    TenantAccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Claim not modifiable: {0}")]
    ClaimNotModifiable(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    /// Builds the error for a domain kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Unauthorized => ApiError::Unauthorized(message),
            ErrorKind::Forbidden => ApiError::Forbidden(message),
            ErrorKind::TenantAccessDenied => ApiError::TenantAccessDenied(message),
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::Conflict => ApiError::Conflict(message),
            ErrorKind::Validation => ApiError::Validation(message),
            ErrorKind::ClaimNotModifiable => ApiError::ClaimNotModifiable(message),
            ErrorKind::RateLimitExceeded => ApiError::RateLimited { retry_after_secs: 1 },
            ErrorKind::IdempotencyConflict => ApiError::IdempotencyConflict(message),
            ErrorKind::Database => ApiError::Database(message),
            ErrorKind::Queue => ApiError::Queue(message),
        }
    }

    /// Machine-readable code written to the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized.code(),
            ApiError::Forbidden(_) => ErrorKind::Forbidden.code(),
            ApiError::TenantAccessDenied(_) => ErrorKind::TenantAccessDenied.code(),
            ApiError::NotFound(_) => ErrorKind::NotFound.code(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => ErrorKind::Conflict.code(),
            ApiError::Validation(_) => ErrorKind::Validation.code(),
            ApiError::ClaimNotModifiable(_) => ErrorKind::ClaimNotModifiable.code(),
            ApiError::RateLimited { .. } => ErrorKind::RateLimitExceeded.code(),
            ApiError::IdempotencyConflict(_) => ErrorKind::IdempotencyConflict.code(),
            ApiError::Database(_) => ErrorKind::Database.code(),
            ApiError::Queue(_) => ErrorKind::Queue.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::TenantAccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_)
            | ApiError::ClaimNotModifiable(_)
            | ApiError::IdempotencyConflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(detail) | ApiError::Queue(detail) => {
                error!(code = self.code(), error = %detail, "infrastructure failure");
                "The request could not be completed, try again later".to_string()
            }
            ApiError::RateLimited { retry_after_secs } => {
                format!("Too many requests, retry after {retry_after_secs}s")
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::TenantAccessDenied(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg)
            | ApiError::ClaimNotModifiable(msg)
            | ApiError::IdempotencyConflict(msg) => msg.clone(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
            details: None,
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::RateLimitExceeded { retry_after_secs } => {
                ApiError::RateLimited { retry_after_secs }
            }
            other => ApiError::from_kind(other.kind(), other.to_string()),
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::Access(inner) => inner.into(),
            other => ApiError::from_kind(other.kind(), other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Access(inner) => inner.into(),
            JobError::Claim(inner) => inner.into(),
            other => ApiError::from_kind(other.kind(), other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ClaimId, OrganizationId, PortError};
    use domain_claims::ClaimStatus;

    #[test]
    fn test_terminal_claims_map_to_conflict() {
        let err: ApiError = ClaimError::NotModifiable {
            claim_id: ClaimId::new(),
            status: ClaimStatus::Paid,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "claim_not_modifiable");
    }

    #[test]
    fn test_nested_access_errors_keep_their_kind() {
        let err: ApiError =
            ClaimError::Access(AccessError::TenantAccessDenied(OrganizationId::new())).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "tenant_access_denied");
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let err: ApiError = JobError::Access(AccessError::RateLimitExceeded { retry_after_secs: 7 }).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_store_failures_are_server_errors() {
        let err: ApiError = ClaimError::Store(PortError::internal("pool closed")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = JobError::Queue(PortError::internal("broker down")).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_idempotency_conflict() {
        let err: ApiError = JobError::IdempotencyConflict { key: "k-1".to_string() }.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "idempotency_conflict");
    }
}
