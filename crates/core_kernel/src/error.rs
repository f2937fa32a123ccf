//! Core error types used across the system

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error kinds surfaced at the system boundaries
///
/// Each domain error maps onto exactly one kind. Transport layers translate
/// kinds into their own codes; nothing outside the domain crates inspects
/// the concrete error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller could not be identified
    Unauthorized,
    /// The caller's role does not permit the action
    Forbidden,
    /// The caller's organization is not allowed to act
    TenantAccessDenied,
    /// The entity does not exist or is outside the caller's scope
    NotFound,
    /// The write conflicts with existing data
    Conflict,
    /// The input was rejected by domain validation
    Validation,
    /// The claim is in a status that forbids further mutation
    ClaimNotModifiable,
    /// The caller exceeded its request allowance
    RateLimitExceeded,
    /// An idempotency key was reused inconsistently
    IdempotencyConflict,
    /// Storage infrastructure failed
    Database,
    /// Queue infrastructure failed
    Queue,
}

impl ErrorKind {
    /// Returns true for failures that are deterministic given the input.
    ///
    /// These must never be retried by any layer.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, ErrorKind::Database | ErrorKind::Queue)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::TenantAccessDenied => "tenant_access_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation_error",
            ErrorKind::ClaimNotModifiable => "claim_not_modifiable",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::IdempotencyConflict => "idempotency_conflict",
            ErrorKind::Database => "database_error",
            ErrorKind::Queue => "queue_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidStateTransition(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    /// Returns the boundary error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::InvalidStateTransition(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}
