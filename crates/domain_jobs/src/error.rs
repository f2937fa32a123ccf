//! Job domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, PortError};
use domain_claims::ClaimError;
use domain_tenancy::AccessError;

/// Errors raised while recording events or processing jobs
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Idempotency key '{key}' was already used for a different request")]
    IdempotencyConflict { key: String },

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Ledger entry {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Store error: {0}")]
    Store(#[from] PortError),

    #[error("Queue error: {0}")]
    Queue(#[source] PortError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JobError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        JobError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the boundary error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Claim(err) => err.kind(),
            JobError::Access(err) => err.kind(),
            JobError::NotFound { .. } => ErrorKind::NotFound,
            JobError::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
            JobError::InvalidPayload(_) | JobError::Serialization(_) => ErrorKind::Validation,
            JobError::AlreadyCompleted(_) => ErrorKind::Conflict,
            JobError::Store(err) if err.is_conflict() => ErrorKind::Conflict,
            JobError::Store(_) => ErrorKind::Database,
            JobError::Queue(_) => ErrorKind::Queue,
        }
    }

    /// True when a later attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !self.kind().is_deterministic()
    }
}
