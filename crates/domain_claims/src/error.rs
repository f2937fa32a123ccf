//! Claims domain errors

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{ClaimId, ErrorKind, PortError};
use domain_tenancy::AccessError;
use crate::claim::ClaimStatus;

/// Errors that can occur in the claims domain
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Claim {0} is not assigned to the calling processor")]
    NotAssignedToCaller(ClaimId),

    #[error("Invalid diagnosis code: {0}")]
    InvalidDiagnosisCode(String),

    #[error("Invalid claim amount {amount}: must be between {min} and {max}")]
    InvalidClaimAmount {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Service date {0} is in the future")]
    ServiceDateInFuture(NaiveDate),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("A denial reason is required when rejecting a claim")]
    MissingDenialReason,

    #[error("Claim {claim_id} is {status} and can no longer be modified")]
    NotModifiable { claim_id: ClaimId, status: ClaimStatus },

    #[error("Claim {claim_id} moved to {status} before the update applied")]
    StaleStatus { claim_id: ClaimId, status: ClaimStatus },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Bulk update of {count} claims exceeds the limit of {max}")]
    BulkLimitExceeded { count: usize, max: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl ClaimError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ClaimError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the boundary error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::NotFound { .. } => ErrorKind::NotFound,
            ClaimError::Access(err) => err.kind(),
            ClaimError::NotAssignedToCaller(_) => ErrorKind::Forbidden,
            ClaimError::InvalidDiagnosisCode(_)
            | ClaimError::InvalidClaimAmount { .. }
            | ClaimError::ServiceDateInFuture(_)
            | ClaimError::InvalidStatusTransition { .. }
            | ClaimError::MissingDenialReason
            | ClaimError::InvalidQuery(_)
            | ClaimError::BulkLimitExceeded { .. } => ErrorKind::Validation,
            ClaimError::NotModifiable { .. } => ErrorKind::ClaimNotModifiable,
            ClaimError::StaleStatus { .. } | ClaimError::Conflict(_) => ErrorKind::Conflict,
            ClaimError::Store(err) if err.is_conflict() => ErrorKind::Conflict,
            ClaimError::Store(err) if err.is_not_found() => ErrorKind::NotFound,
            ClaimError::Store(_) => ErrorKind::Database,
        }
    }
}
