//! Tenancy domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, OrganizationId, PortError};
use crate::user::Role;

/// Errors raised while establishing or enforcing an access context
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: role {role} may not {action}")]
    Forbidden { action: String, role: Role },

    #[error("Organization {0} does not accept requests")]
    TenantAccessDenied(OrganizationId),

    #[error("Rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Assignment limit exceeded: {count} claims requested, maximum is {max}")]
    AssignmentLimitExceeded { count: usize, max: usize },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Directory error: {0}")]
    Directory(#[from] PortError),
}

impl AccessError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AccessError::Unauthorized(message.into())
    }

    pub fn forbidden(action: impl Into<String>, role: Role) -> Self {
        AccessError::Forbidden {
            action: action.into(),
            role,
        }
    }

    /// Returns the boundary error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Unauthorized(_) | AccessError::UnknownRole(_) => ErrorKind::Unauthorized,
            AccessError::Forbidden { .. } => ErrorKind::Forbidden,
            AccessError::TenantAccessDenied(_) => ErrorKind::TenantAccessDenied,
            AccessError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AccessError::AssignmentLimitExceeded { .. } => ErrorKind::Validation,
            AccessError::Directory(_) => ErrorKind::Database,
        }
    }
}
