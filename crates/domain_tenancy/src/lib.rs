//! Tenancy Domain
//!
//! This crate owns everything that decides *who* is calling and *what* they
//! may see:
//!
//! - Organizations (tenants) and their claim settings
//! - Users, roles, and the bounded claim-assignment set
//! - The immutable [`AccessContext`] built once per request or job
//! - The permission policy (pure functions over [`Role`])
//! - [`DataScope`], the tenant + role predicate every storage call applies
//! - The injected rate limiter and the audit log stub
//!
//! # Request Flow
//!
//! ```text
//! credential -> VerifiedIdentity -> AccessContext::establish (live directory read)
//!            -> permission check -> DataScope::for_context -> storage
//! ```

pub mod organization;
pub mod user;
pub mod context;
pub mod permissions;
pub mod scope;
pub mod rate_limit;
pub mod audit;
pub mod ports;
pub mod error;

pub use organization::{Organization, OrganizationSettings};
pub use user::{User, Role, AssignedClaims, MAX_ASSIGNED_CLAIMS};
pub use context::{AccessContext, RoleScope, VerifiedIdentity};
pub use scope::{DataScope, RowPredicate, ScopedEntity};
pub use rate_limit::{
    RateLimiter, RateLimitKey, RateLimitDecision, RateLimitPolicy, InMemoryRateLimiter,
};
pub use audit::AuditLogEntry;
pub use ports::{UserDirectory, CredentialVerifier};
pub use error::AccessError;
