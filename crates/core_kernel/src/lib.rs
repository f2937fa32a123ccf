//! Core Kernel - Foundational types for the claims backend
//!
//! This crate provides the building blocks shared by every other crate:
//! - Strongly-typed identifiers for tenant-scoped entities
//! - The boundary error taxonomy (`ErrorKind`)
//! - Ports and adapters infrastructure (`PortError`, `DomainPort`)

pub mod identifiers;
pub mod error;
pub mod ports;

pub use identifiers::{
    OrganizationId, UserId, ProviderId, PatientId, ClaimId,
    PatientEventId, JobId, JobLogId, AuditEventId,
};
pub use error::{CoreError, ErrorKind};
pub use ports::{PortError, DomainPort, HealthStatus, HealthReport, HealthCheckable};
