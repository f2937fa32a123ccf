//! Claims Domain
//!
//! This crate implements the claim aggregate and the tenant-scoped gateway
//! every claim read and write goes through.
//!
//! # Claim Lifecycle
//!
//! ```text
//! submitted -> under_review -> approved | rejected -> paid
//! ```
//!
//! `approved` and `paid` claims are immutable. `rejected` claims may be
//! moved again (for example back to `under_review` on appeal).
//!
//! # Access Paths
//!
//! - User-facing: [`ClaimGateway`] operations taking an
//!   [`AccessContext`](domain_tenancy::AccessContext); tenant and role
//!   predicates both apply
//! - Trusted: `find_by_patient_id_internal` / `update_status_internal`;
//!   tenant predicate and state machine apply, role predicate does not

pub mod claim;
pub mod reference;
pub mod validation;
pub mod query;
pub mod numbering;
pub mod ports;
pub mod gateway;
pub mod error;

pub use claim::{Actor, Claim, ClaimStatus, NewClaim, StatusChange};
pub use reference::{Patient, Provider};
pub use query::{ClaimFilter, ClaimQuery, ClaimSort, Page, Pagination, SortDirection, SortField};
pub use numbering::{ClaimNumberGenerator, YearlyClaimNumbers};
pub use ports::{ClaimMutation, ClaimStore, ModifyOutcome, ReferenceStore};
pub use gateway::{
    BulkFailure, BulkUpdateResult, ClaimGateway, CreateClaim, InternalTransition, StatusUpdate,
};
pub use error::ClaimError;
