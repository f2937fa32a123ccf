//! Test Utilities Crate
//!
//! Shared test infrastructure for the claims platform.
//!
//! # Modules
//!
//! - `world`: A fully wired in-memory deployment with one seeded tenant
//! - `fixtures`: Pre-built reference data and contexts
//! - `builders`: Builder patterns for claims, users, and job payloads
//! - `database`: PostgreSQL test container management
//! - `assertions`: Assertion helpers for error kinds and claim history
//! - `generators`: Property-based test data generators

pub mod world;
pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use world::*;
pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
