//! Infrastructure Database Layer
//!
//! PostgreSQL implementations of every domain port, using SQLx.
//!
//! # Architecture
//!
//! ```text
//! domain port trait  <-  adapters::*  ->  rows (FromRow + Db* enums)
//!                              |
//!                              +-> scope (DataScope / ClaimQuery -> SQL)
//! ```
//!
//! Tenant isolation is enforced in SQL: every read of a tenant table goes
//! through [`scope::push_scope`], and uniqueness that the domain depends on
//! (`(organization_id, claim_number)`, `(organization_id, idempotency_key)`)
//! is a database constraint surfaced as `PortError::Conflict`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresAdapters};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/claims")).await?;
//! run_migrations(&pool).await?;
//! let adapters = PostgresAdapters::new(pool, RetryPolicy::default());
//! ```

pub mod pool;
pub mod error;
pub mod rows;
pub mod scope;
pub mod health;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use health::PostgresHealth;
pub use adapters::{
    PostgresAdapters, PostgresClaimStore, PostgresJobLedger, PostgresJobQueue,
    PostgresPatientEventStore, PostgresReferenceStore, PostgresUserDirectory,
};
