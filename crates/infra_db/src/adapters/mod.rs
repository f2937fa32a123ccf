//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter:
//! - Implements one port trait
//! - Translates between domain models and the row types in [`crate::rows`]
//! - Renders [`DataScope`](domain_tenancy::DataScope) through
//!   [`crate::scope`] for every tenant read
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresAdapters;
//!
//! let adapters = PostgresAdapters::new(pool, RetryPolicy::default());
//! let gateway = ClaimGateway::new(adapters.claims(), adapters.references(), numbers);
//! ```

pub mod tenancy;
pub mod claims;
pub mod jobs;
pub mod queue;

pub use tenancy::PostgresUserDirectory;
pub use claims::{PostgresClaimStore, PostgresReferenceStore};
pub use jobs::{PostgresJobLedger, PostgresPatientEventStore};
pub use queue::PostgresJobQueue;

use std::sync::Arc;

use domain_claims::{ClaimStore, ReferenceStore};
use domain_jobs::{JobLedger, JobQueue, PatientEventStore, RetryPolicy};
use domain_tenancy::UserDirectory;

use crate::pool::DatabasePool;

/// Every adapter over one pool
#[derive(Debug, Clone)]
pub struct PostgresAdapters {
    pub users: PostgresUserDirectory,
    pub claims: PostgresClaimStore,
    pub references: PostgresReferenceStore,
    pub ledger: PostgresJobLedger,
    pub events: PostgresPatientEventStore,
    pub queue: PostgresJobQueue,
}

impl PostgresAdapters {
    pub fn new(pool: DatabasePool, retry_policy: RetryPolicy) -> Self {
        Self {
            users: PostgresUserDirectory::new(pool.clone()),
            claims: PostgresClaimStore::new(pool.clone()),
            references: PostgresReferenceStore::new(pool.clone()),
            ledger: PostgresJobLedger::new(pool.clone()),
            events: PostgresPatientEventStore::new(pool.clone()),
            queue: PostgresJobQueue::new(pool, retry_policy),
        }
    }

    pub fn user_directory(&self) -> Arc<dyn UserDirectory> {
        Arc::new(self.users.clone())
    }

    pub fn claims(&self) -> Arc<dyn ClaimStore> {
        Arc::new(self.claims.clone())
    }

    pub fn references(&self) -> Arc<dyn ReferenceStore> {
        Arc::new(self.references.clone())
    }

    pub fn ledger(&self) -> Arc<dyn JobLedger> {
        Arc::new(self.ledger.clone())
    }

    pub fn events(&self) -> Arc<dyn PatientEventStore> {
        Arc::new(self.events.clone())
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::new(self.queue.clone())
    }
}
