//! In-memory test world
//!
//! Wires every domain port to its in-memory implementation the same way the
//! binaries wire them to PostgreSQL, so scenario tests run the real gateway,
//! event service, dispatcher, and worker pool without a database.

use std::sync::Arc;
use std::time::Duration;

use core_kernel::ClaimId;
use domain_claims::ports::mock::{InMemoryClaimStore, InMemoryReferenceStore};
use domain_claims::{Claim, ClaimGateway, ClaimStatus, Patient, Provider, YearlyClaimNumbers};
use domain_jobs::ledger::mock::InMemoryJobLedger;
use domain_jobs::ports::mock::InMemoryPatientEventStore;
use domain_jobs::queue::mock::InMemoryJobQueue;
use domain_jobs::{
    Dispatcher, JobError, JobOutcome, PatientEventService, RetryPolicy, WorkerPool, WorkerSettings,
};
use domain_tenancy::ports::mock::InMemoryUserDirectory;
use domain_tenancy::{AccessContext, AccessError, Organization, User, VerifiedIdentity};

use crate::builders::ClaimBuilder;
use crate::fixtures::{ReferenceFixtures, UserFixtures};

/// Upper bound on deliveries `drain` performs before giving up
const MAX_DRAIN_DELIVERIES: usize = 1_000;

/// One onboarded organization with a user per role
#[derive(Debug, Clone)]
pub struct Tenant {
    pub organization: Organization,
    pub provider: Provider,
    pub patient: Patient,
    pub admin: User,
    pub processor: User,
    pub provider_user: User,
    pub patient_user: User,
}

/// In-memory deployment shared by every tenant a test onboards
#[derive(Clone)]
pub struct TestWorld {
    pub directory: InMemoryUserDirectory,
    pub references: InMemoryReferenceStore,
    pub claims: InMemoryClaimStore,
    pub ledger: InMemoryJobLedger,
    pub events: InMemoryPatientEventStore,
    pub queue: InMemoryJobQueue,
    pub gateway: ClaimGateway,
    pub event_service: PatientEventService,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    /// World whose queue retries immediately under the default policy
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(policy: RetryPolicy) -> Self {
        let directory = InMemoryUserDirectory::new();
        let references = InMemoryReferenceStore::new();
        let claims = InMemoryClaimStore::new();
        let ledger = InMemoryJobLedger::new();
        let events = InMemoryPatientEventStore::new();
        let queue = InMemoryJobQueue::new(policy).without_delays();

        let gateway = ClaimGateway::new(
            Arc::new(claims.clone()),
            Arc::new(references.clone()),
            Arc::new(YearlyClaimNumbers),
        );
        let event_service = PatientEventService::new(
            Arc::new(events.clone()),
            Arc::new(references.clone()),
            Arc::new(queue.clone()),
        );

        Self {
            directory,
            references,
            claims,
            ledger,
            events,
            queue,
            gateway,
            event_service,
        }
    }

    /// Onboards an organization with one provider, one patient, and a user per role
    pub async fn onboard_tenant(&self) -> Tenant {
        let organization = ReferenceFixtures::organization();
        let provider = ReferenceFixtures::provider(organization.id);
        let patient = ReferenceFixtures::patient(organization.id);

        let tenant = Tenant {
            admin: UserFixtures::admin(organization.id),
            processor: UserFixtures::processor(organization.id),
            provider_user: UserFixtures::provider(organization.id, provider.id),
            patient_user: UserFixtures::patient(organization.id, patient.id),
            organization,
            provider,
            patient,
        };

        self.directory.insert_organization(tenant.organization.clone()).await;
        self.references.insert_organization(tenant.organization.clone()).await;
        self.references.insert_provider(tenant.provider.clone()).await;
        self.references.insert_patient(tenant.patient.clone()).await;
        for user in [
            &tenant.admin,
            &tenant.processor,
            &tenant.provider_user,
            &tenant.patient_user,
        ] {
            self.directory.insert_user(user.clone()).await;
        }
        tenant
    }

    /// Deactivates a tenant in every store that tracks organizations
    pub async fn deactivate(&self, tenant: &Tenant) {
        self.directory.deactivate_organization(tenant.organization.id).await;
        self.references.deactivate_organization(tenant.organization.id).await;
    }

    /// Establishes a context for `user` through the directory, as a request would
    pub async fn context_for(&self, user: &User) -> Result<AccessContext, AccessError> {
        AccessContext::establish(&identity_for(user), &self.directory).await
    }

    /// Replaces a processor's assignment set
    ///
    /// # Panics
    ///
    /// Panics if the user is unknown or the set is over the limit.
    pub async fn assign(&self, user: &User, claim_ids: &[ClaimId]) {
        self.directory
            .set_assignments(user.id, claim_ids.to_vec())
            .await
            .expect("assignment accepted");
    }

    /// Stores a claim for the tenant's patient and provider in `status`
    pub async fn seed_claim(&self, tenant: &Tenant, status: ClaimStatus) -> Claim {
        let claim = ClaimBuilder::new(tenant.organization.id, tenant.patient.id, tenant.provider.id)
            .submitted_by(tenant.provider_user.id)
            .with_status(status)
            .build();
        self.claims.seed(claim.clone()).await;
        claim
    }

    /// Current stored status, bypassing scoping
    pub async fn status_of(&self, id: ClaimId) -> Option<ClaimStatus> {
        self.claims.get(id).await.map(|claim| claim.status)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::standard(Arc::new(self.ledger.clone()), self.gateway.clone())
    }

    pub fn worker_pool(&self, settings: WorkerSettings) -> WorkerPool {
        WorkerPool::new(
            Arc::new(self.queue.clone()),
            Arc::new(self.events.clone()),
            self.dispatcher(),
            settings,
        )
    }

    /// Settings for pools driven in tests: fast polling, no pacing
    pub fn fast_settings() -> WorkerSettings {
        WorkerSettings {
            concurrency: 4,
            max_jobs_per_second: 1_000.0,
            poll_interval: Duration::from_millis(5),
        }
    }

    /// Delivers jobs one at a time until the queue has nothing due
    pub async fn drain(&self) -> Result<Vec<JobOutcome>, JobError> {
        let pool = self.worker_pool(Self::fast_settings());
        let mut outcomes = Vec::new();
        while outcomes.len() < MAX_DRAIN_DELIVERIES {
            match pool.run_once().await? {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        Ok(outcomes)
    }
}

/// The identity a credential for `user` would carry
pub fn identity_for(user: &User) -> VerifiedIdentity {
    VerifiedIdentity {
        user_id: user.id,
        organization_id: user.organization_id,
        role: user.role,
        provider_id: user.provider_id,
        patient_id: user.patient_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_tenancy::Role;

    #[tokio::test]
    async fn test_onboarded_users_establish_contexts() {
        let world = TestWorld::new();
        let tenant = world.onboard_tenant().await;

        let admin = world.context_for(&tenant.admin).await.unwrap();
        assert_eq!(admin.role(), Role::Admin);
        assert_eq!(admin.organization_id(), tenant.organization.id);

        let provider = world.context_for(&tenant.provider_user).await.unwrap();
        assert_eq!(provider.provider_id(), Some(tenant.provider.id));

        let patient = world.context_for(&tenant.patient_user).await.unwrap();
        assert_eq!(patient.patient_id(), Some(tenant.patient.id));
    }

    #[tokio::test]
    async fn test_assignments_reach_the_context() {
        let world = TestWorld::new();
        let tenant = world.onboard_tenant().await;
        let claim = world.seed_claim(&tenant, ClaimStatus::Submitted).await;

        world.assign(&tenant.processor, &[claim.id]).await;
        let context = world.context_for(&tenant.processor).await.unwrap();
        assert!(context.is_assigned(&claim.id));
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue() {
        let world = TestWorld::new();
        assert!(world.drain().await.unwrap().is_empty());
    }
}
