//! Claims Domain Ports
//!
//! - `ClaimStore`: scoped reads and the transactional read-modify-write
//!   primitive for claims
//! - `ReferenceStore`: tenant-scoped lookups of organizations, providers and
//!   patients
//!
//! Every claim read and write takes a [`DataScope`]. Adapters must apply both
//! its tenant predicate and its role predicate; there is no unscoped variant.

use async_trait::async_trait;
use rust_decimal::Decimal;

use core_kernel::{ClaimId, DomainPort, OrganizationId, PatientId, PortError, ProviderId};
use domain_tenancy::{DataScope, Organization};

use crate::claim::Claim;
use crate::error::ClaimError;
use crate::query::{ClaimFilter, ClaimQuery};
use crate::reference::{Patient, Provider};

/// Mutation applied to the current row inside the store's transaction
pub type ClaimMutation = Box<dyn FnOnce(&mut Claim) -> Result<(), ClaimError> + Send>;

/// Result of [`ClaimStore::modify_claim`]
#[derive(Debug)]
pub enum ModifyOutcome {
    /// The mutation ran and the new row was persisted
    Updated(Claim),
    /// No row matched the id under the scope
    NotFound,
    /// The mutation refused the change; nothing was written
    Rejected(ClaimError),
}

/// Storage for claims
#[async_trait]
pub trait ClaimStore: DomainPort {
    async fn find_claim(&self, scope: &DataScope, id: ClaimId) -> Result<Option<Claim>, PortError>;

    async fn find_claims(&self, scope: &DataScope, query: &ClaimQuery) -> Result<Vec<Claim>, PortError>;

    async fn count_claims(&self, scope: &DataScope, filter: &ClaimFilter) -> Result<u64, PortError>;

    async fn sum_claim_amounts(
        &self,
        scope: &DataScope,
        filter: &ClaimFilter,
    ) -> Result<Decimal, PortError>;

    /// Inserts a new claim
    ///
    /// Returns `PortError::Conflict` when the claim number is already used
    /// in the organization.
    async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError>;

    /// Reads the row under `scope`, applies `mutation`, and persists the
    /// result atomically
    ///
    /// The row stays locked for the duration, so concurrent modifications
    /// of one claim are serialized. When the mutation returns an error,
    /// nothing is written.
    async fn modify_claim(
        &self,
        scope: &DataScope,
        id: ClaimId,
        mutation: ClaimMutation,
    ) -> Result<ModifyOutcome, PortError>;
}

/// Lookups of the entities claims refer to
#[async_trait]
pub trait ReferenceStore: DomainPort {
    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, PortError>;

    async fn find_provider(
        &self,
        organization_id: OrganizationId,
        id: ProviderId,
    ) -> Result<Option<Provider>, PortError>;

    async fn find_patient(
        &self,
        organization_id: OrganizationId,
        id: PatientId,
    ) -> Result<Option<Patient>, PortError>;
}

/// In-memory implementations for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::RwLock;

    /// In-memory claim store with call counting and failure injection
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryClaimStore {
        claims: Arc<RwLock<HashMap<ClaimId, Claim>>>,
        modify_calls: Arc<AtomicUsize>,
        fail_after: Arc<Mutex<Option<usize>>>,
    }

    impl InMemoryClaimStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores a claim directly, bypassing uniqueness checks
        pub async fn seed(&self, claim: Claim) {
            self.claims.write().await.insert(claim.id, claim);
        }

        /// Reads a claim without any scope, for assertions
        pub async fn get(&self, id: ClaimId) -> Option<Claim> {
            self.claims.read().await.get(&id).cloned()
        }

        pub async fn len(&self) -> usize {
            self.claims.read().await.len()
        }

        /// Number of `modify_claim` calls so far, including failed ones
        pub fn modify_calls(&self) -> usize {
            self.modify_calls.load(Ordering::SeqCst)
        }

        /// Lets the next `successes` modifications through, then fails one
        pub fn fail_modifications_after(&self, successes: usize) {
            if let Ok(mut fail_after) = self.fail_after.lock() {
                *fail_after = Some(successes);
            }
        }

        fn take_injected_failure(&self) -> Result<(), PortError> {
            let mut fail_after = self
                .fail_after
                .lock()
                .map_err(|_| PortError::internal("failure injector poisoned"))?;
            match *fail_after {
                Some(0) => {
                    *fail_after = None;
                    Err(PortError::connection("injected claim store failure"))
                }
                Some(remaining) => {
                    *fail_after = Some(remaining - 1);
                    Ok(())
                }
                None => Ok(()),
            }
        }

        async fn matching(&self, scope: &DataScope, filter: &ClaimFilter) -> Vec<Claim> {
            self.claims
                .read()
                .await
                .values()
                .filter(|claim| scope.admits(*claim) && filter.matches(claim))
                .cloned()
                .collect()
        }
    }

    impl DomainPort for InMemoryClaimStore {}

    #[async_trait]
    impl ClaimStore for InMemoryClaimStore {
        async fn find_claim(&self, scope: &DataScope, id: ClaimId) -> Result<Option<Claim>, PortError> {
            Ok(self
                .claims
                .read()
                .await
                .get(&id)
                .filter(|claim| scope.admits(*claim))
                .cloned())
        }

        async fn find_claims(&self, scope: &DataScope, query: &ClaimQuery) -> Result<Vec<Claim>, PortError> {
            Ok(query.apply(self.matching(scope, &query.filter).await))
        }

        async fn count_claims(&self, scope: &DataScope, filter: &ClaimFilter) -> Result<u64, PortError> {
            Ok(self.matching(scope, filter).await.len() as u64)
        }

        async fn sum_claim_amounts(
            &self,
            scope: &DataScope,
            filter: &ClaimFilter,
        ) -> Result<Decimal, PortError> {
            Ok(self
                .matching(scope, filter)
                .await
                .iter()
                .map(|claim| claim.amount)
                .sum())
        }

        async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError> {
            let mut claims = self.claims.write().await;
            let taken = claims.values().any(|existing| {
                existing.organization_id == claim.organization_id
                    && existing.claim_number == claim.claim_number
            });
            if taken {
                return Err(PortError::conflict(format!(
                    "claim number {} already exists",
                    claim.claim_number
                )));
            }
            claims.insert(claim.id, claim.clone());
            Ok(())
        }

        async fn modify_claim(
            &self,
            scope: &DataScope,
            id: ClaimId,
            mutation: ClaimMutation,
        ) -> Result<ModifyOutcome, PortError> {
            self.modify_calls.fetch_add(1, Ordering::SeqCst);
            self.take_injected_failure()?;

            let mut claims = self.claims.write().await;
            let Some(current) = claims.get(&id).filter(|claim| scope.admits(*claim)) else {
                return Ok(ModifyOutcome::NotFound);
            };

            let mut next = current.clone();
            match mutation(&mut next) {
                Ok(()) => {
                    claims.insert(id, next.clone());
                    Ok(ModifyOutcome::Updated(next))
                }
                Err(err) => Ok(ModifyOutcome::Rejected(err)),
            }
        }
    }

    /// In-memory organizations, providers and patients
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryReferenceStore {
        organizations: Arc<RwLock<HashMap<OrganizationId, Organization>>>,
        providers: Arc<RwLock<HashMap<ProviderId, Provider>>>,
        patients: Arc<RwLock<HashMap<PatientId, Patient>>>,
        provider_lookups: Arc<AtomicUsize>,
    }

    impl InMemoryReferenceStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_organization(&self, organization: Organization) {
            self.organizations
                .write()
                .await
                .insert(organization.id, organization);
        }

        pub async fn insert_provider(&self, provider: Provider) {
            self.providers.write().await.insert(provider.id, provider);
        }

        pub async fn insert_patient(&self, patient: Patient) {
            self.patients.write().await.insert(patient.id, patient);
        }

        pub async fn deactivate_organization(&self, id: OrganizationId) {
            if let Some(organization) = self.organizations.write().await.get_mut(&id) {
                organization.is_active = false;
            }
        }

        /// Number of provider lookups so far
        pub fn provider_lookups(&self) -> usize {
            self.provider_lookups.load(Ordering::SeqCst)
        }
    }

    impl DomainPort for InMemoryReferenceStore {}

    #[async_trait]
    impl ReferenceStore for InMemoryReferenceStore {
        async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, PortError> {
            Ok(self.organizations.read().await.get(&id).cloned())
        }

        async fn find_provider(
            &self,
            organization_id: OrganizationId,
            id: ProviderId,
        ) -> Result<Option<Provider>, PortError> {
            self.provider_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .providers
                .read()
                .await
                .get(&id)
                .filter(|provider| provider.organization_id == organization_id)
                .cloned())
        }

        async fn find_patient(
            &self,
            organization_id: OrganizationId,
            id: PatientId,
        ) -> Result<Option<Patient>, PortError> {
            Ok(self
                .patients
                .read()
                .await
                .get(&id)
                .filter(|patient| patient.organization_id == organization_id)
                .cloned())
        }
    }
}
