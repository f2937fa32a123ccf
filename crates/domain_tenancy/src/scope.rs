//! Data scope predicates
//!
//! A [`DataScope`] is the pair of predicates every storage operation must
//! apply: the tenant predicate (always) and the role predicate (derived from
//! the access context). Adapters render it into their query language; the
//! in-memory adapters evaluate it with [`DataScope::admits`].
//!
//! Every role whose scoping data is missing maps to [`RowPredicate::Nothing`].
//! An empty assignment list means zero access, never full access.

use std::collections::BTreeSet;

use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId};
use crate::context::{AccessContext, RoleScope};

/// Role-dependent row restriction applied on top of the tenant predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPredicate {
    /// Full organization visibility
    Unrestricted,
    /// Matches no row
    Nothing,
    /// Row's claim id must be in the set (never empty)
    ClaimIn(BTreeSet<ClaimId>),
    /// Row's provider must equal the given provider
    ProviderIs(ProviderId),
    /// Row's patient must equal the given patient
    PatientIs(PatientId),
}

/// Entities that can be filtered by a [`DataScope`]
pub trait ScopedEntity {
    fn organization_id(&self) -> OrganizationId;

    fn scoped_claim_id(&self) -> Option<ClaimId> {
        None
    }

    fn scoped_provider_id(&self) -> Option<ProviderId> {
        None
    }

    fn scoped_patient_id(&self) -> Option<PatientId> {
        None
    }
}

/// Tenant predicate plus role predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataScope {
    organization_id: OrganizationId,
    predicate: RowPredicate,
}

impl DataScope {
    /// Computes the scope for a caller
    pub fn for_context(context: &AccessContext) -> Self {
        let predicate = match context.scope() {
            RoleScope::Admin => RowPredicate::Unrestricted,
            RoleScope::ClaimsProcessor { assigned_claims } => {
                if assigned_claims.is_empty() {
                    RowPredicate::Nothing
                } else {
                    RowPredicate::ClaimIn(assigned_claims.as_set().clone())
                }
            }
            RoleScope::Provider { provider_id } => match provider_id {
                Some(id) => RowPredicate::ProviderIs(*id),
                None => RowPredicate::Nothing,
            },
            RoleScope::Patient { patient_id } => match patient_id {
                Some(id) => RowPredicate::PatientIs(*id),
                None => RowPredicate::Nothing,
            },
        };

        Self {
            organization_id: context.organization_id(),
            predicate,
        }
    }

    /// Organization-only scope for trusted background work
    pub fn organization(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            predicate: RowPredicate::Unrestricted,
        }
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn predicate(&self) -> &RowPredicate {
        &self.predicate
    }

    /// True when no row can ever match
    pub fn matches_nothing(&self) -> bool {
        match &self.predicate {
            RowPredicate::Nothing => true,
            RowPredicate::ClaimIn(ids) => ids.is_empty(),
            _ => false,
        }
    }

    /// Evaluates both predicates against an entity
    pub fn admits<E: ScopedEntity + ?Sized>(&self, entity: &E) -> bool {
        if entity.organization_id() != self.organization_id {
            return false;
        }
        match &self.predicate {
            RowPredicate::Unrestricted => true,
            RowPredicate::Nothing => false,
            RowPredicate::ClaimIn(ids) => entity
                .scoped_claim_id()
                .map(|id| ids.contains(&id))
                .unwrap_or(false),
            RowPredicate::ProviderIs(provider_id) => {
                entity.scoped_provider_id() == Some(*provider_id)
            }
            RowPredicate::PatientIs(patient_id) => entity.scoped_patient_id() == Some(*patient_id),
        }
    }
}
