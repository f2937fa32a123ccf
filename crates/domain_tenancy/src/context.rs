//! Access context
//!
//! The access context is the only source of tenant and role information for
//! everything downstream of authentication. It is built once per request or
//! job, never mutated, and passed explicitly into every gateway call.
//!
//! Scoping data comes from two places: the verified credential supplies the
//! identity, and a fresh directory read supplies the processor's current
//! assignment set. Assignments change independently of credential issuance,
//! so they are never taken from the credential itself.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId, UserId};
use crate::error::AccessError;
use crate::ports::UserDirectory;
use crate::user::{AssignedClaims, Role};

/// Identity claims produced by the credential verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: Role,
    pub provider_id: Option<ProviderId>,
    pub patient_id: Option<PatientId>,
}

/// Role together with exactly the scoping data that role needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    Admin,
    ClaimsProcessor { assigned_claims: AssignedClaims },
    Provider { provider_id: Option<ProviderId> },
    Patient { patient_id: Option<PatientId> },
}

impl RoleScope {
    pub fn role(&self) -> Role {
        match self {
            RoleScope::Admin => Role::Admin,
            RoleScope::ClaimsProcessor { .. } => Role::ClaimsProcessor,
            RoleScope::Provider { .. } => Role::Provider,
            RoleScope::Patient { .. } => Role::Patient,
        }
    }
}

/// Immutable description of who is calling and what they may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    organization_id: OrganizationId,
    user_id: UserId,
    scope: RoleScope,
}

impl AccessContext {
    /// Creates a context from already-trusted parts
    pub fn new(organization_id: OrganizationId, user_id: UserId, scope: RoleScope) -> Self {
        Self {
            organization_id,
            user_id,
            scope,
        }
    }

    /// Builds the context for a verified identity
    ///
    /// # Errors
    ///
    /// * `Unauthorized` if the organization or user is unknown, the user is
    ///   inactive, or the credential's role no longer matches the account
    /// * `TenantAccessDenied` if the organization is deactivated
    pub async fn establish(
        identity: &VerifiedIdentity,
        directory: &dyn UserDirectory,
    ) -> Result<Self, AccessError> {
        let organization = directory
            .find_organization(identity.organization_id)
            .await?
            .ok_or_else(|| AccessError::unauthorized("unknown organization"))?;

        if !organization.is_active {
            warn!(organization_id = %organization.id, "request for inactive organization");
            return Err(AccessError::TenantAccessDenied(organization.id));
        }

        let user = directory
            .find_user(identity.organization_id, identity.user_id)
            .await?
            .ok_or_else(|| AccessError::unauthorized("unknown user"))?;

        if !user.is_active {
            return Err(AccessError::unauthorized("user is deactivated"));
        }
        if user.role != identity.role {
            warn!(
                user_id = %user.id,
                credential_role = %identity.role,
                account_role = %user.role,
                "credential role is stale"
            );
            return Err(AccessError::unauthorized("credential role does not match account"));
        }

        let scope = match identity.role {
            Role::Admin => RoleScope::Admin,
            Role::ClaimsProcessor => RoleScope::ClaimsProcessor {
                assigned_claims: user.assigned_claim_ids,
            },
            Role::Provider => RoleScope::Provider {
                provider_id: identity.provider_id,
            },
            Role::Patient => RoleScope::Patient {
                patient_id: identity.patient_id,
            },
        };

        debug!(
            organization_id = %identity.organization_id,
            user_id = %identity.user_id,
            role = %identity.role,
            "access context established"
        );

        Ok(Self::new(identity.organization_id, identity.user_id, scope))
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.scope.role()
    }

    pub fn scope(&self) -> &RoleScope {
        &self.scope
    }

    /// Assigned claim set; `None` for every role except claims processor
    pub fn assigned_claims(&self) -> Option<&AssignedClaims> {
        match &self.scope {
            RoleScope::ClaimsProcessor { assigned_claims } => Some(assigned_claims),
            _ => None,
        }
    }

    pub fn is_assigned(&self, claim_id: &ClaimId) -> bool {
        self.assigned_claims()
            .map(|assigned| assigned.contains(claim_id))
            .unwrap_or(false)
    }

    pub fn provider_id(&self) -> Option<ProviderId> {
        match &self.scope {
            RoleScope::Provider { provider_id } => *provider_id,
            _ => None,
        }
    }

    pub fn patient_id(&self) -> Option<PatientId> {
        match &self.scope {
            RoleScope::Patient { patient_id } => *patient_id,
            _ => None,
        }
    }
}
