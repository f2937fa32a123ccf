//! Users, roles, and claim assignments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId, UserId};
use crate::error::AccessError;

/// Upper bound on claims assigned to one processor.
///
/// Assignment is a denormalized list read on every request, so the design
/// assumes hundreds of entries per processor, never millions.
pub const MAX_ASSIGNED_CLAIMS: usize = 1_000;

/// Caller role; determines default data visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ClaimsProcessor,
    Provider,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ClaimsProcessor => "claims_processor",
            Role::Provider => "provider",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "claims_processor" => Ok(Role::ClaimsProcessor),
            "provider" => Ok(Role::Provider),
            "patient" => Ok(Role::Patient),
            other => Err(AccessError::UnknownRole(other.to_string())),
        }
    }
}

/// Bounded set of claim ids a processor may see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClaimId>", into = "Vec<ClaimId>")]
pub struct AssignedClaims(BTreeSet<ClaimId>);

impl AssignedClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set, collapsing duplicates and enforcing the size bound
    pub fn try_from_ids(ids: impl IntoIterator<Item = ClaimId>) -> Result<Self, AccessError> {
        let set: BTreeSet<ClaimId> = ids.into_iter().collect();
        if set.len() > MAX_ASSIGNED_CLAIMS {
            return Err(AccessError::AssignmentLimitExceeded {
                count: set.len(),
                max: MAX_ASSIGNED_CLAIMS,
            });
        }
        Ok(Self(set))
    }

    /// Adds a claim; returns false if it was already assigned
    pub fn assign(&mut self, claim_id: ClaimId) -> Result<bool, AccessError> {
        if !self.0.contains(&claim_id) && self.0.len() >= MAX_ASSIGNED_CLAIMS {
            return Err(AccessError::AssignmentLimitExceeded {
                count: self.0.len() + 1,
                max: MAX_ASSIGNED_CLAIMS,
            });
        }
        Ok(self.0.insert(claim_id))
    }

    pub fn unassign(&mut self, claim_id: &ClaimId) -> bool {
        self.0.remove(claim_id)
    }

    pub fn contains(&self, claim_id: &ClaimId) -> bool {
        self.0.contains(claim_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClaimId> {
        self.0.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<ClaimId> {
        &self.0
    }
}

impl TryFrom<Vec<ClaimId>> for AssignedClaims {
    type Error = AccessError;

    fn try_from(ids: Vec<ClaimId>) -> Result<Self, Self::Error> {
        Self::try_from_ids(ids)
    }
}

impl From<AssignedClaims> for Vec<ClaimId> {
    fn from(assigned: AssignedClaims) -> Self {
        assigned.0.into_iter().collect()
    }
}

/// A user account within one organization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub provider_id: Option<ProviderId>,
    pub patient_id: Option<PatientId>,
    pub assigned_claim_ids: AssignedClaims,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates an active user with no scoping data
    pub fn new(
        organization_id: OrganizationId,
        email: impl Into<String>,
        name: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new_v7(),
            organization_id,
            email: email.into(),
            name: name.into(),
            role,
            provider_id: None,
            patient_id: None,
            assigned_claim_ids: AssignedClaims::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_role_parsing_fails_closed() {
        assert_eq!("claims_processor".parse::<Role>().unwrap(), Role::ClaimsProcessor);
        assert!("superuser".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_matches_as_str() {
        for role in [Role::Admin, Role::ClaimsProcessor, Role::Provider, Role::Patient] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn test_assigned_claims_deduplicates() {
        let id = ClaimId::new();
        let assigned = AssignedClaims::try_from_ids([id, id, id]).unwrap();
        assert_eq!(assigned.len(), 1);
        assert!(assigned.contains(&id));
    }

    #[test]
    fn test_assigned_claims_enforces_bound() {
        let ids: Vec<ClaimId> = (0..=MAX_ASSIGNED_CLAIMS).map(|_| ClaimId::new()).collect();
        let result = AssignedClaims::try_from_ids(ids);
        assert!(matches!(result, Err(AccessError::AssignmentLimitExceeded { .. })));
    }

    #[test]
    fn test_assign_at_capacity() {
        let ids: Vec<ClaimId> = (0..MAX_ASSIGNED_CLAIMS).map(|_| ClaimId::new()).collect();
        let existing = ids[0];
        let mut assigned = AssignedClaims::try_from_ids(ids).unwrap();

        assert!(!assigned.assign(existing).unwrap());
        assert!(assigned.assign(ClaimId::new()).is_err());
        assert!(assigned.unassign(&existing));
        assert!(assigned.assign(ClaimId::new()).unwrap());
    }

    #[test]
    fn test_oversized_json_list_is_rejected() {
        let ids: Vec<ClaimId> = (0..=MAX_ASSIGNED_CLAIMS).map(|_| ClaimId::new()).collect();
        let json = serde_json::to_string(&ids).unwrap();
        assert!(serde_json::from_str::<AssignedClaims>(&json).is_err());
    }

    proptest! {
        #[test]
        fn prop_assignment_set_never_exceeds_bound(count in 0usize..1_200) {
            let ids: Vec<ClaimId> = (0..count).map(|_| ClaimId::new()).collect();
            match AssignedClaims::try_from_ids(ids) {
                Ok(assigned) => prop_assert!(assigned.len() <= MAX_ASSIGNED_CLAIMS),
                Err(_) => prop_assert!(count > MAX_ASSIGNED_CLAIMS),
            }
        }
    }
}
