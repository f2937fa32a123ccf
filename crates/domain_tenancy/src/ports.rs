//! Tenancy Domain Ports
//!
//! - `UserDirectory`: live reads of organizations and users, used to build
//!   the access context on every request
//! - `CredentialVerifier`: turns a caller credential into a verified
//!   identity (the token mechanics live in the outer layer)

use async_trait::async_trait;

use core_kernel::{DomainPort, OrganizationId, PortError, UserId};

use crate::context::VerifiedIdentity;
use crate::error::AccessError;
use crate::organization::Organization;
use crate::user::User;

/// Read access to organizations and users
#[async_trait]
pub trait UserDirectory: DomainPort {
    /// Retrieves an organization by id
    async fn find_organization(
        &self,
        id: OrganizationId,
    ) -> Result<Option<Organization>, PortError>;

    /// Retrieves a user within an organization
    ///
    /// A user id that exists under a different organization is reported as
    /// `None`.
    async fn find_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<User>, PortError>;
}

/// Verifies caller credentials
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AccessError>;
}

/// In-memory implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::ClaimId;
    use crate::user::AssignedClaims;

    /// In-memory user directory
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryUserDirectory {
        organizations: Arc<RwLock<HashMap<OrganizationId, Organization>>>,
        users: Arc<RwLock<HashMap<UserId, User>>>,
    }

    impl InMemoryUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_organization(&self, organization: Organization) {
            self.organizations
                .write()
                .await
                .insert(organization.id, organization);
        }

        pub async fn insert_user(&self, user: User) {
            self.users.write().await.insert(user.id, user);
        }

        /// Replaces a user's assignment set, as an admin reassignment would
        pub async fn set_assignments(
            &self,
            user_id: UserId,
            claim_ids: Vec<ClaimId>,
        ) -> Result<(), AccessError> {
            let assigned = AssignedClaims::try_from_ids(claim_ids)?;
            let mut users = self.users.write().await;
            let user = users
                .get_mut(&user_id)
                .ok_or_else(|| AccessError::unauthorized("unknown user"))?;
            user.assigned_claim_ids = assigned;
            Ok(())
        }

        pub async fn deactivate_organization(&self, id: OrganizationId) {
            if let Some(organization) = self.organizations.write().await.get_mut(&id) {
                organization.is_active = false;
            }
        }
    }

    impl DomainPort for InMemoryUserDirectory {}

    #[async_trait]
    impl UserDirectory for InMemoryUserDirectory {
        async fn find_organization(
            &self,
            id: OrganizationId,
        ) -> Result<Option<Organization>, PortError> {
            Ok(self.organizations.read().await.get(&id).cloned())
        }

        async fn find_user(
            &self,
            organization_id: OrganizationId,
            user_id: UserId,
        ) -> Result<Option<User>, PortError> {
            Ok(self
                .users
                .read()
                .await
                .get(&user_id)
                .filter(|user| user.organization_id == organization_id)
                .cloned())
        }
    }

    /// Verifier that accepts identities registered under a token string
    #[derive(Debug, Default)]
    pub struct StaticCredentialVerifier {
        identities: std::sync::RwLock<HashMap<String, VerifiedIdentity>>,
    }

    impl StaticCredentialVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register(&self, token: impl Into<String>, identity: VerifiedIdentity) {
            if let Ok(mut identities) = self.identities.write() {
                identities.insert(token.into(), identity);
            }
        }
    }

    impl CredentialVerifier for StaticCredentialVerifier {
        fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AccessError> {
            self.identities
                .read()
                .map_err(|_| AccessError::unauthorized("verifier unavailable"))?
                .get(credential)
                .cloned()
                .ok_or_else(|| AccessError::unauthorized("invalid credential"))
        }
    }
}
