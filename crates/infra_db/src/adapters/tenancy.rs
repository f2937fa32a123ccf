//! PostgreSQL user directory

use async_trait::async_trait;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, HealthReport, HealthCheckable, OrganizationId, PortError, UserId};
use domain_tenancy::{Organization, User, UserDirectory};

use crate::error::{port_error, DatabaseError};
use crate::health;
use crate::pool::DatabasePool;
use crate::rows::{OrganizationRow, UserRow, ORGANIZATION_COLUMNS, USER_COLUMNS};

/// Reads organizations and users on every request
///
/// Nothing is cached: a processor's assignment set is read fresh each time
/// an access context is established.
#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: DatabasePool,
}

impl PostgresUserDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Shared by the user directory and the reference store
pub(crate) async fn fetch_organization(
    pool: &DatabasePool,
    id: OrganizationId,
) -> Result<Option<Organization>, PortError> {
    let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1");
    let row = sqlx::query_as::<_, OrganizationRow>(&sql)
        .bind(id.into_uuid())
        .fetch_optional(pool)
        .await
        .map_err(port_error)?;
    Ok(row.map(Organization::from))
}

impl DomainPort for PostgresUserDirectory {}

#[async_trait]
impl HealthCheckable for PostgresUserDirectory {
    async fn health_check(&self) -> HealthReport {
        health::ping(&self.pool, "postgres-user-directory").await
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    #[instrument(skip(self), fields(organization_id = %id))]
    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, PortError> {
        fetch_organization(&self.pool, id).await
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %user_id))]
    async fn find_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<User>, PortError> {
        debug!("loading user with live assignments");
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND organization_id = $2");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id.into_uuid())
            .bind(organization_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;

        row.map(User::try_from)
            .transpose()
            .map_err(|err: DatabaseError| err.into())
    }
}
