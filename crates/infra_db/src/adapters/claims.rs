//! PostgreSQL claim and reference stores
//!
//! `modify_claim` is the per-claim unit of atomicity: the row is read with
//! `SELECT ... FOR UPDATE` inside a transaction, the domain mutation runs
//! against it, and the result is written back before commit. Two concurrent
//! updates of the same claim therefore never interleave their history
//! appends.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, instrument};

use core_kernel::{
    ClaimId, DomainPort, HealthReport, HealthCheckable, OrganizationId, PatientId, PortError,
    ProviderId,
};
use domain_claims::{
    Claim, ClaimFilter, ClaimMutation, ClaimQuery, ClaimStore, ModifyOutcome, Patient, Provider,
    ReferenceStore,
};
use domain_tenancy::{DataScope, Organization};

use crate::adapters::tenancy::fetch_organization;
use crate::error::port_error;
use crate::health;
use crate::pool::DatabasePool;
use crate::rows::{
    ClaimRow, DbClaimStatus, PatientRow, ProviderRow, CLAIM_COLUMNS, PATIENT_COLUMNS,
    PROVIDER_COLUMNS,
};
use crate::scope::{push_claim_filter, push_claim_order, push_scope, ScopeColumns};

/// Writes back a mutated claim; `$10` pins the row to the caller's tenant
const UPDATE_CLAIM: &str = "UPDATE claims SET status = $2, assigned_processor_id = $3, \
     denial_reason = $4, notes = $5, status_history = $6, processed_at = $7, paid_at = $8, \
     updated_at = $9 WHERE id = $1 AND organization_id = $10";

#[derive(Debug, Clone)]
pub struct PostgresClaimStore {
    pool: DatabasePool,
}

impl PostgresClaimStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn scoped<'a>(prefix: &str, scope: &DataScope, filter: &ClaimFilter) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(prefix);
        builder.push(" WHERE ");
        push_scope(&mut builder, scope, ScopeColumns::CLAIMS);
        push_claim_filter(&mut builder, filter);
        builder
    }
}

impl DomainPort for PostgresClaimStore {}

#[async_trait]
impl HealthCheckable for PostgresClaimStore {
    async fn health_check(&self) -> HealthReport {
        health::ping(&self.pool, "postgres-claim-store").await
    }
}

#[async_trait]
impl ClaimStore for PostgresClaimStore {
    #[instrument(skip(self, scope), fields(claim_id = %id))]
    async fn find_claim(&self, scope: &DataScope, id: ClaimId) -> Result<Option<Claim>, PortError> {
        let mut builder = QueryBuilder::new(format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = "));
        builder.push_bind(id.into_uuid()).push(" AND ");
        push_scope(&mut builder, scope, ScopeColumns::CLAIMS);

        let row = builder
            .build_query_as::<ClaimRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(row.map(Claim::from))
    }

    #[instrument(skip(self, scope, query))]
    async fn find_claims(&self, scope: &DataScope, query: &ClaimQuery) -> Result<Vec<Claim>, PortError> {
        let mut builder = Self::scoped(
            &format!("SELECT {CLAIM_COLUMNS} FROM claims"),
            scope,
            &query.filter,
        );
        push_claim_order(&mut builder, query.sort);
        if let Some(pagination) = query.pagination {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(pagination.limit()).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<ClaimRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;
        debug!(count = rows.len(), "claims loaded");
        Ok(rows.into_iter().map(Claim::from).collect())
    }

    async fn count_claims(&self, scope: &DataScope, filter: &ClaimFilter) -> Result<u64, PortError> {
        let count: i64 = Self::scoped("SELECT COUNT(*) FROM claims", scope, filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn sum_claim_amounts(&self, scope: &DataScope, filter: &ClaimFilter) -> Result<Decimal, PortError> {
        Self::scoped("SELECT COALESCE(SUM(amount), 0) FROM claims", scope, filter)
            .build_query_scalar::<Decimal>()
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)
    }

    #[instrument(skip(self, claim), fields(claim_id = %claim.id, claim_number = %claim.claim_number))]
    async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError> {
        let sql = format!(
            "INSERT INTO claims ({CLAIM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        );
        sqlx::query(&sql)
            .bind(claim.id.into_uuid())
            .bind(&claim.claim_number)
            .bind(claim.organization_id.into_uuid())
            .bind(claim.patient_id.into_uuid())
            .bind(claim.provider_id.into_uuid())
            .bind(&claim.diagnosis_code)
            .bind(claim.amount)
            .bind(DbClaimStatus::from(claim.status))
            .bind(claim.service_date)
            .bind(claim.assigned_processor_id.map(|id| id.into_uuid()))
            .bind(&claim.denial_reason)
            .bind(&claim.notes)
            .bind(Json(&claim.status_history))
            .bind(claim.submitted_by.into_uuid())
            .bind(claim.processed_at)
            .bind(claim.paid_at)
            .bind(claim.created_at)
            .bind(claim.updated_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    #[instrument(skip(self, scope, mutation), fields(claim_id = %id))]
    async fn modify_claim(
        &self,
        scope: &DataScope,
        id: ClaimId,
        mutation: ClaimMutation,
    ) -> Result<ModifyOutcome, PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let mut builder = QueryBuilder::new(format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = "));
        builder.push_bind(id.into_uuid()).push(" AND ");
        push_scope(&mut builder, scope, ScopeColumns::CLAIMS);
        builder.push(" FOR UPDATE");

        let row = builder
            .build_query_as::<ClaimRow>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(port_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(port_error)?;
            return Ok(ModifyOutcome::NotFound);
        };

        let mut claim = Claim::from(row);
        if let Err(err) = mutation(&mut claim) {
            tx.rollback().await.map_err(port_error)?;
            debug!(error = %err, "mutation refused");
            return Ok(ModifyOutcome::Rejected(err));
        }

        let updated = sqlx::query(UPDATE_CLAIM)
            .bind(claim.id.into_uuid())
            .bind(DbClaimStatus::from(claim.status))
            .bind(claim.assigned_processor_id.map(|id| id.into_uuid()))
            .bind(&claim.denial_reason)
            .bind(&claim.notes)
            .bind(Json(&claim.status_history))
            .bind(claim.processed_at)
            .bind(claim.paid_at)
            .bind(claim.updated_at)
            .bind(scope.organization_id().into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(port_error)?;

        if updated.rows_affected() != 1 {
            tx.rollback().await.map_err(port_error)?;
            return Ok(ModifyOutcome::NotFound);
        }

        tx.commit().await.map_err(port_error)?;
        Ok(ModifyOutcome::Updated(claim))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresReferenceStore {
    pool: DatabasePool,
}

impl PostgresReferenceStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresReferenceStore {}

#[async_trait]
impl ReferenceStore for PostgresReferenceStore {
    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, PortError> {
        fetch_organization(&self.pool, id).await
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, provider_id = %id))]
    async fn find_provider(
        &self,
        organization_id: OrganizationId,
        id: ProviderId,
    ) -> Result<Option<Provider>, PortError> {
        let sql = format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1 AND organization_id = $2");
        let row = sqlx::query_as::<_, ProviderRow>(&sql)
            .bind(id.into_uuid())
            .bind(organization_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(row.map(Provider::from))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, patient_id = %id))]
    async fn find_patient(
        &self,
        organization_id: OrganizationId,
        id: PatientId,
    ) -> Result<Option<Patient>, PortError> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1 AND organization_id = $2");
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(id.into_uuid())
            .bind(organization_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(row.map(Patient::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_update_is_pinned_to_the_tenant() {
        let predicate = UPDATE_CLAIM.split(" WHERE ").nth(1).unwrap();
        assert_eq!(predicate, "id = $1 AND organization_id = $10");
        assert_eq!(UPDATE_CLAIM.matches('$').count(), 10);
    }
}
