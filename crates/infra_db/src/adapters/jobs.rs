//! PostgreSQL job ledger and patient event store
//!
//! Ledger state changes are applied with the domain's own
//! [`JobProcessingLog`] methods against a row locked `FOR UPDATE`, so the
//! "completed entries are never rewritten" rule has one implementation.

use async_trait::async_trait;
use sqlx::QueryBuilder;
use tracing::{debug, instrument};

use core_kernel::{
    DomainPort, HealthReport, HealthCheckable, JobId, JobLogId, OrganizationId, PatientEventId,
    PortError,
};
use domain_jobs::{JobLedger, JobProcessingLog, JobStatus, PatientEventStore, PatientStatusEvent};
use domain_tenancy::DataScope;

use crate::error::{port_error, DatabaseError};
use crate::health;
use crate::pool::DatabasePool;
use crate::rows::{
    to_db_count, DbJobStatus, DbPatientEventType, JobLogRow, PatientEventRow, EVENT_COLUMNS,
    JOB_LOG_COLUMNS,
};
use crate::scope::{push_scope, ScopeColumns};

#[derive(Debug, Clone)]
pub struct PostgresJobLedger {
    pool: DatabasePool,
}

impl PostgresJobLedger {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Locks the entry, applies `change`, and writes the result back
    async fn modify_entry<F>(&self, id: JobLogId, change: F) -> Result<JobProcessingLog, PortError>
    where
        F: FnOnce(&mut JobProcessingLog) -> Result<(), PortError> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let sql = format!("SELECT {JOB_LOG_COLUMNS} FROM job_processing_logs WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, JobLogRow>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(port_error)?
            .ok_or_else(|| PortError::not_found("JobProcessingLog", id))?;

        let mut entry = JobProcessingLog::try_from(row).map_err(PortError::from)?;
        change(&mut entry)?;

        sqlx::query(
            "UPDATE job_processing_logs SET status = $2, result = $3, error_message = $4, \
             retry_count = $5, updated_at = $6, completed_at = $7 WHERE id = $1",
        )
        .bind(entry.id.into_uuid())
        .bind(DbJobStatus::from(entry.status))
        .bind(&entry.result)
        .bind(&entry.error_message)
        .bind(to_db_count(entry.retry_count))
        .bind(entry.updated_at)
        .bind(entry.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(port_error)?;

        tx.commit().await.map_err(port_error)?;
        Ok(entry)
    }
}

impl DomainPort for PostgresJobLedger {}

#[async_trait]
impl HealthCheckable for PostgresJobLedger {
    async fn health_check(&self) -> HealthReport {
        health::ping(&self.pool, "postgres-job-ledger").await
    }
}

#[async_trait]
impl JobLedger for PostgresJobLedger {
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn find_by_idempotency_key(
        &self,
        organization_id: OrganizationId,
        idempotency_key: &str,
    ) -> Result<Option<JobProcessingLog>, PortError> {
        let sql = format!(
            "SELECT {JOB_LOG_COLUMNS} FROM job_processing_logs \
             WHERE organization_id = $1 AND idempotency_key = $2"
        );
        let row = sqlx::query_as::<_, JobLogRow>(&sql)
            .bind(organization_id.into_uuid())
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;

        row.map(JobProcessingLog::try_from)
            .transpose()
            .map_err(|err: DatabaseError| err.into())
    }

    #[instrument(skip(self, entry), fields(idempotency_key = %entry.idempotency_key))]
    async fn create(&self, entry: &JobProcessingLog) -> Result<(), PortError> {
        let sql = format!(
            "INSERT INTO job_processing_logs ({JOB_LOG_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(entry.id.into_uuid())
            .bind(entry.organization_id.into_uuid())
            .bind(&entry.idempotency_key)
            .bind(DbPatientEventType::from(entry.job_type))
            .bind(DbJobStatus::from(entry.status))
            .bind(&entry.payload)
            .bind(&entry.result)
            .bind(&entry.error_message)
            .bind(to_db_count(entry.retry_count))
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .bind(entry.completed_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn begin_retry(&self, id: JobLogId) -> Result<JobProcessingLog, PortError> {
        self.modify_entry(id, |entry| {
            if entry.begin_retry() {
                Ok(())
            } else {
                Err(PortError::conflict(format!("ledger entry {} is completed", entry.id)))
            }
        })
        .await
    }

    async fn mark_completed(
        &self,
        id: JobLogId,
        result: serde_json::Value,
    ) -> Result<JobProcessingLog, PortError> {
        self.modify_entry(id, move |entry| {
            entry.complete(result);
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, id: JobLogId, error_message: &str) -> Result<JobProcessingLog, PortError> {
        let message = error_message.to_string();
        self.modify_entry(id, move |entry| {
            entry.fail(message);
            Ok(())
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct PostgresPatientEventStore {
    pool: DatabasePool,
}

impl PostgresPatientEventStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresPatientEventStore {}

#[async_trait]
impl PatientEventStore for PostgresPatientEventStore {
    async fn find_event(
        &self,
        scope: &DataScope,
        id: PatientEventId,
    ) -> Result<Option<PatientStatusEvent>, PortError> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM patient_status_events WHERE id = "));
        builder.push_bind(id.into_uuid()).push(" AND ");
        push_scope(&mut builder, scope, ScopeColumns::PATIENT_EVENTS);

        let row = builder
            .build_query_as::<PatientEventRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(row.map(PatientStatusEvent::from))
    }

    async fn find_by_idempotency_key(
        &self,
        organization_id: OrganizationId,
        idempotency_key: &str,
    ) -> Result<Option<PatientStatusEvent>, PortError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM patient_status_events \
             WHERE organization_id = $1 AND idempotency_key = $2"
        );
        let row = sqlx::query_as::<_, PatientEventRow>(&sql)
            .bind(organization_id.into_uuid())
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(row.map(PatientStatusEvent::from))
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, idempotency_key = %event.idempotency_key))]
    async fn insert_event(&self, event: &PatientStatusEvent) -> Result<(), PortError> {
        let sql = format!(
            "INSERT INTO patient_status_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(event.id.into_uuid())
            .bind(event.organization_id.into_uuid())
            .bind(event.patient_id.into_uuid())
            .bind(DbPatientEventType::from(event.event_type))
            .bind(&event.idempotency_key)
            .bind(event.occurred_at)
            .bind(event.recorded_by.into_uuid())
            .bind(&event.notes)
            .bind(event.job_id.map(|id| id.into_uuid()))
            .bind(event.job_status.map(DbJobStatus::from))
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn link_job(
        &self,
        organization_id: OrganizationId,
        id: PatientEventId,
        job_id: JobId,
    ) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE patient_status_events SET job_id = $3, job_status = $4, updated_at = now() \
             WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.into_uuid())
        .bind(organization_id.into_uuid())
        .bind(job_id.into_uuid())
        .bind(DbJobStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("PatientStatusEvent", id));
        }
        Ok(())
    }

    async fn update_job_status(
        &self,
        organization_id: OrganizationId,
        id: PatientEventId,
        status: JobStatus,
    ) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE patient_status_events SET job_status = $3, updated_at = now() \
             WHERE id = $1 AND organization_id = $2",
        )
        .bind(id.into_uuid())
        .bind(organization_id.into_uuid())
        .bind(DbJobStatus::from(status))
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("PatientStatusEvent", id));
        }
        debug!(event_id = %id, %status, "job status recorded on event");
        Ok(())
    }
}
