//! PostgreSQL-backed durable job queue
//!
//! Jobs are rows in `job_queue`. Workers reserve with
//! `FOR UPDATE SKIP LOCKED`, so concurrent workers never receive the same
//! delivery. A delivery that is never acknowledged (worker crash) stays
//! `reserved` until [`PostgresJobQueue::requeue_stale`] returns it to
//! `ready`, which is what makes delivery at-least-once.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use tracing::{debug, info, instrument, warn};

use core_kernel::{DomainPort, HealthReport, HealthCheckable, JobId, PortError};
use domain_jobs::{FailureDisposition, JobPayload, JobQueue, QueuedJob, RetryPolicy};

use crate::error::port_error;
use crate::health;
use crate::pool::DatabasePool;
use crate::rows::{to_db_count, DbPatientEventType, DbQueueState, QueuedJobRow};

#[derive(Debug, Clone)]
pub struct PostgresJobQueue {
    pool: DatabasePool,
    policy: RetryPolicy,
}

impl PostgresJobQueue {
    pub fn new(pool: DatabasePool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns reservations older than `older_than` to the ready state
    ///
    /// The redelivery keeps its attempt number; the ledger makes the
    /// repeated run harmless.
    #[instrument(skip(self))]
    pub async fn requeue_stale(&self, older_than: std::time::Duration) -> Result<u64, PortError> {
        let cutoff = Utc::now()
            - Duration::from_std(older_than).unwrap_or_else(|_| Duration::seconds(300));
        let result = sqlx::query(
            "UPDATE job_queue SET state = $1, reserved_at = NULL, updated_at = now() \
             WHERE state = $2 AND reserved_at < $3",
        )
        .bind(DbQueueState::Ready)
        .bind(DbQueueState::Reserved)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            warn!(requeued, "stale reservations returned to the queue");
        }
        Ok(requeued)
    }
}

impl DomainPort for PostgresJobQueue {}

#[async_trait]
impl HealthCheckable for PostgresJobQueue {
    async fn health_check(&self) -> HealthReport {
        health::ping(&self.pool, "postgres-job-queue").await
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    #[instrument(skip(self, payload), fields(job_type = %payload.job_type, idempotency_key = %payload.idempotency_key))]
    async fn enqueue(&self, payload: &JobPayload) -> Result<JobId, PortError> {
        let id = JobId::new_v7();
        sqlx::query(
            "INSERT INTO job_queue (id, job_type, payload, state, attempt, run_at) \
             VALUES ($1, $2, $3, $4, 1, now())",
        )
        .bind(id.into_uuid())
        .bind(DbPatientEventType::from(payload.job_type))
        .bind(Json(payload))
        .bind(DbQueueState::Ready)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        debug!(job_id = %id, "job enqueued");
        Ok(id)
    }

    async fn reserve(&self) -> Result<Option<QueuedJob>, PortError> {
        let row = sqlx::query_as::<_, QueuedJobRow>(
            "UPDATE job_queue SET state = $1, reserved_at = now(), updated_at = now() \
             WHERE id = ( \
                 SELECT id FROM job_queue WHERE state = $2 AND run_at <= now() \
                 ORDER BY run_at, created_at \
                 FOR UPDATE SKIP LOCKED LIMIT 1 \
             ) \
             RETURNING id, payload, attempt",
        )
        .bind(DbQueueState::Reserved)
        .bind(DbQueueState::Ready)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        row.map(QueuedJob::try_from)
            .transpose()
            .map_err(PortError::from)
    }

    async fn ack(&self, id: JobId) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE job_queue SET state = $2, reserved_at = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(id.into_uuid())
        .bind(DbQueueState::Done)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Job", id));
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %id))]
    async fn fail(&self, id: JobId, error: &str, retryable: bool) -> Result<FailureDisposition, PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let attempt: i32 = sqlx::query_scalar("SELECT attempt FROM job_queue WHERE id = $1 FOR UPDATE")
            .bind(id.into_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(port_error)?
            .ok_or_else(|| PortError::not_found("Job", id))?;

        let failed_attempt = u32::try_from(attempt).unwrap_or(1);
        let disposition = self.policy.disposition(failed_attempt, retryable, Utc::now());

        match disposition {
            FailureDisposition::Retrying { next_attempt, run_at } => {
                sqlx::query(
                    "UPDATE job_queue SET state = $2, attempt = $3, run_at = $4, reserved_at = NULL, \
                     last_error = $5, updated_at = now() WHERE id = $1",
                )
                .bind(id.into_uuid())
                .bind(DbQueueState::Ready)
                .bind(to_db_count(next_attempt))
                .bind(run_at)
                .bind(error)
                .execute(&mut *tx)
                .await
                .map_err(port_error)?;
            }
            FailureDisposition::Dead => {
                sqlx::query(
                    "UPDATE job_queue SET state = $2, reserved_at = NULL, last_error = $3, \
                     updated_at = now() WHERE id = $1",
                )
                .bind(id.into_uuid())
                .bind(DbQueueState::Dead)
                .bind(error)
                .execute(&mut *tx)
                .await
                .map_err(port_error)?;
                info!(attempt = failed_attempt, "job moved to dead state");
            }
        }

        tx.commit().await.map_err(port_error)?;
        Ok(disposition)
    }
}
