//! Bounded worker pool
//!
//! The pool reserves jobs from the [`JobQueue`] and runs them through the
//! [`Dispatcher`]. Concurrency is bounded by a semaphore, throughput by a
//! pacing interval. On shutdown the pool stops reserving and waits for
//! in-flight jobs to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::JobError;
use crate::ledger::JobStatus;
use crate::ports::PatientEventStore;
use crate::queue::{FailureDisposition, JobQueue, QueuedJob};

/// Pool sizing and pacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSettings {
    /// Jobs running at once
    pub concurrency: usize,
    /// Throughput ceiling
    pub max_jobs_per_second: f64,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_jobs_per_second: 10.0,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl WorkerSettings {
    fn pacing_period(&self) -> Duration {
        if self.max_jobs_per_second <= 0.0 || !self.max_jobs_per_second.is_finite() {
            return Duration::from_secs(1);
        }
        Duration::from_secs_f64(1.0 / self.max_jobs_per_second)
    }
}

/// How one delivery ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying { next_attempt: u32 },
    Dead,
}

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    events: Arc<dyn PatientEventStore>,
    dispatcher: Dispatcher,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        events: Arc<dyn PatientEventStore>,
        dispatcher: Dispatcher,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            events,
            dispatcher,
            settings,
        }
    }

    /// Runs until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.settings.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut pacing = tokio::time::interval(self.settings.pacing_period());
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            concurrency,
            max_jobs_per_second = self.settings.max_jobs_per_second,
            "worker pool started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            tokio::select! {
                _ = pacing.tick() => {}
                _ = shutdown.changed() => break,
            }

            match self.queue.reserve().await {
                Ok(Some(job)) => {
                    let pool = self.clone();
                    tokio::spawn(async move {
                        pool.execute(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(err) => {
                    drop(permit);
                    warn!(error = %err, "could not reserve job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!("worker pool draining");
        let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if permits.acquire_many(all).await.is_err() {
            warn!("worker pool semaphore closed before in-flight jobs finished");
        }
        info!("worker pool stopped");
    }

    /// Reserves and runs a single job; `None` when the queue had nothing due
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, JobError> {
        match self.queue.reserve().await.map_err(JobError::Queue)? {
            Some(job) => Ok(Some(self.execute(job).await)),
            None => Ok(None),
        }
    }

    /// Runs one delivery and reports the outcome to the queue
    pub async fn execute(&self, job: QueuedJob) -> JobOutcome {
        let payload = &job.payload;
        debug!(
            job_id = %job.id,
            attempt = job.attempt,
            job_type = %payload.job_type,
            "job started"
        );
        self.record_status(&job, JobStatus::Processing).await;

        match self.dispatcher.dispatch(payload).await {
            Ok(result) => {
                if let Err(err) = self.queue.ack(job.id).await {
                    warn!(job_id = %job.id, error = %err, "could not acknowledge job");
                }
                self.record_status(&job, JobStatus::Completed).await;
                info!(job_id = %job.id, claims_updated = result.claims_updated, "job completed");
                JobOutcome::Completed
            }
            Err(err) => {
                self.record_status(&job, JobStatus::Failed).await;
                let retryable = err.is_retryable();
                match self.queue.fail(job.id, &err.to_string(), retryable).await {
                    Ok(FailureDisposition::Retrying { next_attempt, run_at }) => {
                        warn!(job_id = %job.id, error = %err, next_attempt, %run_at, "job failed; retry scheduled");
                        JobOutcome::Retrying { next_attempt }
                    }
                    Ok(FailureDisposition::Dead) => {
                        error!(job_id = %job.id, error = %err, attempt = job.attempt, "job abandoned");
                        JobOutcome::Dead
                    }
                    Err(queue_err) => {
                        error!(job_id = %job.id, error = %queue_err, "could not report job failure");
                        JobOutcome::Dead
                    }
                }
            }
        }
    }

    async fn record_status(&self, job: &QueuedJob, status: JobStatus) {
        let Some(event_id) = job.payload.event_id else {
            return;
        };
        if let Err(err) = self
            .events
            .update_job_status(job.payload.organization_id, event_id, status)
            .await
        {
            warn!(%event_id, %status, error = %err, "could not record job status on event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use core_kernel::{DomainPort, JobId, OrganizationId, PatientId, PortError, ProviderId, UserId};
    use domain_claims::ports::mock::{InMemoryClaimStore, InMemoryReferenceStore};
    use domain_claims::{Claim, ClaimGateway, ClaimStatus, NewClaim, Patient, YearlyClaimNumbers};
    use domain_tenancy::{AccessContext, Role, RoleScope};

    use crate::event::PatientEventType;
    use crate::ledger::mock::InMemoryJobLedger;
    use crate::payload::{JobPayload, TriggeringActor};
    use crate::ports::mock::InMemoryPatientEventStore;
    use crate::queue::mock::{InMemoryJobQueue, QueueState};
    use crate::queue::RetryPolicy;
    use crate::service::{PatientEventService, RecordPatientEvent};

    struct Fixture {
        pool: WorkerPool,
        service: PatientEventService,
        claims: InMemoryClaimStore,
        events: InMemoryPatientEventStore,
        queue: InMemoryJobQueue,
        context: AccessContext,
        patient: Patient,
    }

    async fn fixture() -> Fixture {
        let claims = InMemoryClaimStore::new();
        let references = InMemoryReferenceStore::new();
        let events = InMemoryPatientEventStore::new();
        let queue = InMemoryJobQueue::new(RetryPolicy::default()).without_delays();
        let organization_id = OrganizationId::new_v7();
        let patient = Patient::new(
            organization_id,
            "Alan",
            "Turing",
            NaiveDate::from_ymd_opt(1954, 6, 7).unwrap(),
            "M-7",
        );
        references.insert_patient(patient.clone()).await;

        let gateway = ClaimGateway::new(
            Arc::new(claims.clone()),
            Arc::new(references.clone()),
            Arc::new(YearlyClaimNumbers),
        );
        let dispatcher = Dispatcher::standard(Arc::new(InMemoryJobLedger::new()), gateway);
        let pool = WorkerPool::new(
            Arc::new(queue.clone()),
            Arc::new(events.clone()),
            dispatcher,
            WorkerSettings {
                concurrency: 2,
                max_jobs_per_second: 100.0,
                poll_interval: Duration::from_millis(5),
            },
        );
        let service = PatientEventService::new(
            Arc::new(events.clone()),
            Arc::new(references),
            Arc::new(queue.clone()),
        );
        let context = AccessContext::new(organization_id, UserId::new(), RoleScope::Admin);

        Fixture {
            pool,
            service,
            claims,
            events,
            queue,
            context,
            patient,
        }
    }

    impl Fixture {
        async fn seed_submitted_claim(&self) -> Claim {
            let claim = Claim::submit(
                NewClaim {
                    organization_id: self.context.organization_id(),
                    patient_id: self.patient.id,
                    provider_id: ProviderId::new(),
                    diagnosis_code: "I21.4".to_string(),
                    amount: dec!(980.00),
                    service_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                    assigned_processor_id: None,
                    notes: None,
                },
                format!("CLM-2024-{:07}", self.claims.len().await + 1),
                self.context.user_id(),
            );
            self.claims.seed(claim.clone()).await;
            claim
        }

        async fn record(&self, event_type: PatientEventType) -> crate::event::PatientStatusEvent {
            self.service
                .record(
                    &self.context,
                    RecordPatientEvent {
                        patient_id: self.patient.id,
                        event_type,
                        occurred_at: None,
                        idempotency_key: None,
                        notes: None,
                    },
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_job_completes_and_status_is_written_back() {
        let f = fixture().await;
        let claim = f.seed_submitted_claim().await;
        let event = f.record(PatientEventType::Admission).await;

        let outcome = f.pool.run_once().await.unwrap();
        assert_eq!(outcome, Some(JobOutcome::Completed));
        assert_eq!(f.pool.run_once().await.unwrap(), None);

        let stored = f.events.get(event.id).await.unwrap();
        assert_eq!(stored.job_status, Some(JobStatus::Completed));
        assert_eq!(f.claims.get(claim.id).await.unwrap().status, ClaimStatus::UnderReview);
        assert_eq!(f.queue.state(event.job_id.unwrap()).await, Some(QueueState::Done));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_by_queue() {
        let f = fixture().await;
        let claim = f.seed_submitted_claim().await;
        let event = f.record(PatientEventType::Discharge).await;

        f.claims.fail_modifications_after(0);
        assert_eq!(
            f.pool.run_once().await.unwrap(),
            Some(JobOutcome::Retrying { next_attempt: 2 })
        );
        assert_eq!(
            f.events.get(event.id).await.unwrap().job_status,
            Some(JobStatus::Failed)
        );

        assert_eq!(f.pool.run_once().await.unwrap(), Some(JobOutcome::Completed));
        assert_eq!(f.claims.get(claim.id).await.unwrap().status, ClaimStatus::Approved);
        assert_eq!(
            f.events.get(event.id).await.unwrap().job_status,
            Some(JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_deterministic_failure_is_not_retried() {
        let f = fixture().await;
        let payload = JobPayload {
            job_type: PatientEventType::Admission,
            organization_id: f.context.organization_id(),
            patient_id: PatientId::new(),
            idempotency_key: "adm-forbidden".to_string(),
            triggered_by: TriggeringActor {
                user_id: UserId::new(),
                role: Role::Patient,
            },
            event_id: None,
            occurred_at: Utc::now(),
        };
        let job_id = f.queue.enqueue(&payload).await.unwrap();

        assert_eq!(f.pool.run_once().await.unwrap(), Some(JobOutcome::Dead));
        assert!(matches!(f.queue.state(job_id).await, Some(QueueState::Dead { .. })));
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_stops_on_shutdown() {
        let f = fixture().await;
        let claim = f.seed_submitted_claim().await;
        for event_type in [PatientEventType::Admission, PatientEventType::TreatmentInitiated] {
            f.record(event_type).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = f.pool.clone();
        let handle = tokio::spawn(async move { pool.run(shutdown_rx).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.queue.pending().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(f.claims.get(claim.id).await.unwrap().status, ClaimStatus::UnderReview);
    }

    /// Queue that is reachable for enqueue but fails every reservation
    #[derive(Default)]
    struct UnreservableQueue {
        reservations: AtomicUsize,
    }

    impl DomainPort for UnreservableQueue {}

    #[async_trait]
    impl JobQueue for UnreservableQueue {
        async fn enqueue(&self, _payload: &JobPayload) -> Result<JobId, PortError> {
            Ok(JobId::new())
        }

        async fn reserve(&self) -> Result<Option<QueuedJob>, PortError> {
            self.reservations.fetch_add(1, Ordering::SeqCst);
            Err(PortError::connection("connection reset"))
        }

        async fn ack(&self, _id: JobId) -> Result<(), PortError> {
            Ok(())
        }

        async fn fail(&self, id: JobId, _error: &str, _retryable: bool) -> Result<FailureDisposition, PortError> {
            Err(PortError::not_found("Job", id))
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff_after_reserve_error() {
        let queue = Arc::new(UnreservableQueue::default());
        let gateway = ClaimGateway::new(
            Arc::new(InMemoryClaimStore::new()),
            Arc::new(InMemoryReferenceStore::new()),
            Arc::new(YearlyClaimNumbers),
        );
        let pool = WorkerPool::new(
            queue.clone(),
            Arc::new(InMemoryPatientEventStore::new()),
            Dispatcher::standard(Arc::new(InMemoryJobLedger::new()), gateway),
            WorkerSettings {
                concurrency: 1,
                max_jobs_per_second: 100.0,
                poll_interval: Duration::from_secs(3600),
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { pool.run(shutdown_rx).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.reservations.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker kept sleeping after shutdown")
            .unwrap();
        assert_eq!(queue.reservations.load(Ordering::SeqCst), 1);
    }
}
