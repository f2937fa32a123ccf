//! Patient event recording
//!
//! Recording an event is itself idempotent per (key, organization): a
//! replayed request returns the event recorded the first time. A replay only
//! enqueues when the first attempt stored the event but never linked a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use core_kernel::{JobId, PatientEventId, PatientId};
use domain_claims::ReferenceStore;
use domain_tenancy::permissions::{can_record_patient_events, require_permission};
use domain_tenancy::{AccessContext, AuditLogEntry, DataScope};

use crate::error::JobError;
use crate::event::{
    generate_idempotency_key, validate_idempotency_key, PatientEventType, PatientStatusEvent,
};
use crate::ledger::JobStatus;
use crate::payload::JobPayload;
use crate::ports::PatientEventStore;
use crate::queue::JobQueue;

/// Request to record a patient event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatientEvent {
    pub patient_id: PatientId,
    pub event_type: PatientEventType,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Records patient events and hands them to the job queue
#[derive(Clone)]
pub struct PatientEventService {
    events: Arc<dyn PatientEventStore>,
    references: Arc<dyn ReferenceStore>,
    queue: Arc<dyn JobQueue>,
}

impl PatientEventService {
    pub fn new(
        events: Arc<dyn PatientEventStore>,
        references: Arc<dyn ReferenceStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            events,
            references,
            queue,
        }
    }

    /// Records an event and enqueues its processing job
    ///
    /// # Errors
    ///
    /// * `Forbidden` for patients
    /// * `IdempotencyConflict` when the key was used for a different
    ///   patient or event type
    /// * `NotFound` when the patient is not in the caller's organization
    #[instrument(skip(self, context, request), fields(organization_id = %context.organization_id(), event_type = %request.event_type))]
    pub async fn record(
        &self,
        context: &AccessContext,
        request: RecordPatientEvent,
    ) -> Result<PatientStatusEvent, JobError> {
        let role = context.role();
        require_permission(can_record_patient_events(role), "record patient events", role)?;

        let organization_id = context.organization_id();
        let key = match request.idempotency_key {
            Some(key) => {
                validate_idempotency_key(&key)?;
                key
            }
            None => generate_idempotency_key(request.event_type),
        };

        if let Some(existing) = self.events.find_by_idempotency_key(organization_id, &key).await? {
            let existing = replayed(existing, &request.patient_id, request.event_type, &key)?;
            return self.ensure_enqueued(existing, context).await;
        }

        self.references
            .find_patient(organization_id, request.patient_id)
            .await?
            .ok_or_else(|| JobError::not_found("Patient", request.patient_id))?;

        let mut event = PatientStatusEvent::new(
            organization_id,
            request.patient_id,
            request.event_type,
            key.clone(),
            request.occurred_at.unwrap_or_else(Utc::now),
            context.user_id(),
        );
        event.notes = request.notes;

        match self.events.insert_event(&event).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                let existing = self
                    .events
                    .find_by_idempotency_key(organization_id, &key)
                    .await?
                    .ok_or_else(|| JobError::not_found("PatientStatusEvent", &key))?;
                let existing = replayed(existing, &request.patient_id, request.event_type, &key)?;
                return self.ensure_enqueued(existing, context).await;
            }
            Err(err) => return Err(err.into()),
        }

        let job_id = self.enqueue_and_link(&mut event, context).await?;

        info!(event_id = %event.id, %job_id, idempotency_key = %key, "patient event recorded");
        AuditLogEntry::new(
            organization_id,
            Some(context.user_id()),
            format!("patient_event.{}", event.event_type),
            "patient_status_event",
            event.id,
        )
        .emit();

        Ok(event)
    }

    /// Enqueues the job for a replayed event that never got one
    async fn ensure_enqueued(
        &self,
        mut event: PatientStatusEvent,
        context: &AccessContext,
    ) -> Result<PatientStatusEvent, JobError> {
        if event.job_id.is_some() {
            return Ok(event);
        }
        let job_id = self.enqueue_and_link(&mut event, context).await?;
        info!(event_id = %event.id, %job_id, "enqueued job for replayed patient event");
        Ok(event)
    }

    async fn enqueue_and_link(
        &self,
        event: &mut PatientStatusEvent,
        context: &AccessContext,
    ) -> Result<JobId, JobError> {
        let job_id = self
            .queue
            .enqueue(&JobPayload::for_event(event, context.role()))
            .await
            .map_err(JobError::Queue)?;
        self.events.link_job(event.organization_id, event.id, job_id).await?;
        event.job_id = Some(job_id);
        event.job_status = Some(JobStatus::Pending);
        Ok(job_id)
    }

    /// Finds an event visible to the caller
    pub async fn find_by_id(
        &self,
        context: &AccessContext,
        id: PatientEventId,
    ) -> Result<PatientStatusEvent, JobError> {
        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Err(JobError::not_found("PatientStatusEvent", id));
        }
        self.events
            .find_event(&scope, id)
            .await?
            .ok_or_else(|| JobError::not_found("PatientStatusEvent", id))
    }
}

fn replayed(
    existing: PatientStatusEvent,
    patient_id: &PatientId,
    event_type: PatientEventType,
    key: &str,
) -> Result<PatientStatusEvent, JobError> {
    if !existing.same_occurrence(*patient_id, event_type) {
        return Err(JobError::IdempotencyConflict { key: key.to_string() });
    }
    debug!(event_id = %existing.id, "replayed patient event request");
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use core_kernel::{DomainPort, ErrorKind, OrganizationId, PortError, ProviderId, UserId};
    use std::sync::atomic::{AtomicBool, Ordering};
    use domain_claims::ports::mock::InMemoryReferenceStore;
    use domain_claims::Patient;
    use domain_tenancy::RoleScope;

    use crate::ports::mock::InMemoryPatientEventStore;
    use crate::queue::mock::InMemoryJobQueue;
    use crate::queue::{FailureDisposition, QueuedJob};

    struct Fixture {
        service: PatientEventService,
        events: InMemoryPatientEventStore,
        queue: InMemoryJobQueue,
        organization_id: OrganizationId,
        patient: Patient,
    }

    async fn fixture() -> Fixture {
        let events = InMemoryPatientEventStore::new();
        let references = InMemoryReferenceStore::new();
        let queue = InMemoryJobQueue::default();
        let organization_id = OrganizationId::new_v7();
        let patient = Patient::new(
            organization_id,
            "Grace",
            "Hopper",
            NaiveDate::from_ymd_opt(1970, 1, 9).unwrap(),
            "M-0042",
        );
        references.insert_patient(patient.clone()).await;

        Fixture {
            service: PatientEventService::new(
                Arc::new(events.clone()),
                Arc::new(references),
                Arc::new(queue.clone()),
            ),
            events,
            queue,
            organization_id,
            patient,
        }
    }

    fn provider(organization_id: OrganizationId) -> AccessContext {
        AccessContext::new(
            organization_id,
            UserId::new(),
            RoleScope::Provider {
                provider_id: Some(ProviderId::new()),
            },
        )
    }

    fn request(patient_id: PatientId, key: Option<&str>) -> RecordPatientEvent {
        RecordPatientEvent {
            patient_id,
            event_type: PatientEventType::Admission,
            occurred_at: None,
            idempotency_key: key.map(str::to_string),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_record_enqueues_and_links_job() {
        let f = fixture().await;
        let context = provider(f.organization_id);

        let event = f
            .service
            .record(&context, request(f.patient.id, Some("adm-1")))
            .await
            .unwrap();

        assert_eq!(event.job_status, Some(JobStatus::Pending));
        let jobs = f.queue.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(Some(jobs[0].id), event.job_id);
        assert_eq!(jobs[0].payload.idempotency_key, "adm-1");
        assert_eq!(jobs[0].payload.triggered_by.user_id, context.user_id());

        let stored = f.events.get(event.id).await.unwrap();
        assert_eq!(stored.job_id, event.job_id);
    }

    #[tokio::test]
    async fn test_replay_returns_existing_event_without_enqueueing() {
        let f = fixture().await;
        let context = provider(f.organization_id);

        let first = f
            .service
            .record(&context, request(f.patient.id, Some("adm-1")))
            .await
            .unwrap();
        let second = f
            .service
            .record(&context, request(f.patient.id, Some("adm-1")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(f.queue.jobs().await.len(), 1);
    }

    /// Queue whose first enqueue is refused
    struct QueueDownOnce {
        inner: InMemoryJobQueue,
        refused: AtomicBool,
    }

    impl DomainPort for QueueDownOnce {}

    #[async_trait]
    impl JobQueue for QueueDownOnce {
        async fn enqueue(&self, payload: &JobPayload) -> Result<JobId, PortError> {
            if !self.refused.swap(true, Ordering::SeqCst) {
                return Err(PortError::connection("queue unavailable"));
            }
            self.inner.enqueue(payload).await
        }

        async fn reserve(&self) -> Result<Option<QueuedJob>, PortError> {
            self.inner.reserve().await
        }

        async fn ack(&self, id: JobId) -> Result<(), PortError> {
            self.inner.ack(id).await
        }

        async fn fail(&self, id: JobId, error: &str, retryable: bool) -> Result<FailureDisposition, PortError> {
            self.inner.fail(id, error, retryable).await
        }
    }

    #[tokio::test]
    async fn test_retry_after_enqueue_failure_links_a_job() {
        let f = fixture().await;
        let queue = InMemoryJobQueue::default();
        let references = InMemoryReferenceStore::new();
        references.insert_patient(f.patient.clone()).await;
        let service = PatientEventService::new(
            Arc::new(f.events.clone()),
            Arc::new(references),
            Arc::new(QueueDownOnce {
                inner: queue.clone(),
                refused: AtomicBool::new(false),
            }),
        );
        let context = provider(f.organization_id);

        let err = service
            .record(&context, request(f.patient.id, Some("adm-7")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Queue);
        assert!(queue.jobs().await.is_empty());

        let event = service
            .record(&context, request(f.patient.id, Some("adm-7")))
            .await
            .unwrap();
        assert_eq!(event.idempotency_key, "adm-7");
        assert_eq!(event.job_status, Some(JobStatus::Pending));
        assert_eq!(f.events.len().await, 1);

        let jobs = queue.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(event.job_id, Some(jobs[0].id));
        assert_eq!(jobs[0].payload.event_id, Some(event.id));
        assert_eq!(f.events.get(event.id).await.unwrap().job_id, event.job_id);

        let again = service
            .record(&context, request(f.patient.id, Some("adm-7")))
            .await
            .unwrap();
        assert_eq!(again.job_id, event.job_id);
        assert_eq!(queue.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_key_reuse_for_other_patient_conflicts() {
        let f = fixture().await;
        let context = provider(f.organization_id);
        f.service
            .record(&context, request(f.patient.id, Some("adm-1")))
            .await
            .unwrap();

        let err = f
            .service
            .record(&context, request(PatientId::new(), Some("adm-1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdempotencyConflict);
    }

    #[tokio::test]
    async fn test_generated_keys_make_distinct_events() {
        let f = fixture().await;
        let context = provider(f.organization_id);

        let a = f.service.record(&context, request(f.patient.id, None)).await.unwrap();
        let b = f.service.record(&context, request(f.patient.id, None)).await.unwrap();

        assert_ne!(a.idempotency_key, b.idempotency_key);
        assert_eq!(f.events.len().await, 2);
    }

    #[tokio::test]
    async fn test_patient_role_and_foreign_patient() {
        let f = fixture().await;
        let patient_context = AccessContext::new(
            f.organization_id,
            UserId::new(),
            RoleScope::Patient {
                patient_id: Some(f.patient.id),
            },
        );
        let err = f
            .service
            .record(&patient_context, request(f.patient.id, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let other_tenant = provider(OrganizationId::new());
        let err = f
            .service
            .record(&other_tenant, request(f.patient.id, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.queue.jobs().await.is_empty());
    }
}
