//! Job Domain Ports
//!
//! - `PatientEventStore`: recorded patient status events
//! - [`JobLedger`](crate::ledger::JobLedger) and
//!   [`JobQueue`](crate::queue::JobQueue) live next to their domain types

use async_trait::async_trait;

use core_kernel::{DomainPort, JobId, OrganizationId, PatientEventId, PortError};
use domain_tenancy::DataScope;

use crate::event::PatientStatusEvent;
use crate::ledger::JobStatus;

#[async_trait]
pub trait PatientEventStore: DomainPort {
    async fn find_event(
        &self,
        scope: &DataScope,
        id: PatientEventId,
    ) -> Result<Option<PatientStatusEvent>, PortError>;

    async fn find_by_idempotency_key(
        &self,
        organization_id: OrganizationId,
        idempotency_key: &str,
    ) -> Result<Option<PatientStatusEvent>, PortError>;

    /// Inserts an event
    ///
    /// Returns `PortError::Conflict` when the key is already used in the
    /// organization.
    async fn insert_event(&self, event: &PatientStatusEvent) -> Result<(), PortError>;

    /// Links the queued job and sets its status to pending
    async fn link_job(
        &self,
        organization_id: OrganizationId,
        id: PatientEventId,
        job_id: JobId,
    ) -> Result<(), PortError>;

    /// Records the job's last known status
    async fn update_job_status(
        &self,
        organization_id: OrganizationId,
        id: PatientEventId,
        status: JobStatus,
    ) -> Result<(), PortError>;
}

/// In-memory implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default, Clone)]
    pub struct InMemoryPatientEventStore {
        events: Arc<RwLock<HashMap<PatientEventId, PatientStatusEvent>>>,
    }

    impl InMemoryPatientEventStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn get(&self, id: PatientEventId) -> Option<PatientStatusEvent> {
            self.events.read().await.get(&id).cloned()
        }

        pub async fn len(&self) -> usize {
            self.events.read().await.len()
        }

        async fn update(
            &self,
            organization_id: OrganizationId,
            id: PatientEventId,
            apply: impl FnOnce(&mut PatientStatusEvent),
        ) -> Result<(), PortError> {
            let mut events = self.events.write().await;
            let event = events
                .get_mut(&id)
                .filter(|event| event.organization_id == organization_id)
                .ok_or_else(|| PortError::not_found("PatientStatusEvent", id))?;
            apply(event);
            event.updated_at = Utc::now();
            Ok(())
        }
    }

    impl DomainPort for InMemoryPatientEventStore {}

    #[async_trait]
    impl PatientEventStore for InMemoryPatientEventStore {
        async fn find_event(
            &self,
            scope: &DataScope,
            id: PatientEventId,
        ) -> Result<Option<PatientStatusEvent>, PortError> {
            Ok(self
                .events
                .read()
                .await
                .get(&id)
                .filter(|event| scope.admits(*event))
                .cloned())
        }

        async fn find_by_idempotency_key(
            &self,
            organization_id: OrganizationId,
            idempotency_key: &str,
        ) -> Result<Option<PatientStatusEvent>, PortError> {
            Ok(self
                .events
                .read()
                .await
                .values()
                .find(|e| e.organization_id == organization_id && e.idempotency_key == idempotency_key)
                .cloned())
        }

        async fn insert_event(&self, event: &PatientStatusEvent) -> Result<(), PortError> {
            let mut events = self.events.write().await;
            let taken = events.values().any(|e| {
                e.organization_id == event.organization_id && e.idempotency_key == event.idempotency_key
            });
            if taken {
                return Err(PortError::conflict(format!(
                    "patient event with key {} already exists",
                    event.idempotency_key
                )));
            }
            events.insert(event.id, event.clone());
            Ok(())
        }

        async fn link_job(
            &self,
            organization_id: OrganizationId,
            id: PatientEventId,
            job_id: JobId,
        ) -> Result<(), PortError> {
            self.update(organization_id, id, |event| {
                event.job_id = Some(job_id);
                event.job_status = Some(JobStatus::Pending);
            })
            .await
        }

        async fn update_job_status(
            &self,
            organization_id: OrganizationId,
            id: PatientEventId,
            status: JobStatus,
        ) -> Result<(), PortError> {
            self.update(organization_id, id, |event| event.job_status = Some(status))
                .await
        }
    }
}
