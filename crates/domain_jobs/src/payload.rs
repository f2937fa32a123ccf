//! Job payloads carried by the queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{OrganizationId, PatientEventId, PatientId, UserId};
use domain_tenancy::Role;
use crate::event::{PatientEventType, PatientStatusEvent};

/// User whose request caused the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeringActor {
    pub user_id: UserId,
    pub role: Role,
}

/// Everything a processor needs to run one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_type: PatientEventType,
    pub organization_id: OrganizationId,
    pub patient_id: PatientId,
    pub idempotency_key: String,
    pub triggered_by: TriggeringActor,
    /// Event the job was created for, if any
    pub event_id: Option<PatientEventId>,
    pub occurred_at: DateTime<Utc>,
}

impl JobPayload {
    pub fn for_event(event: &PatientStatusEvent, role: Role) -> Self {
        Self {
            job_type: event.event_type,
            organization_id: event.organization_id,
            patient_id: event.patient_id,
            idempotency_key: event.idempotency_key.clone(),
            triggered_by: TriggeringActor {
                user_id: event.recorded_by,
                role,
            },
            event_id: Some(event.id),
            occurred_at: event.occurred_at,
        }
    }
}
