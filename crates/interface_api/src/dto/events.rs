//! Patient event DTOs

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use core_kernel::PatientId;
use domain_jobs::{PatientEventType, RecordPatientEvent};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub patient_id: PatientId,
    pub event_type: PatientEventType,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Generated when absent
    #[serde(default)]
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<RecordEventRequest> for RecordPatientEvent {
    fn from(request: RecordEventRequest) -> Self {
        RecordPatientEvent {
            patient_id: request.patient_id,
            event_type: request.event_type,
            occurred_at: request.occurred_at,
            idempotency_key: request.idempotency_key,
            notes: request.notes,
        }
    }
}
