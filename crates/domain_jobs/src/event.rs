//! Patient status events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{JobId, OrganizationId, PatientEventId, PatientId, UserId};
use domain_tenancy::ScopedEntity;
use crate::error::JobError;
use crate::ledger::JobStatus;

/// Longest accepted idempotency key
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Patient lifecycle occurrence that triggers claim processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientEventType {
    Admission,
    Discharge,
    TreatmentInitiated,
}

impl PatientEventType {
    pub const ALL: [PatientEventType; 3] = [
        PatientEventType::Admission,
        PatientEventType::Discharge,
        PatientEventType::TreatmentInitiated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatientEventType::Admission => "admission",
            PatientEventType::Discharge => "discharge",
            PatientEventType::TreatmentInitiated => "treatment_initiated",
        }
    }

    /// Queue job name for the event's processor
    pub fn job_name(&self) -> &'static str {
        match self {
            PatientEventType::Admission => "patient-admission",
            PatientEventType::Discharge => "patient-discharge",
            PatientEventType::TreatmentInitiated => "treatment-initiated",
        }
    }
}

impl fmt::Display for PatientEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientEventType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatientEventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.job_name() == s)
            .ok_or_else(|| JobError::InvalidPayload(format!("unknown patient event type '{s}'")))
    }
}

/// Validates a caller-supplied idempotency key
pub fn validate_idempotency_key(key: &str) -> Result<(), JobError> {
    if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(JobError::InvalidPayload(format!(
            "idempotency key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// Generates a key for callers that did not supply one
pub fn generate_idempotency_key(event_type: PatientEventType) -> String {
    format!("{}-{}", event_type.job_name(), uuid::Uuid::new_v4())
}

/// A recorded admission, discharge or treatment occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStatusEvent {
    pub id: PatientEventId,
    pub organization_id: OrganizationId,
    pub patient_id: PatientId,
    pub event_type: PatientEventType,
    /// Unique per organization
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: UserId,
    pub notes: Option<String>,
    /// Background job the event was handed to
    pub job_id: Option<JobId>,
    /// Last known status of that job
    pub job_status: Option<JobStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientStatusEvent {
    pub fn new(
        organization_id: OrganizationId,
        patient_id: PatientId,
        event_type: PatientEventType,
        idempotency_key: String,
        occurred_at: DateTime<Utc>,
        recorded_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PatientEventId::new_v7(),
            organization_id,
            patient_id,
            event_type,
            idempotency_key,
            occurred_at,
            recorded_by,
            notes: None,
            job_id: None,
            job_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when a replayed request describes the same occurrence
    pub fn same_occurrence(&self, patient_id: PatientId, event_type: PatientEventType) -> bool {
        self.patient_id == patient_id && self.event_type == event_type
    }
}

impl ScopedEntity for PatientStatusEvent {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    fn scoped_patient_id(&self) -> Option<PatientId> {
        Some(self.patient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!("admission".parse::<PatientEventType>().unwrap(), PatientEventType::Admission);
        assert_eq!(
            "treatment-initiated".parse::<PatientEventType>().unwrap(),
            PatientEventType::TreatmentInitiated
        );
        assert!("transfer".parse::<PatientEventType>().is_err());
    }

    #[test]
    fn test_idempotency_key_bounds() {
        assert!(validate_idempotency_key("adm-42").is_ok());
        assert!(validate_idempotency_key("   ").is_err());
        assert!(validate_idempotency_key(&"k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let a = generate_idempotency_key(PatientEventType::Discharge);
        let b = generate_idempotency_key(PatientEventType::Discharge);
        assert!(a.starts_with("patient-discharge-"));
        assert_ne!(a, b);
    }
}
