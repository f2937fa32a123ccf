//! Database row types
//!
//! Rows mirror the tables in `migrations/` one to one. PostgreSQL enum
//! types get their own `Db*` enums so the domain crates stay free of sqlx;
//! conversions in both directions live here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use core_kernel::{ClaimId, JobId, OrganizationId, PatientEventId, UserId};
use domain_claims::{Claim, ClaimStatus, Patient, Provider, StatusChange};
use domain_jobs::{JobPayload, JobProcessingLog, JobStatus, PatientEventType, PatientStatusEvent, QueuedJob};
use domain_tenancy::{AssignedClaims, Organization, OrganizationSettings, Role, User};

use crate::error::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum DbRole {
    Admin,
    ClaimsProcessor,
    Provider,
    Patient,
}

impl From<DbRole> for Role {
    fn from(role: DbRole) -> Self {
        match role {
            DbRole::Admin => Role::Admin,
            DbRole::ClaimsProcessor => Role::ClaimsProcessor,
            DbRole::Provider => Role::Provider,
            DbRole::Patient => Role::Patient,
        }
    }
}

impl From<Role> for DbRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => DbRole::Admin,
            Role::ClaimsProcessor => DbRole::ClaimsProcessor,
            Role::Provider => DbRole::Provider,
            Role::Patient => DbRole::Patient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
pub enum DbClaimStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Paid,
}

impl From<DbClaimStatus> for ClaimStatus {
    fn from(status: DbClaimStatus) -> Self {
        match status {
            DbClaimStatus::Submitted => ClaimStatus::Submitted,
            DbClaimStatus::UnderReview => ClaimStatus::UnderReview,
            DbClaimStatus::Approved => ClaimStatus::Approved,
            DbClaimStatus::Rejected => ClaimStatus::Rejected,
            DbClaimStatus::Paid => ClaimStatus::Paid,
        }
    }
}

impl From<ClaimStatus> for DbClaimStatus {
    fn from(status: ClaimStatus) -> Self {
        match status {
            ClaimStatus::Submitted => DbClaimStatus::Submitted,
            ClaimStatus::UnderReview => DbClaimStatus::UnderReview,
            ClaimStatus::Approved => DbClaimStatus::Approved,
            ClaimStatus::Rejected => DbClaimStatus::Rejected,
            ClaimStatus::Paid => DbClaimStatus::Paid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "patient_event_type", rename_all = "snake_case")]
pub enum DbPatientEventType {
    Admission,
    Discharge,
    TreatmentInitiated,
}

impl From<DbPatientEventType> for PatientEventType {
    fn from(kind: DbPatientEventType) -> Self {
        match kind {
            DbPatientEventType::Admission => PatientEventType::Admission,
            DbPatientEventType::Discharge => PatientEventType::Discharge,
            DbPatientEventType::TreatmentInitiated => PatientEventType::TreatmentInitiated,
        }
    }
}

impl From<PatientEventType> for DbPatientEventType {
    fn from(kind: PatientEventType) -> Self {
        match kind {
            PatientEventType::Admission => DbPatientEventType::Admission,
            PatientEventType::Discharge => DbPatientEventType::Discharge,
            PatientEventType::TreatmentInitiated => DbPatientEventType::TreatmentInitiated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum DbJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<DbJobStatus> for JobStatus {
    fn from(status: DbJobStatus) -> Self {
        match status {
            DbJobStatus::Pending => JobStatus::Pending,
            DbJobStatus::Processing => JobStatus::Processing,
            DbJobStatus::Completed => JobStatus::Completed,
            DbJobStatus::Failed => JobStatus::Failed,
        }
    }
}

impl From<JobStatus> for DbJobStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => DbJobStatus::Pending,
            JobStatus::Processing => DbJobStatus::Processing,
            JobStatus::Completed => DbJobStatus::Completed,
            JobStatus::Failed => DbJobStatus::Failed,
        }
    }
}

/// Delivery state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "queue_state", rename_all = "snake_case")]
pub enum DbQueueState {
    Ready,
    Reserved,
    Done,
    Dead,
}

pub const ORGANIZATION_COLUMNS: &str = "id, name, is_active, min_claim_amount, max_claim_amount, \
     auto_approve_threshold, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub min_claim_amount: Decimal,
    pub max_claim_amount: Decimal,
    pub auto_approve_threshold: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id.into(),
            name: row.name,
            is_active: row.is_active,
            settings: OrganizationSettings {
                min_claim_amount: row.min_claim_amount,
                max_claim_amount: row.max_claim_amount,
                auto_approve_threshold: row.auto_approve_threshold,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub const USER_COLUMNS: &str = "id, organization_id, email, name, role, provider_id, patient_id, \
     assigned_claim_ids, is_active, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: DbRole,
    pub provider_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub assigned_claim_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let assigned_claim_ids =
            AssignedClaims::try_from_ids(row.assigned_claim_ids.into_iter().map(ClaimId::from))
                .map_err(|err| DatabaseError::corrupt("users", err.to_string()))?;

        Ok(User {
            id: row.id.into(),
            organization_id: row.organization_id.into(),
            email: row.email,
            name: row.name,
            role: row.role.into(),
            provider_id: row.provider_id.map(Into::into),
            patient_id: row.patient_id.map(Into::into),
            assigned_claim_ids,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub const PROVIDER_COLUMNS: &str = "id, organization_id, name, npi, specialty, is_active, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProviderRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub npi: String,
    pub specialty: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ProviderRow> for Provider {
    fn from(row: ProviderRow) -> Self {
        Provider {
            id: row.id.into(),
            organization_id: row.organization_id.into(),
            name: row.name,
            npi: row.npi,
            specialty: row.specialty,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

pub const PATIENT_COLUMNS: &str =
    "id, organization_id, first_name, last_name, date_of_birth, member_number, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub member_number: String,
    pub created_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: row.id.into(),
            organization_id: row.organization_id.into(),
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            member_number: row.member_number,
            created_at: row.created_at,
        }
    }
}

pub const CLAIM_COLUMNS: &str = "id, claim_number, organization_id, patient_id, provider_id, \
     diagnosis_code, amount, status, service_date, assigned_processor_id, denial_reason, notes, \
     status_history, submitted_by, processed_at, paid_at, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRow {
    pub id: Uuid,
    pub claim_number: String,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub status: DbClaimStatus,
    pub service_date: NaiveDate,
    pub assigned_processor_id: Option<Uuid>,
    pub denial_reason: Option<String>,
    pub notes: Option<String>,
    pub status_history: Json<Vec<StatusChange>>,
    pub submitted_by: Uuid,
    pub processed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClaimRow> for Claim {
    fn from(row: ClaimRow) -> Self {
        Claim {
            id: row.id.into(),
            claim_number: row.claim_number,
            organization_id: row.organization_id.into(),
            patient_id: row.patient_id.into(),
            provider_id: row.provider_id.into(),
            diagnosis_code: row.diagnosis_code,
            amount: row.amount,
            status: row.status.into(),
            service_date: row.service_date,
            assigned_processor_id: row.assigned_processor_id.map(UserId::from),
            denial_reason: row.denial_reason,
            notes: row.notes,
            status_history: row.status_history.0,
            submitted_by: row.submitted_by.into(),
            processed_at: row.processed_at,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub const EVENT_COLUMNS: &str = "id, organization_id, patient_id, event_type, idempotency_key, \
     occurred_at, recorded_by, notes, job_id, job_status, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientEventRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub event_type: DbPatientEventType,
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: Uuid,
    pub notes: Option<String>,
    pub job_id: Option<Uuid>,
    pub job_status: Option<DbJobStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PatientEventRow> for PatientStatusEvent {
    fn from(row: PatientEventRow) -> Self {
        PatientStatusEvent {
            id: PatientEventId::from(row.id),
            organization_id: OrganizationId::from(row.organization_id),
            patient_id: row.patient_id.into(),
            event_type: row.event_type.into(),
            idempotency_key: row.idempotency_key,
            occurred_at: row.occurred_at,
            recorded_by: row.recorded_by.into(),
            notes: row.notes,
            job_id: row.job_id.map(JobId::from),
            job_status: row.job_status.map(Into::into),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub const JOB_LOG_COLUMNS: &str = "id, organization_id, idempotency_key, job_type, status, payload, \
     result, error_message, retry_count, created_at, updated_at, completed_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobLogRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub idempotency_key: String,
    pub job_type: DbPatientEventType,
    pub status: DbJobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobLogRow> for JobProcessingLog {
    type Error = DatabaseError;

    fn try_from(row: JobLogRow) -> Result<Self, Self::Error> {
        let retry_count = u32::try_from(row.retry_count)
            .map_err(|_| DatabaseError::corrupt("job_processing_logs", "negative retry_count"))?;

        Ok(JobProcessingLog {
            id: row.id.into(),
            organization_id: row.organization_id.into(),
            idempotency_key: row.idempotency_key,
            job_type: row.job_type.into(),
            status: row.status.into(),
            payload: row.payload,
            result: row.result,
            error_message: row.error_message,
            retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedJobRow {
    pub id: Uuid,
    pub payload: Json<JobPayload>,
    pub attempt: i32,
}

impl TryFrom<QueuedJobRow> for QueuedJob {
    type Error = DatabaseError;

    fn try_from(row: QueuedJobRow) -> Result<Self, Self::Error> {
        let attempt = u32::try_from(row.attempt)
            .map_err(|_| DatabaseError::corrupt("job_queue", "negative attempt"))?;
        Ok(QueuedJob {
            id: row.id.into(),
            payload: row.payload.0,
            attempt,
        })
    }
}

/// Converts a bounded counter to the `INTEGER` column type
pub fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_status_mapping_is_total() {
        for status in ClaimStatus::ALL {
            assert_eq!(ClaimStatus::from(DbClaimStatus::from(status)), status);
        }
    }

    #[test]
    fn test_event_type_mapping_is_total() {
        for kind in PatientEventType::ALL {
            assert_eq!(PatientEventType::from(DbPatientEventType::from(kind)), kind);
        }
    }

    #[test]
    fn test_oversized_assignment_column_is_corrupt() {
        let row = UserRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "p@example.com".into(),
            name: "Processor".into(),
            role: DbRole::ClaimsProcessor,
            provider_id: None,
            patient_id: None,
            assigned_claim_ids: (0..1_001).map(|_| Uuid::new_v4()).collect(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let err = User::try_from(row).unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow { table: "users", .. }));
    }

    #[test]
    fn test_negative_retry_count_is_corrupt() {
        let row = JobLogRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            idempotency_key: "k".into(),
            job_type: DbPatientEventType::Admission,
            status: DbJobStatus::Failed,
            payload: serde_json::json!({}),
            result: None,
            error_message: None,
            retry_count: -1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        assert!(JobProcessingLog::try_from(row).is_err());
    }
}
