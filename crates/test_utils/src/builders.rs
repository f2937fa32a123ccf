//! Test Data Builders
//!
//! Builders construct domain values with sensible defaults so a test only
//! names the fields it cares about. `ClaimBuilder` walks the claim through
//! real status changes, so built claims always carry a consistent history.

use chrono::{DateTime, NaiveDate, Utc};
use fake::Fake;
use rust_decimal::Decimal;

use core_kernel::{ClaimId, OrganizationId, PatientEventId, PatientId, ProviderId, UserId};
use domain_claims::{Actor, Claim, ClaimStatus, CreateClaim, NewClaim};
use domain_jobs::{JobPayload, PatientEventType, TriggeringActor};
use domain_tenancy::{AssignedClaims, Role, User};

use crate::fixtures::{AmountFixtures, DateFixtures, ReferenceFixtures, UserFixtures};

/// Builder for stored claims
pub struct ClaimBuilder {
    organization_id: OrganizationId,
    patient_id: PatientId,
    provider_id: ProviderId,
    diagnosis_code: String,
    amount: Decimal,
    service_date: NaiveDate,
    assigned_processor_id: Option<UserId>,
    notes: Option<String>,
    claim_number: Option<String>,
    submitted_by: UserId,
    status: ClaimStatus,
}

impl ClaimBuilder {
    /// Starts a submitted claim for the given tenant, patient, and provider
    pub fn new(organization_id: OrganizationId, patient_id: PatientId, provider_id: ProviderId) -> Self {
        Self {
            organization_id,
            patient_id,
            provider_id,
            diagnosis_code: ReferenceFixtures::diagnosis_code().to_string(),
            amount: AmountFixtures::routine(),
            service_date: DateFixtures::service_date(),
            assigned_processor_id: None,
            notes: None,
            claim_number: None,
            submitted_by: UserId::new_v7(),
            status: ClaimStatus::Submitted,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_diagnosis_code(mut self, code: impl Into<String>) -> Self {
        self.diagnosis_code = code.into();
        self
    }

    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.service_date = date;
        self
    }

    pub fn with_processor(mut self, processor_id: UserId) -> Self {
        self.assigned_processor_id = Some(processor_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_claim_number(mut self, number: impl Into<String>) -> Self {
        self.claim_number = Some(number.into());
        self
    }

    pub fn submitted_by(mut self, user_id: UserId) -> Self {
        self.submitted_by = user_id;
        self
    }

    /// Final status; the claim passes through `under_review` on the way
    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = status;
        self
    }

    /// Builds the claim; rejected claims get a stock denial reason
    pub fn build(self) -> Claim {
        let claim_number = self
            .claim_number
            .unwrap_or_else(|| format!("CLM-2024-{:07}", (0u32..10_000_000u32).fake::<u32>()));
        let mut claim = Claim::submit(
            NewClaim {
                organization_id: self.organization_id,
                patient_id: self.patient_id,
                provider_id: self.provider_id,
                diagnosis_code: self.diagnosis_code,
                amount: self.amount,
                service_date: self.service_date,
                assigned_processor_id: self.assigned_processor_id,
                notes: self.notes,
            },
            claim_number,
            self.submitted_by,
        );

        if self.status == ClaimStatus::Submitted {
            return claim;
        }

        let actor = Actor::system("fixture");
        claim
            .apply_status_change(ClaimStatus::UnderReview, actor.clone(), None)
            .expect("submitted claims can move to review");
        if self.status != ClaimStatus::UnderReview {
            let reason = (self.status == ClaimStatus::Rejected).then(|| "not covered".to_string());
            claim
                .apply_status_change(self.status, actor, reason)
                .expect("claims under review can reach any later status");
        }
        claim
    }

    /// The same claim as an API-level create request
    pub fn as_request(&self) -> CreateClaim {
        CreateClaim {
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            diagnosis_code: self.diagnosis_code.clone(),
            amount: self.amount,
            service_date: self.service_date,
            assigned_processor_id: self.assigned_processor_id,
            notes: self.notes.clone(),
        }
    }
}

/// Builder for user accounts
pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    pub fn new(organization_id: OrganizationId, role: Role) -> Self {
        Self {
            user: UserFixtures::user(organization_id, role),
        }
    }

    pub fn with_provider(mut self, provider_id: ProviderId) -> Self {
        self.user.provider_id = Some(provider_id);
        self
    }

    pub fn with_patient(mut self, patient_id: PatientId) -> Self {
        self.user.patient_id = Some(patient_id);
        self
    }

    /// # Panics
    ///
    /// Panics if the set exceeds the assignment limit.
    pub fn with_assignments(mut self, claim_ids: impl IntoIterator<Item = ClaimId>) -> Self {
        self.user.assigned_claim_ids =
            AssignedClaims::try_from_ids(claim_ids).expect("assignment set within limit");
        self
    }

    pub fn inactive(mut self) -> Self {
        self.user.is_active = false;
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

/// Builder for job payloads enqueued outside the event service
pub struct JobPayloadBuilder {
    payload: JobPayload,
}

impl JobPayloadBuilder {
    pub fn new(job_type: PatientEventType, organization_id: OrganizationId, patient_id: PatientId) -> Self {
        Self {
            payload: JobPayload {
                job_type,
                organization_id,
                patient_id,
                idempotency_key: format!("{}-{}", job_type, PatientEventId::new_v7()),
                triggered_by: TriggeringActor {
                    user_id: UserId::new_v7(),
                    role: Role::Provider,
                },
                event_id: None,
                occurred_at: Utc::now(),
            },
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.payload.idempotency_key = key.into();
        self
    }

    pub fn triggered_by(mut self, user_id: UserId, role: Role) -> Self {
        self.payload.triggered_by = TriggeringActor { user_id, role };
        self
    }

    pub fn for_event(mut self, event_id: PatientEventId) -> Self {
        self.payload.event_id = Some(event_id);
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.payload.occurred_at = at;
        self
    }

    pub fn build(self) -> JobPayload {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::assert_history_consistent;

    fn builder() -> ClaimBuilder {
        ClaimBuilder::new(OrganizationId::new_v7(), PatientId::new_v7(), ProviderId::new_v7())
    }

    #[test]
    fn test_built_claims_have_consistent_history() {
        for status in ClaimStatus::ALL {
            let claim = builder().with_status(status).build();
            assert_eq!(claim.status, status);
            assert_history_consistent(&claim);
        }
    }

    #[test]
    fn test_rejected_claim_carries_denial_reason() {
        let claim = builder().with_status(ClaimStatus::Rejected).build();
        assert_eq!(claim.denial_reason.as_deref(), Some("not covered"));
        assert!(claim.processed_at.is_some());
    }

    #[test]
    fn test_inactive_user() {
        let user = UserBuilder::new(OrganizationId::new_v7(), Role::ClaimsProcessor)
            .inactive()
            .build();
        assert!(!user.is_active);
        assert!(user.assigned_claim_ids.is_empty());
    }
}
