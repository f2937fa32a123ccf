//! Claim aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId, UserId};
use domain_tenancy::ScopedEntity;
use crate::error::ClaimError;

/// Claim status
///
/// ```text
/// submitted -> under_review -> approved | rejected -> paid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Received, not yet looked at
    Submitted,
    /// Being adjudicated
    UnderReview,
    /// Approved for payment
    Approved,
    /// Denied; carries a denial reason
    Rejected,
    /// Settled
    Paid,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 5] = [
        ClaimStatus::Submitted,
        ClaimStatus::UnderReview,
        ClaimStatus::Approved,
        ClaimStatus::Rejected,
        ClaimStatus::Paid,
    ];

    /// Approved and paid claims accept no further status mutation.
    ///
    /// Rejected claims stay mutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Paid)
    }

    /// Checks if the transition is valid from a mutable status
    pub fn can_transition_to(&self, target: ClaimStatus) -> bool {
        !self.is_terminal() && target != *self && target != ClaimStatus::Submitted
    }

    /// Position in the lifecycle, used for ordering
    pub fn rank(&self) -> u8 {
        match self {
            ClaimStatus::Submitted => 0,
            ClaimStatus::UnderReview => 1,
            ClaimStatus::Approved => 2,
            ClaimStatus::Rejected => 3,
            ClaimStatus::Paid => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ClaimError::InvalidQuery(format!("unknown claim status '{s}'")))
    }
}

/// Who caused a status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// A signed-in user
    User { user_id: UserId },
    /// A background job acting with system authority
    System { source: String },
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Actor::User { user_id }
    }

    pub fn system(source: impl Into<String>) -> Self {
        Actor::System {
            source: source.into(),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User { user_id } => Some(*user_id),
            Actor::System { .. } => None,
        }
    }
}

/// One immutable entry of a claim's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from_status: Option<ClaimStatus>,
    pub to_status: ClaimStatus,
    pub changed_by: Actor,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Validated input for a new claim
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub organization_id: OrganizationId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub service_date: NaiveDate,
    pub assigned_processor_id: Option<UserId>,
    pub notes: Option<String>,
}

/// A claim against an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub claim_number: String,
    pub organization_id: OrganizationId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub status: ClaimStatus,
    pub service_date: NaiveDate,
    pub assigned_processor_id: Option<UserId>,
    pub denial_reason: Option<String>,
    pub notes: Option<String>,
    /// Append-only; never rewritten
    pub status_history: Vec<StatusChange>,
    pub submitted_by: UserId,
    /// First time the claim entered approved or rejected
    pub processed_at: Option<DateTime<Utc>>,
    /// First time the claim entered paid
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a submitted claim with its opening history entry
    pub fn submit(new: NewClaim, claim_number: String, submitted_by: UserId) -> Self {
        let now = Utc::now();

        Self {
            id: ClaimId::new_v7(),
            claim_number,
            organization_id: new.organization_id,
            patient_id: new.patient_id,
            provider_id: new.provider_id,
            diagnosis_code: new.diagnosis_code,
            amount: new.amount,
            status: ClaimStatus::Submitted,
            service_date: new.service_date,
            assigned_processor_id: new.assigned_processor_id,
            denial_reason: None,
            notes: new.notes,
            status_history: vec![StatusChange {
                from_status: None,
                to_status: ClaimStatus::Submitted,
                changed_by: Actor::user(submitted_by),
                changed_at: now,
                reason: None,
            }],
            submitted_by,
            processed_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the claim to `target`, appending a history entry
    ///
    /// # Errors
    ///
    /// * `NotModifiable` if the claim is approved or paid
    /// * `InvalidStatusTransition` for a self-transition or a return to submitted
    /// * `MissingDenialReason` when rejecting without a reason
    pub fn apply_status_change(
        &mut self,
        target: ClaimStatus,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<(), ClaimError> {
        self.ensure_modifiable()?;

        if !self.status.can_transition_to(target) {
            return Err(ClaimError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        if target == ClaimStatus::Rejected && reason.is_none() {
            return Err(ClaimError::MissingDenialReason);
        }

        let now = Utc::now();
        self.status_history.push(StatusChange {
            from_status: Some(self.status),
            to_status: target,
            changed_by: actor,
            changed_at: now,
            reason: reason.clone(),
        });
        self.status = target;

        match target {
            ClaimStatus::Approved => {
                self.processed_at.get_or_insert(now);
            }
            ClaimStatus::Rejected => {
                self.processed_at.get_or_insert(now);
                self.denial_reason = reason;
            }
            ClaimStatus::Paid => {
                self.paid_at.get_or_insert(now);
            }
            ClaimStatus::Submitted | ClaimStatus::UnderReview => {}
        }

        self.updated_at = now;
        Ok(())
    }

    /// Fails with `NotModifiable` for approved and paid claims
    pub fn ensure_modifiable(&self) -> Result<(), ClaimError> {
        if self.status.is_terminal() {
            return Err(ClaimError::NotModifiable {
                claim_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Most recent history entry
    pub fn last_change(&self) -> Option<&StatusChange> {
        self.status_history.last()
    }
}

impl ScopedEntity for Claim {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    fn scoped_claim_id(&self) -> Option<ClaimId> {
        Some(self.id)
    }

    fn scoped_provider_id(&self) -> Option<ProviderId> {
        Some(self.provider_id)
    }

    fn scoped_patient_id(&self) -> Option<PatientId> {
        Some(self.patient_id)
    }
}
