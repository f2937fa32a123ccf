//! Patient event processors
//!
//! Each processor moves a patient's claims from a set of source statuses to
//! a target status. All three share one algorithm and differ only in their
//! [`TransitionRule`]:
//!
//! 1. A completed ledger entry for the key short-circuits to its stored result
//! 2. Otherwise the entry is created (or re-opened for retry)
//! 3. Matching claims are transitioned one by one through the gateway's
//!    trusted path; the first failure aborts the run
//! 4. The ledger entry is completed with the result, or failed with the error
//!
//! Claims moved before a failure stay moved. A retry finds only the claims
//! still in a source status, so repeated attempts converge.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::ClaimId;
use domain_claims::{Actor, ClaimGateway, ClaimStatus, InternalTransition};
use domain_tenancy::permissions::{can_record_patient_events, require_permission};

use crate::error::JobError;
use crate::event::PatientEventType;
use crate::ledger::{JobLedger, JobProcessingLog};
use crate::payload::JobPayload;

/// Source statuses, target status and reason for one event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub event_type: PatientEventType,
    pub from: &'static [ClaimStatus],
    pub to: ClaimStatus,
    pub reason: &'static str,
}

impl TransitionRule {
    pub const ADMISSION: TransitionRule = TransitionRule {
        event_type: PatientEventType::Admission,
        from: &[ClaimStatus::Submitted],
        to: ClaimStatus::UnderReview,
        reason: "Patient admitted; claim moved to review",
    };

    pub const DISCHARGE: TransitionRule = TransitionRule {
        event_type: PatientEventType::Discharge,
        from: &[ClaimStatus::UnderReview, ClaimStatus::Submitted],
        to: ClaimStatus::Approved,
        reason: "Patient discharged; claim approved",
    };

    pub const TREATMENT_INITIATED: TransitionRule = TransitionRule {
        event_type: PatientEventType::TreatmentInitiated,
        from: &[ClaimStatus::Submitted],
        to: ClaimStatus::UnderReview,
        reason: "Treatment initiated; claim moved to review",
    };

    pub fn for_event(event_type: PatientEventType) -> Self {
        match event_type {
            PatientEventType::Admission => Self::ADMISSION,
            PatientEventType::Discharge => Self::DISCHARGE,
            PatientEventType::TreatmentInitiated => Self::TREATMENT_INITIATED,
        }
    }

    fn transition(&self) -> InternalTransition {
        InternalTransition {
            from: self.from.to_vec(),
            to: self.to,
            reason: self.reason.to_string(),
            actor: Actor::system(self.event_type.job_name()),
        }
    }
}

/// Result payload frozen into the ledger on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub claims_updated: usize,
    pub claim_ids: Vec<ClaimId>,
}

/// Runs one event type's rule through the ledger
#[derive(Clone)]
pub struct PatientEventProcessor {
    rule: TransitionRule,
    ledger: Arc<dyn JobLedger>,
    claims: ClaimGateway,
}

impl PatientEventProcessor {
    pub fn new(rule: TransitionRule, ledger: Arc<dyn JobLedger>, claims: ClaimGateway) -> Self {
        Self { rule, ledger, claims }
    }

    pub fn rule(&self) -> TransitionRule {
        self.rule
    }

    /// Processes a job, returning the same result for every call with the
    /// same idempotency key once one call has completed
    ///
    /// # Errors
    ///
    /// Deterministic failures (wrong job type, forbidden trigger) are raised
    /// before the ledger is touched. Every failure after that is recorded on
    /// the ledger entry and re-raised.
    #[instrument(
        skip(self, payload),
        fields(
            job_type = %self.rule.event_type,
            organization_id = %payload.organization_id,
            idempotency_key = %payload.idempotency_key
        )
    )]
    pub async fn process(&self, payload: &JobPayload) -> Result<ProcessingResult, JobError> {
        if payload.job_type != self.rule.event_type {
            return Err(JobError::InvalidPayload(format!(
                "{} job sent to {} processor",
                payload.job_type, self.rule.event_type
            )));
        }
        let role = payload.triggered_by.role;
        require_permission(can_record_patient_events(role), "trigger patient event processing", role)?;

        let entry = match self.open_entry(payload).await? {
            LedgerState::Completed(result) => {
                debug!("idempotency key already completed; returning stored result");
                return Ok(result);
            }
            LedgerState::Open(entry) => entry,
        };

        match self.apply_rule(payload).await {
            Ok(result) => {
                let stored = self
                    .ledger
                    .mark_completed(entry.id, serde_json::to_value(&result)?)
                    .await?;
                info!(claims_updated = result.claims_updated, "patient event processed");
                stored_result(&stored).unwrap_or(Ok(result))
            }
            Err(err) => {
                warn!(error = %err, retry_count = entry.retry_count, "patient event processing failed");
                if let Err(mark_err) = self.ledger.mark_failed(entry.id, &err.to_string()).await {
                    warn!(error = %mark_err, "could not record failure on ledger entry");
                }
                Err(err)
            }
        }
    }

    async fn open_entry(&self, payload: &JobPayload) -> Result<LedgerState, JobError> {
        let existing = self
            .ledger
            .find_by_idempotency_key(payload.organization_id, &payload.idempotency_key)
            .await?;

        let entry = match existing {
            Some(entry) => entry,
            None => {
                let entry = JobProcessingLog::start(
                    payload.organization_id,
                    payload.idempotency_key.clone(),
                    self.rule.event_type,
                    serde_json::to_value(payload)?,
                );
                match self.ledger.create(&entry).await {
                    Ok(()) => return Ok(LedgerState::Open(entry)),
                    Err(err) if err.is_conflict() => {
                        debug!("concurrent ledger insert; re-fetching entry");
                        self.ledger
                            .find_by_idempotency_key(payload.organization_id, &payload.idempotency_key)
                            .await?
                            .ok_or_else(|| JobError::not_found("JobProcessingLog", &payload.idempotency_key))?
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        if entry.job_type != self.rule.event_type {
            return Err(JobError::IdempotencyConflict {
                key: payload.idempotency_key.clone(),
            });
        }

        if let Some(result) = stored_result(&entry) {
            return result.map(LedgerState::Completed);
        }

        match self.ledger.begin_retry(entry.id).await {
            Ok(reopened) => Ok(LedgerState::Open(reopened)),
            Err(err) if err.is_conflict() => {
                // Completed between our read and the retry
                let completed = self
                    .ledger
                    .find_by_idempotency_key(payload.organization_id, &payload.idempotency_key)
                    .await?
                    .ok_or_else(|| JobError::not_found("JobProcessingLog", &payload.idempotency_key))?;
                stored_result(&completed)
                    .unwrap_or_else(|| Err(JobError::AlreadyCompleted(completed.id.to_string())))
                    .map(LedgerState::Completed)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_rule(&self, payload: &JobPayload) -> Result<ProcessingResult, JobError> {
        let claims = self
            .claims
            .find_by_patient_id_internal(payload.organization_id, payload.patient_id, self.rule.from)
            .await?;

        let mut claim_ids = Vec::with_capacity(claims.len());
        for claim in claims {
            let updated = self
                .claims
                .update_status_internal(payload.organization_id, claim.id, self.rule.transition())
                .await?;
            if let Some(updated) = updated {
                claim_ids.push(updated.id);
            }
        }

        Ok(ProcessingResult {
            claims_updated: claim_ids.len(),
            claim_ids,
        })
    }
}

enum LedgerState {
    Completed(ProcessingResult),
    Open(JobProcessingLog),
}

/// Decodes the frozen result of a completed entry
fn stored_result(entry: &JobProcessingLog) -> Option<Result<ProcessingResult, JobError>> {
    if !entry.is_completed() {
        return None;
    }
    let result = entry.result.clone()?;
    Some(serde_json::from_value(result).map_err(JobError::from))
}
