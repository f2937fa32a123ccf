//! Tenant-scoped claim gateway
//!
//! All claim access goes through [`ClaimGateway`]. User-facing operations
//! derive a [`DataScope`] from the caller's [`AccessContext`]; the two
//! `*_internal` operations are the trusted path for background processors
//! and scope by organization only.
//!
//! A claim outside the caller's scope is reported as not found, exactly
//! like a claim that does not exist.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{ClaimId, ErrorKind, OrganizationId, PatientId, ProviderId, UserId};
use domain_tenancy::permissions::{can_create_claims, can_update_claim_status, require_permission};
use domain_tenancy::{AccessContext, AccessError, AuditLogEntry, DataScope, Role};

use crate::claim::{Actor, Claim, ClaimStatus, NewClaim};
use crate::error::ClaimError;
use crate::numbering::ClaimNumberGenerator;
use crate::ports::{ClaimStore, ModifyOutcome, ReferenceStore};
use crate::query::{ClaimFilter, ClaimQuery, ClaimSort, Page, Pagination, SortDirection, SortField};
use crate::validation::{normalize_diagnosis_code, validate_amount, validate_service_date};

/// Attempts at finding an unused claim number before giving up
pub const MAX_CLAIM_NUMBER_ATTEMPTS: usize = 5;

/// Upper bound on ids per bulk status update
pub const MAX_BULK_UPDATE: usize = 100;

/// Request to create a claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaim {
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub service_date: NaiveDate,
    #[serde(default)]
    pub assigned_processor_id: Option<UserId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request to move a claim to a new status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ClaimStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ClaimStatus) -> Self {
        Self { status, reason: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Trusted transition requested by a background processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalTransition {
    /// Statuses the claim must still be in when the row is locked
    pub from: Vec<ClaimStatus>,
    pub to: ClaimStatus,
    pub reason: String,
    pub actor: Actor,
}

/// Per-id failure of a bulk update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub claim_id: ClaimId,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a bulk update; every requested id lands in exactly one list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateResult {
    pub updated: Vec<Claim>,
    pub failed: Vec<BulkFailure>,
}

/// Gateway for every claim read and write
#[derive(Clone)]
pub struct ClaimGateway {
    claims: Arc<dyn ClaimStore>,
    references: Arc<dyn ReferenceStore>,
    numbers: Arc<dyn ClaimNumberGenerator>,
}

impl ClaimGateway {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        references: Arc<dyn ReferenceStore>,
        numbers: Arc<dyn ClaimNumberGenerator>,
    ) -> Self {
        Self {
            claims,
            references,
            numbers,
        }
    }

    /// Finds a claim visible to the caller
    #[instrument(skip(self, context), fields(organization_id = %context.organization_id(), role = %context.role()))]
    pub async fn find_by_id(&self, context: &AccessContext, id: ClaimId) -> Result<Claim, ClaimError> {
        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Err(ClaimError::not_found("Claim", id));
        }

        self.claims
            .find_claim(&scope, id)
            .await?
            .ok_or_else(|| ClaimError::not_found("Claim", id))
    }

    /// Lists claims visible to the caller
    #[instrument(skip(self, context, filter), fields(organization_id = %context.organization_id(), role = %context.role()))]
    pub async fn find_many(
        &self,
        context: &AccessContext,
        filter: ClaimFilter,
        sort: ClaimSort,
        pagination: Pagination,
    ) -> Result<Page<Claim>, ClaimError> {
        filter.validate()?;
        let pagination = Pagination::new(pagination.page, pagination.per_page)?;

        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Ok(Page::empty(pagination));
        }

        let total = self.claims.count_claims(&scope, &filter).await?;
        let items = self
            .claims
            .find_claims(&scope, &ClaimQuery::paged(filter, sort, pagination))
            .await?;

        Ok(Page {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }

    /// Counts claims visible to the caller
    pub async fn count(&self, context: &AccessContext, filter: &ClaimFilter) -> Result<u64, ClaimError> {
        filter.validate()?;
        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Ok(0);
        }
        Ok(self.claims.count_claims(&scope, filter).await?)
    }

    /// Sums the amounts of claims visible to the caller
    pub async fn sum_amount(
        &self,
        context: &AccessContext,
        filter: &ClaimFilter,
    ) -> Result<Decimal, ClaimError> {
        filter.validate()?;
        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Ok(Decimal::ZERO);
        }
        Ok(self.claims.sum_claim_amounts(&scope, filter).await?)
    }

    /// Creates a submitted claim
    ///
    /// # Errors
    ///
    /// * `Forbidden` for patients, and for providers filing under another
    ///   provider id (checked before the provider lookup)
    /// * `Validation` for a malformed diagnosis code, an out-of-bounds
    ///   amount or a future service date
    /// * `TenantAccessDenied` when the organization is inactive
    /// * `NotFound` when the patient or provider is not in the organization
    #[instrument(skip(self, context, request), fields(organization_id = %context.organization_id(), role = %context.role()))]
    pub async fn create(&self, context: &AccessContext, request: CreateClaim) -> Result<Claim, ClaimError> {
        let role = context.role();
        require_permission(can_create_claims(role), "create claims", role)?;

        if role == Role::Provider && context.provider_id() != Some(request.provider_id) {
            warn!(
                user_id = %context.user_id(),
                requested_provider_id = %request.provider_id,
                "provider attempted to file a claim for another provider"
            );
            return Err(AccessError::forbidden("create claims for another provider", role).into());
        }

        let diagnosis_code = normalize_diagnosis_code(&request.diagnosis_code)?;
        validate_service_date(request.service_date)?;

        let organization = self
            .references
            .find_organization(context.organization_id())
            .await?
            .ok_or_else(|| AccessError::TenantAccessDenied(context.organization_id()))?;
        if !organization.is_active {
            return Err(AccessError::TenantAccessDenied(organization.id).into());
        }
        validate_amount(request.amount, &organization.settings)?;

        self.references
            .find_patient(organization.id, request.patient_id)
            .await?
            .ok_or_else(|| ClaimError::not_found("Patient", request.patient_id))?;
        self.references
            .find_provider(organization.id, request.provider_id)
            .await?
            .ok_or_else(|| ClaimError::not_found("Provider", request.provider_id))?;

        let new_claim = NewClaim {
            organization_id: organization.id,
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            diagnosis_code,
            amount: request.amount,
            service_date: request.service_date,
            assigned_processor_id: request.assigned_processor_id,
            notes: request.notes,
        };

        let claim = self.insert_with_fresh_number(new_claim, context.user_id()).await?;

        info!(claim_id = %claim.id, claim_number = %claim.claim_number, "claim submitted");
        AuditLogEntry::new(
            claim.organization_id,
            Some(context.user_id()),
            "claim.created",
            "claim",
            claim.id,
        )
        .emit();

        Ok(claim)
    }

    async fn insert_with_fresh_number(&self, new_claim: NewClaim, submitted_by: UserId) -> Result<Claim, ClaimError> {
        for attempt in 1..=MAX_CLAIM_NUMBER_ATTEMPTS {
            let number = self.numbers.next_claim_number(new_claim.organization_id);
            let claim = Claim::submit(new_claim.clone(), number, submitted_by);

            match self.claims.insert_claim(&claim).await {
                Ok(()) => return Ok(claim),
                Err(err) if err.is_conflict() => {
                    debug!(attempt, claim_number = %claim.claim_number, "claim number collision");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ClaimError::Conflict(format!(
            "no unused claim number after {MAX_CLAIM_NUMBER_ATTEMPTS} attempts"
        )))
    }

    /// Moves a visible claim to a new status in one transaction
    ///
    /// Checks run in order: visibility (`NotFound`), terminal status
    /// (`ClaimNotModifiable`), processor assignment (`Forbidden`), then the
    /// transition table.
    #[instrument(skip(self, context, update), fields(organization_id = %context.organization_id(), role = %context.role(), to = %update.status))]
    pub async fn update_status(
        &self,
        context: &AccessContext,
        id: ClaimId,
        update: StatusUpdate,
    ) -> Result<Claim, ClaimError> {
        let role = context.role();
        require_permission(can_update_claim_status(role), "update claim status", role)?;
        self.apply_user_update(context, id, update).await
    }

    async fn apply_user_update(
        &self,
        context: &AccessContext,
        id: ClaimId,
        update: StatusUpdate,
    ) -> Result<Claim, ClaimError> {
        let scope = DataScope::for_context(context);
        if scope.matches_nothing() {
            return Err(ClaimError::not_found("Claim", id));
        }

        let caller = context.user_id();
        let check_assignment = context.role() == Role::ClaimsProcessor;
        let StatusUpdate { status, reason } = update;

        let outcome = self
            .claims
            .modify_claim(
                &scope,
                id,
                Box::new(move |claim: &mut Claim| {
                    claim.ensure_modifiable()?;
                    if check_assignment && claim.assigned_processor_id != Some(caller) {
                        return Err(ClaimError::NotAssignedToCaller(claim.id));
                    }
                    claim.apply_status_change(status, Actor::user(caller), reason)
                }),
            )
            .await?;

        match outcome {
            ModifyOutcome::Updated(claim) => {
                info!(claim_id = %claim.id, status = %claim.status, "claim status updated");
                AuditLogEntry::new(
                    claim.organization_id,
                    Some(caller),
                    format!("claim.status.{}", claim.status),
                    "claim",
                    claim.id,
                )
                .emit();
                Ok(claim)
            }
            ModifyOutcome::NotFound => Err(ClaimError::not_found("Claim", id)),
            ModifyOutcome::Rejected(err) => Err(err),
        }
    }

    /// Applies the same update to each id independently
    ///
    /// Failures are collected per id and never roll back other ids. Ids are
    /// deduplicated, keeping the first occurrence.
    #[instrument(skip(self, context, ids, update), fields(organization_id = %context.organization_id(), count = ids.len()))]
    pub async fn bulk_update_status(
        &self,
        context: &AccessContext,
        ids: &[ClaimId],
        update: StatusUpdate,
    ) -> Result<BulkUpdateResult, ClaimError> {
        let role = context.role();
        require_permission(can_update_claim_status(role), "update claim status", role)?;

        let mut seen = HashSet::new();
        let unique: Vec<ClaimId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.len() > MAX_BULK_UPDATE {
            return Err(ClaimError::BulkLimitExceeded {
                count: unique.len(),
                max: MAX_BULK_UPDATE,
            });
        }

        let mut result = BulkUpdateResult {
            updated: Vec::with_capacity(unique.len()),
            failed: Vec::new(),
        };

        for id in unique {
            match self.apply_user_update(context, id, update.clone()).await {
                Ok(claim) => result.updated.push(claim),
                Err(err) => {
                    debug!(claim_id = %id, error = %err, "bulk update skipped claim");
                    result.failed.push(BulkFailure {
                        claim_id: id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            updated = result.updated.len(),
            failed = result.failed.len(),
            "bulk status update finished"
        );
        Ok(result)
    }

    /// Claims of a patient in the given statuses, organization scope only
    ///
    /// Trusted path for background processors.
    #[instrument(skip(self, statuses))]
    pub async fn find_by_patient_id_internal(
        &self,
        organization_id: OrganizationId,
        patient_id: PatientId,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, ClaimError> {
        let scope = DataScope::organization(organization_id);
        let query = ClaimQuery::unpaged(
            ClaimFilter::for_patient(patient_id, statuses),
            ClaimSort::new(SortField::CreatedAt, SortDirection::Asc),
        );
        Ok(self.claims.find_claims(&scope, &query).await?)
    }

    /// Transitions a claim with system authority, organization scope only
    ///
    /// Returns `Ok(None)` without writing when the claim is approved or paid,
    /// or has already left `transition.from`. The state machine still
    /// applies to everything else.
    #[instrument(skip(self, transition), fields(to = %transition.to))]
    pub async fn update_status_internal(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
        transition: InternalTransition,
    ) -> Result<Option<Claim>, ClaimError> {
        let scope = DataScope::organization(organization_id);
        let InternalTransition {
            from,
            to,
            reason,
            actor,
        } = transition;

        let outcome = self
            .claims
            .modify_claim(
                &scope,
                id,
                Box::new(move |claim: &mut Claim| {
                    claim.ensure_modifiable()?;
                    if !from.contains(&claim.status) {
                        return Err(ClaimError::StaleStatus {
                            claim_id: claim.id,
                            status: claim.status,
                        });
                    }
                    claim.apply_status_change(to, actor, Some(reason))
                }),
            )
            .await?;

        match outcome {
            ModifyOutcome::Updated(claim) => {
                AuditLogEntry::new(
                    claim.organization_id,
                    None,
                    format!("claim.status.{}", claim.status),
                    "claim",
                    claim.id,
                )
                .emit();
                Ok(Some(claim))
            }
            ModifyOutcome::Rejected(
                ClaimError::NotModifiable { status, .. } | ClaimError::StaleStatus { status, .. },
            ) => {
                debug!(claim_id = %id, %status, "internal transition skipped");
                Ok(None)
            }
            ModifyOutcome::Rejected(err) => Err(err),
            ModifyOutcome::NotFound => Err(ClaimError::not_found("Claim", id)),
        }
    }
}
