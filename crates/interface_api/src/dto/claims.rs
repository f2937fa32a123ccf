//! Claims DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{ClaimId, PatientId, ProviderId, UserId};
use domain_claims::{
    ClaimFilter, ClaimSort, ClaimStatus, CreateClaim, Pagination, SortDirection, SortField,
    StatusUpdate,
};

use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaimRequest {
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    #[validate(length(min = 3, max = 8))]
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub service_date: NaiveDate,
    #[serde(default)]
    pub assigned_processor_id: Option<UserId>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<CreateClaimRequest> for CreateClaim {
    fn from(request: CreateClaimRequest) -> Self {
        CreateClaim {
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            diagnosis_code: request.diagnosis_code.trim().to_string(),
            amount: request.amount,
            service_date: request.service_date,
            assigned_processor_id: request.assigned_processor_id,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: ClaimStatus,
    #[serde(default)]
    #[validate(length(min = 1, max = 1000))]
    pub reason: Option<String>,
}

impl From<UpdateStatusRequest> for StatusUpdate {
    fn from(request: UpdateStatusRequest) -> Self {
        StatusUpdate {
            status: request.status,
            reason: request.reason,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    #[validate(length(min = 1))]
    pub claim_ids: Vec<ClaimId>,
    pub status: ClaimStatus,
    #[serde(default)]
    #[validate(length(min = 1, max = 1000))]
    pub reason: Option<String>,
}

impl BulkStatusRequest {
    pub fn into_parts(self) -> (Vec<ClaimId>, StatusUpdate) {
        (
            self.claim_ids,
            StatusUpdate {
                status: self.status,
                reason: self.reason,
            },
        )
    }
}

/// Query string of `GET /claims` and `GET /claims/summary`
///
/// `status` takes a comma-separated list, e.g. `status=submitted,under_review`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClaimsParams {
    pub status: Option<String>,
    pub patient_id: Option<PatientId>,
    pub provider_id: Option<ProviderId>,
    pub assigned_processor_id: Option<UserId>,
    pub service_date_from: Option<NaiveDate>,
    pub service_date_to: Option<NaiveDate>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortDirection>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListClaimsParams {
    pub fn filter(&self) -> Result<ClaimFilter, ApiError> {
        let statuses = match self.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| part.parse::<ClaimStatus>())
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(ClaimFilter {
            statuses,
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            assigned_processor_id: self.assigned_processor_id,
            service_date_from: self.service_date_from,
            service_date_to: self.service_date_to,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
        })
    }

    pub fn sort(&self) -> ClaimSort {
        ClaimSort::new(
            self.sort_by.unwrap_or_default(),
            self.sort_order.unwrap_or_default(),
        )
    }

    pub fn pagination(&self) -> Result<Pagination, ApiError> {
        let defaults = Pagination::default();
        Ok(Pagination::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSummaryResponse {
    pub count: u64,
    pub total_amount: Decimal,
}
