//! Filter, sort and pagination for claim listings

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use core_kernel::{PatientId, ProviderId, UserId};
use crate::claim::{Claim, ClaimStatus};
use crate::error::ClaimError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Column-level claim filter; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFilter {
    /// Empty means any status
    #[serde(default)]
    pub statuses: Vec<ClaimStatus>,
    pub patient_id: Option<PatientId>,
    pub provider_id: Option<ProviderId>,
    pub assigned_processor_id: Option<UserId>,
    pub service_date_from: Option<NaiveDate>,
    pub service_date_to: Option<NaiveDate>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

impl ClaimFilter {
    pub fn for_patient(patient_id: PatientId, statuses: &[ClaimStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[ClaimStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Rejects inverted ranges
    pub fn validate(&self) -> Result<(), ClaimError> {
        if let (Some(from), Some(to)) = (self.service_date_from, self.service_date_to) {
            if from > to {
                return Err(ClaimError::InvalidQuery(
                    "serviceDateFrom is after serviceDateTo".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(ClaimError::InvalidQuery(
                    "minAmount is greater than maxAmount".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&claim.status))
            && self.patient_id.map_or(true, |id| claim.patient_id == id)
            && self.provider_id.map_or(true, |id| claim.provider_id == id)
            && self
                .assigned_processor_id
                .map_or(true, |id| claim.assigned_processor_id == Some(id))
            && self.service_date_from.map_or(true, |d| claim.service_date >= d)
            && self.service_date_to.map_or(true, |d| claim.service_date <= d)
            && self.min_amount.map_or(true, |a| claim.amount >= a)
            && self.max_amount.map_or(true, |a| claim.amount <= a)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    ServiceDate,
    Amount,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Sort order; ties break on claim id so pages are stable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl ClaimSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn compare(&self, a: &Claim, b: &Claim) -> Ordering {
        let ordering = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::ServiceDate => a.service_date.cmp(&b.service_date),
            SortField::Amount => a.amount.cmp(&b.amount),
            SortField::Status => a.status.rank().cmp(&b.status.rank()),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// One-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Result<Self, ClaimError> {
        if page == 0 {
            return Err(ClaimError::InvalidQuery("page starts at 1".to_string()));
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(ClaimError::InvalidQuery(format!(
                "perPage must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(Self { page, per_page })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// A complete listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimQuery {
    pub filter: ClaimFilter,
    pub sort: ClaimSort,
    /// `None` returns every match; only the internal path uses it
    pub pagination: Option<Pagination>,
}

impl ClaimQuery {
    pub fn paged(filter: ClaimFilter, sort: ClaimSort, pagination: Pagination) -> Self {
        Self {
            filter,
            sort,
            pagination: Some(pagination),
        }
    }

    pub fn unpaged(filter: ClaimFilter, sort: ClaimSort) -> Self {
        Self {
            filter,
            sort,
            pagination: None,
        }
    }

    /// Sorts and windows an already-filtered set in memory
    pub fn apply(&self, mut claims: Vec<Claim>) -> Vec<Claim> {
        claims.sort_by(|a, b| self.sort.compare(a, b));
        match self.pagination {
            Some(page) => claims
                .into_iter()
                .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                .take(page.per_page as usize)
                .collect(),
            None => claims,
        }
    }
}

/// A page of results with the total under the same scope and filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: pagination.page,
            per_page: pagination.per_page,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        assert!(Pagination::new(0, 10).is_err());
        assert!(Pagination::new(1, 0).is_err());
        assert!(Pagination::new(1, MAX_PER_PAGE + 1).is_err());
        assert_eq!(Pagination::new(3, 25).unwrap().offset(), 50);
    }

    #[test]
    fn test_inverted_ranges_rejected() {
        let filter = ClaimFilter {
            min_amount: Some(Decimal::new(500, 0)),
            max_amount: Some(Decimal::new(100, 0)),
            ..ClaimFilter::default()
        };
        assert!(matches!(filter.validate(), Err(ClaimError::InvalidQuery(_))));
    }

    #[test]
    fn test_total_pages() {
        let page: Page<()> = Page {
            items: vec![],
            total: 41,
            page: 1,
            per_page: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
