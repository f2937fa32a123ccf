//! Organization (tenant) entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::OrganizationId;

/// Per-tenant claim settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSettings {
    /// Smallest claim amount accepted at creation
    pub min_claim_amount: Decimal,
    /// Largest claim amount accepted at creation
    pub max_claim_amount: Decimal,
    /// Claims at or below this amount qualify for automatic approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_threshold: Option<Decimal>,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            min_claim_amount: Decimal::new(1, 2),
            max_claim_amount: Decimal::new(1_000_000, 0),
            auto_approve_threshold: None,
        }
    }
}

impl OrganizationSettings {
    /// Returns true when the amount lies inside the configured bounds
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_claim_amount && amount <= self.max_claim_amount
    }

    /// Returns true when the amount is small enough to be auto-approved
    pub fn qualifies_for_auto_approval(&self, amount: Decimal) -> bool {
        self.auto_approve_threshold
            .map(|threshold| amount <= threshold)
            .unwrap_or(false)
    }
}

/// An insurance company; the root of tenant isolation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub is_active: bool,
    pub settings: OrganizationSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Onboards a new active organization with default settings
    pub fn onboard(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrganizationId::new_v7(),
            name: name.into(),
            is_active: true,
            settings: OrganizationSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_settings(mut self, settings: OrganizationSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_bounds() {
        let settings = OrganizationSettings::default();
        assert!(settings.accepts_amount(dec!(150.00)));
        assert!(settings.accepts_amount(dec!(0.01)));
        assert!(!settings.accepts_amount(dec!(0)));
        assert!(!settings.accepts_amount(dec!(1000000.01)));
    }

    #[test]
    fn test_auto_approval_requires_threshold() {
        let mut settings = OrganizationSettings::default();
        assert!(!settings.qualifies_for_auto_approval(dec!(10)));

        settings.auto_approve_threshold = Some(dec!(100));
        assert!(settings.qualifies_for_auto_approval(dec!(100)));
        assert!(!settings.qualifies_for_auto_approval(dec!(100.01)));
    }

    #[test]
    fn test_settings_json_shape() {
        let json = serde_json::to_value(OrganizationSettings::default()).unwrap();
        assert!(json.get("minClaimAmount").is_some());
        assert!(json.get("autoApproveThreshold").is_none());
    }
}
