//! Claim number generation

use chrono::{Datelike, Utc};
use uuid::Uuid;

use core_kernel::OrganizationId;

/// Produces human-readable claim numbers
///
/// Uniqueness per organization is enforced by the store; the gateway retries
/// on collision.
pub trait ClaimNumberGenerator: Send + Sync {
    fn next_claim_number(&self, organization_id: OrganizationId) -> String;
}

/// `CLM-<year>-<7 digits>` with random digits
#[derive(Debug, Clone, Copy, Default)]
pub struct YearlyClaimNumbers;

impl ClaimNumberGenerator for YearlyClaimNumbers {
    fn next_claim_number(&self, _organization_id: OrganizationId) -> String {
        format!(
            "CLM-{}-{:07}",
            Utc::now().year(),
            Uuid::new_v4().as_u128() % 10_000_000
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_number_format() {
        let number = YearlyClaimNumbers.next_claim_number(OrganizationId::new());
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CLM");
        assert_eq!(parts[1], Utc::now().year().to_string());
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }
}
