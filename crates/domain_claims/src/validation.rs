//! Claim input validation

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use domain_tenancy::OrganizationSettings;
use crate::error::ClaimError;

/// Amounts carry at most cents
const MAX_AMOUNT_SCALE: u32 = 2;

/// Validates and normalizes an ICD-10 diagnosis code
///
/// Accepted shape: one letter, two alphanumerics, then optionally a dot and
/// one to four alphanumerics (`J06.9`, `S72.001A`, `E11`). Input is trimmed
/// and upper-cased first.
pub fn normalize_diagnosis_code(raw: &str) -> Result<String, ClaimError> {
    let code = raw.trim().to_ascii_uppercase();
    let invalid = || ClaimError::InvalidDiagnosisCode(raw.to_string());

    let (category, subcategory) = match code.split_once('.') {
        Some((category, subcategory)) => (category, Some(subcategory)),
        None => (code.as_str(), None),
    };

    let mut chars = category.chars();
    let head_ok = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    let rest: Vec<char> = chars.collect();
    if !head_ok || rest.len() != 2 || !rest.iter().all(char::is_ascii_alphanumeric) {
        return Err(invalid());
    }

    if let Some(subcategory) = subcategory {
        let len = subcategory.len();
        if !(1..=4).contains(&len) || !subcategory.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
    }

    Ok(code)
}

/// Checks the amount is positive, in cents, and inside the organization's bounds
pub fn validate_amount(amount: Decimal, settings: &OrganizationSettings) -> Result<(), ClaimError> {
    if amount <= Decimal::ZERO
        || amount.normalize().scale() > MAX_AMOUNT_SCALE
        || !settings.accepts_amount(amount)
    {
        return Err(ClaimError::InvalidClaimAmount {
            amount,
            min: settings.min_claim_amount,
            max: settings.max_claim_amount,
        });
    }
    Ok(())
}

pub fn validate_service_date(service_date: NaiveDate) -> Result<(), ClaimError> {
    if service_date > Utc::now().date_naive() {
        return Err(ClaimError::ServiceDateInFuture(service_date));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accepts_common_codes() {
        assert_eq!(normalize_diagnosis_code("J06.9").unwrap(), "J06.9");
        assert_eq!(normalize_diagnosis_code(" s72.001a ").unwrap(), "S72.001A");
        assert_eq!(normalize_diagnosis_code("E11").unwrap(), "E11");
    }

    #[test]
    fn test_rejects_malformed_codes() {
        for code in ["", "06.9", "J0", "J06.", "J06.12345", "J06-9", "JJ06.9"] {
            assert!(
                matches!(normalize_diagnosis_code(code), Err(ClaimError::InvalidDiagnosisCode(_))),
                "{code} should be rejected"
            );
        }
    }

    #[test]
    fn test_amount_bounds() {
        let settings = OrganizationSettings {
            min_claim_amount: dec!(10),
            max_claim_amount: dec!(500),
            auto_approve_threshold: None,
        };

        assert!(validate_amount(dec!(150.00), &settings).is_ok());
        assert!(validate_amount(dec!(9.99), &settings).is_err());
        assert!(validate_amount(dec!(500.01), &settings).is_err());
        assert!(validate_amount(dec!(-5), &settings).is_err());
        assert!(validate_amount(dec!(20.001), &settings).is_err());
    }

    #[test]
    fn test_future_service_date_rejected() {
        let tomorrow = Utc::now().date_naive().succ_opt().unwrap();
        assert!(validate_service_date(tomorrow).is_err());
        assert!(validate_service_date(Utc::now().date_naive()).is_ok());
    }

    proptest! {
        #[test]
        fn well_formed_codes_are_accepted(code in "[A-Z][0-9][0-9A-Z](\\.[0-9A-Z]{1,4})?") {
            prop_assert_eq!(normalize_diagnosis_code(&code).unwrap(), code);
        }

        #[test]
        fn codes_without_leading_letter_are_rejected(code in "[0-9][0-9A-Z]{2}(\\.[0-9A-Z]{1,4})?") {
            prop_assert!(normalize_diagnosis_code(&code).is_err());
        }
    }
}
