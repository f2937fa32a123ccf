//! Pre-built Test Fixtures
//!
//! Reference data and access contexts for unit and scenario tests. Names and
//! identifiers are generated with `fake`, so two fixtures never collide on a
//! unique column.

use chrono::NaiveDate;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId, UserId};
use domain_claims::{Patient, Provider};
use domain_tenancy::{AccessContext, AssignedClaims, Organization, Role, RoleScope, User};

/// Diagnosis codes accepted by claim validation
pub const DIAGNOSIS_CODES: [&str; 6] = ["J06.9", "E11", "S72.001A", "I10", "M54.5", "K21.9"];

/// Fixture for tenant reference data
pub struct ReferenceFixtures;

impl ReferenceFixtures {
    /// An active organization with default claim bounds
    pub fn organization() -> Organization {
        Organization::onboard(CompanyName().fake::<String>())
    }

    pub fn provider(organization_id: OrganizationId) -> Provider {
        let name = format!("{} Family Practice", LastName().fake::<String>());
        Provider::new(organization_id, name, Self::npi())
    }

    pub fn patient(organization_id: OrganizationId) -> Patient {
        Patient::new(
            organization_id,
            FirstName().fake::<String>(),
            LastName().fake::<String>(),
            DateFixtures::date_of_birth(),
            Self::member_number(),
        )
    }

    /// Ten-digit national provider identifier
    pub fn npi() -> String {
        (1_000_000_000u64..10_000_000_000u64).fake::<u64>().to_string()
    }

    pub fn member_number() -> String {
        format!("MBR-{:08}", (0u32..100_000_000u32).fake::<u32>())
    }

    pub fn diagnosis_code() -> &'static str {
        DIAGNOSIS_CODES[(0..DIAGNOSIS_CODES.len()).fake::<usize>()]
    }
}

/// Fixture for user accounts
pub struct UserFixtures;

impl UserFixtures {
    pub fn user(organization_id: OrganizationId, role: Role) -> User {
        User::new(
            organization_id,
            SafeEmail().fake::<String>(),
            Name().fake::<String>(),
            role,
        )
    }

    pub fn admin(organization_id: OrganizationId) -> User {
        Self::user(organization_id, Role::Admin)
    }

    pub fn processor(organization_id: OrganizationId) -> User {
        Self::user(organization_id, Role::ClaimsProcessor)
    }

    /// Provider account linked to `provider_id`
    pub fn provider(organization_id: OrganizationId, provider_id: ProviderId) -> User {
        let mut user = Self::user(organization_id, Role::Provider);
        user.provider_id = Some(provider_id);
        user
    }

    /// Patient account linked to `patient_id`
    pub fn patient(organization_id: OrganizationId, patient_id: PatientId) -> User {
        let mut user = Self::user(organization_id, Role::Patient);
        user.patient_id = Some(patient_id);
        user
    }
}

/// Fixture for access contexts built without a directory round trip
pub struct ContextFixtures;

impl ContextFixtures {
    pub fn admin(organization_id: OrganizationId) -> AccessContext {
        AccessContext::new(organization_id, UserId::new_v7(), RoleScope::Admin)
    }

    /// Claims processor assigned exactly `claim_ids`
    ///
    /// # Panics
    ///
    /// Panics if more ids are given than an assignment set may hold.
    pub fn processor(
        organization_id: OrganizationId,
        claim_ids: impl IntoIterator<Item = ClaimId>,
    ) -> AccessContext {
        let assigned_claims =
            AssignedClaims::try_from_ids(claim_ids).expect("assignment set within limit");
        AccessContext::new(
            organization_id,
            UserId::new_v7(),
            RoleScope::ClaimsProcessor { assigned_claims },
        )
    }

    pub fn provider(organization_id: OrganizationId, provider_id: ProviderId) -> AccessContext {
        AccessContext::new(
            organization_id,
            UserId::new_v7(),
            RoleScope::Provider {
                provider_id: Some(provider_id),
            },
        )
    }

    pub fn patient(organization_id: OrganizationId, patient_id: PatientId) -> AccessContext {
        AccessContext::new(
            organization_id,
            UserId::new_v7(),
            RoleScope::Patient {
                patient_id: Some(patient_id),
            },
        )
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// A past service date inside every test's reporting window
    pub fn service_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).expect("valid date")
    }

    pub fn date_of_birth() -> NaiveDate {
        NaiveDate::from_ymd_opt(1980, 3, 14).expect("valid date")
    }
}

/// Fixture for claim amounts
pub struct AmountFixtures;

impl AmountFixtures {
    pub fn routine() -> Decimal {
        dec!(150.00)
    }

    pub fn large() -> Decimal {
        dec!(48250.75)
    }

    /// Smallest amount the default settings accept
    pub fn minimum() -> Decimal {
        dec!(0.01)
    }

    /// One cent above the default ceiling
    pub fn over_limit() -> Decimal {
        dec!(1000000.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_claims::validation::normalize_diagnosis_code;
    use domain_tenancy::OrganizationSettings;

    #[test]
    fn test_diagnosis_codes_are_valid() {
        for code in DIAGNOSIS_CODES {
            assert_eq!(normalize_diagnosis_code(code).unwrap(), code);
        }
    }

    #[test]
    fn test_npi_is_ten_digits() {
        let npi = ReferenceFixtures::npi();
        assert_eq!(npi.len(), 10);
        assert!(npi.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_amount_bounds_match_default_settings() {
        let settings = OrganizationSettings::default();
        assert!(settings.accepts_amount(AmountFixtures::minimum()));
        assert!(settings.accepts_amount(AmountFixtures::large()));
        assert!(!settings.accepts_amount(AmountFixtures::over_limit()));
    }

    #[test]
    fn test_linked_accounts_carry_scope_ids() {
        let organization = ReferenceFixtures::organization();
        let provider = ReferenceFixtures::provider(organization.id);
        let user = UserFixtures::provider(organization.id, provider.id);
        assert_eq!(user.role, Role::Provider);
        assert_eq!(user.provider_id, Some(provider.id));
        assert!(user.is_active);
    }
}
