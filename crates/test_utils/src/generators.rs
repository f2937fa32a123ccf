//! Property-Based Test Generators
//!
//! Proptest strategies that only produce values the domain accepts, plus a
//! few that deliberately do not.

use chrono::NaiveDate;
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::ClaimId;
use domain_claims::ClaimStatus;
use domain_jobs::PatientEventType;
use domain_tenancy::Role;

pub fn claim_status_strategy() -> impl Strategy<Value = ClaimStatus> {
    prop::sample::select(ClaimStatus::ALL.to_vec())
}

/// Statuses a claim may still leave
pub fn mutable_status_strategy() -> impl Strategy<Value = ClaimStatus> {
    prop::sample::select(
        ClaimStatus::ALL
            .into_iter()
            .filter(|status| !status.is_terminal())
            .collect::<Vec<_>>(),
    )
}

pub fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Admin),
        Just(Role::ClaimsProcessor),
        Just(Role::Provider),
        Just(Role::Patient),
    ]
}

pub fn event_type_strategy() -> impl Strategy<Value = PatientEventType> {
    prop_oneof![
        Just(PatientEventType::Admission),
        Just(PatientEventType::Discharge),
        Just(PatientEventType::TreatmentInitiated),
    ]
}

/// Well-formed ICD-10 codes, sometimes lower-case or padded
pub fn diagnosis_code_strategy() -> impl Strategy<Value = String> {
    ("[A-Za-z][0-9][0-9A-Za-z]", prop::option::of("[0-9A-Za-z]{1,4}"), "[ ]{0,2}").prop_map(
        |(category, subcategory, padding)| match subcategory {
            Some(sub) => format!("{padding}{category}.{sub}{padding}"),
            None => format!("{padding}{category}{padding}"),
        },
    )
}

/// Amounts in cents inside the default organization bounds
pub fn valid_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Amounts the default bounds reject: non-positive, sub-cent, or too large
pub fn invalid_amount_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (-100_000i64..=0i64).prop_map(|cents| Decimal::new(cents, 2)),
        (1i64..1_000i64)
            .prop_filter("needs a third decimal", |mills| mills % 10 != 0)
            .prop_map(|mills| Decimal::new(mills, 3)),
        (100_000_001i64..1_000_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
    ]
}

/// Service dates in the past
pub fn service_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2015i32..=2024, 1u32..=12, 1u32..=28)
        .prop_filter_map("valid calendar date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
}

/// Distinct claim ids, as used for assignment sets and bulk requests
pub fn claim_id_set_strategy(max: usize) -> impl Strategy<Value = Vec<ClaimId>> {
    btree_set(any::<u128>(), 0..=max).prop_map(|raw| {
        raw.into_iter()
            .map(|bits| ClaimId::from_uuid(uuid::Uuid::from_u128(bits)))
            .collect()
    })
}

/// A walk of requested target statuses, valid or not
pub fn status_walk_strategy(max_len: usize) -> impl Strategy<Value = Vec<ClaimStatus>> {
    vec(claim_status_strategy(), 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_claims::validation::{normalize_diagnosis_code, validate_amount};
    use domain_tenancy::OrganizationSettings;

    use crate::builders::ClaimBuilder;
    use crate::assertions::assert_history_consistent;
    use core_kernel::{OrganizationId, PatientId, ProviderId};
    use domain_claims::Actor;

    proptest! {
        #[test]
        fn generated_codes_normalize(code in diagnosis_code_strategy()) {
            let normalized = normalize_diagnosis_code(&code).unwrap();
            prop_assert_eq!(normalized.clone(), normalized.trim().to_ascii_uppercase());
        }

        #[test]
        fn generated_amounts_match_bounds(
            valid in valid_amount_strategy(),
            invalid in invalid_amount_strategy(),
        ) {
            let settings = OrganizationSettings::default();
            prop_assert!(validate_amount(valid, &settings).is_ok());
            prop_assert!(validate_amount(invalid, &settings).is_err());
        }

        #[test]
        fn arbitrary_walks_keep_history_consistent(walk in status_walk_strategy(8)) {
            let mut claim = ClaimBuilder::new(OrganizationId::new_v7(), PatientId::new_v7(), ProviderId::new_v7())
                .build();
            for target in walk {
                let before = claim.status_history.len();
                let applied = claim
                    .apply_status_change(target, Actor::system("walk"), Some("reason".to_string()))
                    .is_ok();
                let expected_len = if applied { before + 1 } else { before };
                prop_assert_eq!(claim.status_history.len(), expected_len);
            }
            assert_history_consistent(&claim);
        }

        #[test]
        fn claim_id_sets_are_distinct(ids in claim_id_set_strategy(20)) {
            let unique: std::collections::BTreeSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
