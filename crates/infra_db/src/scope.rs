//! SQL rendering of data scopes and claim queries
//!
//! Every adapter query that reads tenant data goes through
//! [`push_scope`]; there is no code path that builds a `WHERE` clause for
//! tenant tables without it. A role predicate that refers to a column the
//! table does not have renders as `FALSE`, matching the in-memory
//! evaluation of [`DataScope::admits`].

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use domain_claims::{ClaimFilter, ClaimSort, ClaimStatus, SortDirection, SortField};
use domain_tenancy::{DataScope, RowPredicate};

use crate::rows::DbClaimStatus;

/// Columns a table exposes to the role predicate
#[derive(Debug, Clone, Copy)]
pub struct ScopeColumns {
    pub organization_id: &'static str,
    pub claim_id: Option<&'static str>,
    pub provider_id: Option<&'static str>,
    pub patient_id: Option<&'static str>,
}

impl ScopeColumns {
    pub const CLAIMS: ScopeColumns = ScopeColumns {
        organization_id: "organization_id",
        claim_id: Some("id"),
        provider_id: Some("provider_id"),
        patient_id: Some("patient_id"),
    };

    pub const PATIENT_EVENTS: ScopeColumns = ScopeColumns {
        organization_id: "organization_id",
        claim_id: None,
        provider_id: None,
        patient_id: Some("patient_id"),
    };
}

/// Appends `<tenant predicate> AND <role predicate>` to a query that is
/// already inside a `WHERE` clause
pub fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &DataScope, columns: ScopeColumns) {
    builder
        .push(columns.organization_id)
        .push(" = ")
        .push_bind(scope.organization_id().into_uuid());

    match scope.predicate() {
        RowPredicate::Unrestricted => {}
        RowPredicate::Nothing => {
            builder.push(" AND FALSE");
        }
        RowPredicate::ClaimIn(ids) => match columns.claim_id {
            Some(column) if !ids.is_empty() => {
                let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
                builder.push(" AND ").push(column).push(" = ANY(").push_bind(ids).push(")");
            }
            _ => {
                builder.push(" AND FALSE");
            }
        },
        RowPredicate::ProviderIs(provider_id) => match columns.provider_id {
            Some(column) => {
                builder.push(" AND ").push(column).push(" = ").push_bind(provider_id.into_uuid());
            }
            None => {
                builder.push(" AND FALSE");
            }
        },
        RowPredicate::PatientIs(patient_id) => match columns.patient_id {
            Some(column) => {
                builder.push(" AND ").push(column).push(" = ").push_bind(patient_id.into_uuid());
            }
            None => {
                builder.push(" AND FALSE");
            }
        },
    }
}

/// Appends the filter's conditions, each prefixed with `AND`
pub fn push_claim_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ClaimFilter) {
    if !filter.statuses.is_empty() {
        builder.push(" AND status IN (");
        let mut statuses = builder.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(DbClaimStatus::from(*status));
        }
        statuses.push_unseparated(")");
    }
    if let Some(patient_id) = filter.patient_id {
        builder.push(" AND patient_id = ").push_bind(patient_id.into_uuid());
    }
    if let Some(provider_id) = filter.provider_id {
        builder.push(" AND provider_id = ").push_bind(provider_id.into_uuid());
    }
    if let Some(processor_id) = filter.assigned_processor_id {
        builder
            .push(" AND assigned_processor_id = ")
            .push_bind(processor_id.into_uuid());
    }
    if let Some(from) = filter.service_date_from {
        builder.push(" AND service_date >= ").push_bind(from);
    }
    if let Some(to) = filter.service_date_to {
        builder.push(" AND service_date <= ").push_bind(to);
    }
    if let Some(min) = filter.min_amount {
        builder.push(" AND amount >= ").push_bind(min);
    }
    if let Some(max) = filter.max_amount {
        builder.push(" AND amount <= ").push_bind(max);
    }
}

/// Appends `ORDER BY`, breaking ties on id like [`ClaimSort::compare`]
pub fn push_claim_order(builder: &mut QueryBuilder<'_, Postgres>, sort: ClaimSort) {
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };

    builder.push(" ORDER BY ");
    match sort.field {
        SortField::CreatedAt => {
            builder.push("created_at");
        }
        SortField::ServiceDate => {
            builder.push("service_date");
        }
        SortField::Amount => {
            builder.push("amount");
        }
        SortField::Status => {
            builder.push("CASE status");
            for status in ClaimStatus::ALL {
                builder.push(format!(" WHEN '{}' THEN {}", status.as_str(), status.rank()));
            }
            builder.push(" END");
        }
    }
    builder.push(" ").push(direction).push(", id ").push(direction);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ClaimId, OrganizationId, PatientId, ProviderId, UserId};
    use domain_tenancy::{AccessContext, AssignedClaims, RoleScope};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn render(scope: &DataScope, columns: ScopeColumns) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM t WHERE ");
        push_scope(&mut builder, scope, columns);
        builder.sql().to_string()
    }

    fn context(scope: RoleScope) -> AccessContext {
        AccessContext::new(OrganizationId::new(), UserId::new(), scope)
    }

    #[test]
    fn test_admin_gets_tenant_predicate_only() {
        let scope = DataScope::for_context(&context(RoleScope::Admin));
        assert_eq!(
            render(&scope, ScopeColumns::CLAIMS),
            "SELECT 1 FROM t WHERE organization_id = $1"
        );
    }

    #[test]
    fn test_empty_assignment_renders_false() {
        let scope = DataScope::for_context(&context(RoleScope::ClaimsProcessor {
            assigned_claims: AssignedClaims::new(),
        }));
        assert!(render(&scope, ScopeColumns::CLAIMS).ends_with("organization_id = $1 AND FALSE"));
    }

    #[test]
    fn test_assignment_renders_any() {
        let assigned = AssignedClaims::try_from_ids([ClaimId::new(), ClaimId::new()]).unwrap();
        let scope = DataScope::for_context(&context(RoleScope::ClaimsProcessor {
            assigned_claims: assigned,
        }));
        assert!(render(&scope, ScopeColumns::CLAIMS).ends_with("AND id = ANY($2)"));
    }

    #[test]
    fn test_missing_column_fails_closed() {
        let provider = DataScope::for_context(&context(RoleScope::Provider {
            provider_id: Some(ProviderId::new()),
        }));
        assert!(render(&provider, ScopeColumns::PATIENT_EVENTS).ends_with("AND FALSE"));

        let patient = DataScope::for_context(&context(RoleScope::Patient {
            patient_id: Some(PatientId::new()),
        }));
        assert!(render(&patient, ScopeColumns::PATIENT_EVENTS).ends_with("AND patient_id = $2"));
    }

    #[test]
    fn test_filter_and_order() {
        let filter = ClaimFilter::for_patient(PatientId::new(), &[ClaimStatus::Submitted, ClaimStatus::UnderReview]);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM claims WHERE TRUE");
        push_claim_filter(&mut builder, &filter);
        push_claim_order(&mut builder, ClaimSort::new(SortField::Status, SortDirection::Asc));

        let sql = builder.sql();
        assert!(sql.contains("status IN ($1, $2)"));
        assert!(sql.contains("patient_id = $3"));
        assert!(sql.contains("WHEN 'under_review' THEN 1"));
        assert!(sql.ends_with("END ASC, id ASC"));
    }

    #[test]
    fn test_amount_range_binds_both_bounds() {
        let filter = ClaimFilter {
            min_amount: Some(dec!(100.00)),
            max_amount: Some(dec!(250.50)),
            ..ClaimFilter::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM claims WHERE TRUE");
        push_claim_filter(&mut builder, &filter);

        let sql = builder.sql();
        assert!(sql.contains("amount >= $1"));
        assert!(sql.contains("amount <= $2"));
    }

    fn role_scope_strategy() -> impl Strategy<Value = RoleScope> {
        prop_oneof![
            Just(RoleScope::Admin),
            proptest::collection::vec(any::<u128>(), 0..5).prop_map(|raw| RoleScope::ClaimsProcessor {
                assigned_claims: AssignedClaims::try_from_ids(
                    raw.into_iter().map(|bits| ClaimId::from_uuid(Uuid::from_u128(bits))),
                )
                .unwrap(),
            }),
            any::<Option<u128>>().prop_map(|raw| RoleScope::Provider {
                provider_id: raw.map(|bits| ProviderId::from_uuid(Uuid::from_u128(bits))),
            }),
            any::<Option<u128>>().prop_map(|raw| RoleScope::Patient {
                patient_id: raw.map(|bits| PatientId::from_uuid(Uuid::from_u128(bits))),
            }),
        ]
    }

    proptest! {
        #[test]
        fn tenant_predicate_always_comes_first(scope in role_scope_strategy()) {
            let scope = DataScope::for_context(&context(scope));
            for columns in [ScopeColumns::CLAIMS, ScopeColumns::PATIENT_EVENTS] {
                let sql = render(&scope, columns);
                prop_assert!(sql.starts_with("SELECT 1 FROM t WHERE organization_id = $1"));
                if scope.matches_nothing() {
                    prop_assert!(sql.ends_with("AND FALSE"));
                }
            }
        }
    }
}
