//! Permission policy
//!
//! Pure functions over [`Role`]. Every check is an exhaustive match so that
//! adding a role forces a decision at each call site.

use crate::error::AccessError;
use crate::user::Role;

pub fn is_admin(role: Role) -> bool {
    matches!(role, Role::Admin)
}

pub fn can_create_claims(role: Role) -> bool {
    match role {
        Role::Admin | Role::ClaimsProcessor | Role::Provider => true,
        Role::Patient => false,
    }
}

pub fn can_update_claim_status(role: Role) -> bool {
    match role {
        Role::Admin | Role::ClaimsProcessor => true,
        Role::Provider | Role::Patient => false,
    }
}

/// Admission, discharge and treatment events drive claim transitions, so
/// patients may not record them about themselves.
pub fn can_record_patient_events(role: Role) -> bool {
    match role {
        Role::Admin | Role::ClaimsProcessor | Role::Provider => true,
        Role::Patient => false,
    }
}

/// Fails with `Forbidden` carrying the action and role when `allowed` is false
pub fn require_permission(allowed: bool, action: &str, role: Role) -> Result<(), AccessError> {
    if allowed {
        Ok(())
    } else {
        Err(AccessError::forbidden(action, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::ErrorKind;

    const ALL_ROLES: [Role; 4] = [Role::Admin, Role::ClaimsProcessor, Role::Provider, Role::Patient];

    #[test]
    fn test_only_admin_is_admin() {
        let admins: Vec<Role> = ALL_ROLES.into_iter().filter(|r| is_admin(*r)).collect();
        assert_eq!(admins, vec![Role::Admin]);
    }

    #[test]
    fn test_patients_cannot_create_claims() {
        assert!(can_create_claims(Role::Admin));
        assert!(can_create_claims(Role::ClaimsProcessor));
        assert!(can_create_claims(Role::Provider));
        assert!(!can_create_claims(Role::Patient));
    }

    #[test]
    fn test_status_updates_limited_to_admin_and_processor() {
        assert!(can_update_claim_status(Role::Admin));
        assert!(can_update_claim_status(Role::ClaimsProcessor));
        assert!(!can_update_claim_status(Role::Provider));
        assert!(!can_update_claim_status(Role::Patient));
    }

    #[test]
    fn test_require_permission_carries_action_and_role() {
        assert!(require_permission(true, "create claim", Role::Patient).is_ok());

        let err = require_permission(false, "update claim status", Role::Provider).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        match err {
            AccessError::Forbidden { action, role } => {
                assert_eq!(action, "update claim status");
                assert_eq!(role, Role::Provider);
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }
}
