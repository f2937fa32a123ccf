//! Tests for core_kernel error types

use core_kernel::error::{CoreError, ErrorKind};
use core_kernel::PortError;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match &error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[test]
fn test_core_error_invalid_state() {
    let error = CoreError::invalid_state("Cannot transition from A to B");

    match &error {
        CoreError::InvalidStateTransition(msg) => assert!(msg.contains("Cannot transition")),
        _ => panic!("Expected InvalidStateTransition error"),
    }
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[test]
fn test_core_error_not_found() {
    let error = CoreError::not_found("Claim not found");
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(error.to_string().contains("Claim not found"));
}

#[test]
fn test_error_kind_determinism() {
    assert!(ErrorKind::Validation.is_deterministic());
    assert!(ErrorKind::Forbidden.is_deterministic());
    assert!(ErrorKind::ClaimNotModifiable.is_deterministic());
    assert!(!ErrorKind::Database.is_deterministic());
    assert!(!ErrorKind::Queue.is_deterministic());
}

#[test]
fn test_error_kind_codes() {
    assert_eq!(ErrorKind::NotFound.code(), "not_found");
    assert_eq!(ErrorKind::ClaimNotModifiable.to_string(), "claim_not_modifiable");
    let json = serde_json::to_string(&ErrorKind::TenantAccessDenied).unwrap();
    assert_eq!(json, "\"tenant_access_denied\"");
}

#[test]
fn test_port_error_helpers() {
    let error = PortError::not_found("Organization", "ORG-1");
    assert!(error.is_not_found());
    assert!(!error.is_conflict());
}
