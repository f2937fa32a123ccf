//! Custom Test Assertions
//!
//! Assertion helpers that print the offending value when they fail.

use std::collections::BTreeSet;
use std::fmt::Debug;

use core_kernel::{ClaimId, CoreError, ErrorKind};
use domain_claims::{Claim, ClaimError, ClaimStatus};
use domain_jobs::JobError;
use domain_tenancy::AccessError;

/// Errors that classify themselves with an [`ErrorKind`]
pub trait Classified: Debug {
    fn error_kind(&self) -> ErrorKind;
}

impl Classified for CoreError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

impl Classified for AccessError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

impl Classified for ClaimError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

impl Classified for JobError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

/// Asserts that `result` failed with the given kind and returns the error
pub fn assert_kind<T: Debug, E: Classified>(result: Result<T, E>, expected: ErrorKind) -> E {
    match result {
        Ok(value) => panic!("Expected {expected} error, got Ok({value:?})"),
        Err(err) => {
            assert_eq!(
                err.error_kind(),
                expected,
                "Expected {expected} error, got {err:?}"
            );
            err
        }
    }
}

/// Asserts a claim's history is a gap-free chain ending at its status
///
/// The first entry opens at `submitted` with no previous status, every later
/// entry starts where the previous one ended, timestamps never go backwards,
/// and rejections carry a reason.
pub fn assert_history_consistent(claim: &Claim) {
    let history = &claim.status_history;
    assert!(!history.is_empty(), "Claim {} has no status history", claim.id);

    let opening = &history[0];
    assert_eq!(opening.from_status, None, "Opening entry has a previous status: {opening:?}");
    assert_eq!(opening.to_status, ClaimStatus::Submitted, "Claim did not open as submitted");

    for pair in history.windows(2) {
        assert_eq!(
            pair[1].from_status,
            Some(pair[0].to_status),
            "History gap in claim {}: {:?} follows {:?}",
            claim.id,
            pair[1],
            pair[0]
        );
        assert!(
            pair[1].changed_at >= pair[0].changed_at,
            "History of claim {} goes back in time",
            claim.id
        );
    }

    for entry in history {
        if entry.to_status == ClaimStatus::Rejected {
            assert!(entry.reason.is_some(), "Rejection without reason in claim {}", claim.id);
        }
    }

    assert_eq!(
        history.last().map(|entry| entry.to_status),
        Some(claim.status),
        "History of claim {} does not end at its status",
        claim.id
    );
}

/// Asserts two id lists hold the same ids, ignoring order
pub fn assert_same_ids(actual: &[ClaimId], expected: &[ClaimId]) {
    let actual: BTreeSet<_> = actual.iter().collect();
    let expected: BTreeSet<_> = expected.iter().collect();
    assert_eq!(actual, expected, "Claim id sets differ");
}
