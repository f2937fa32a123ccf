//! Idempotent job ledger
//!
//! One [`JobProcessingLog`] exists per (idempotency key, organization). Once
//! an entry is completed its result is frozen: every later invocation with
//! the same key returns that result without touching any claim.
//!
//! ```text
//! pending -> processing -> completed
//!                      \-> failed -> processing (retry) -> ...
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{DomainPort, JobLogId, OrganizationId, PortError};
use crate::event::PatientEventType;

/// Status of a job, shared by ledger entries and patient events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Only completed entries block another attempt
    pub fn allows_attempt(&self) -> bool {
        !matches!(self, JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for one idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProcessingLog {
    pub id: JobLogId,
    pub organization_id: OrganizationId,
    pub idempotency_key: String,
    pub job_type: PatientEventType,
    pub status: JobStatus,
    /// Trigger payload as first received
    pub payload: serde_json::Value,
    /// Frozen on completion
    pub result: Option<serde_json::Value>,
    /// Reason of the most recent failure
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobProcessingLog {
    /// New entry in processing state
    pub fn start(
        organization_id: OrganizationId,
        idempotency_key: impl Into<String>,
        job_type: PatientEventType,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobLogId::new_v7(),
            organization_id,
            idempotency_key: idempotency_key.into(),
            job_type,
            status: JobStatus::Processing,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Moves a failed or stale entry back to processing
    ///
    /// Returns false, leaving the entry untouched, when it is completed.
    pub fn begin_retry(&mut self) -> bool {
        if !self.status.allows_attempt() {
            return false;
        }
        self.status = JobStatus::Processing;
        self.retry_count += 1;
        self.updated_at = Utc::now();
        true
    }

    /// Freezes the result; a completed entry keeps its first result
    pub fn complete(&mut self, result: serde_json::Value) {
        if self.is_completed() {
            return;
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error_message = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Records a failure; completed entries are never downgraded
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_completed() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

/// Durable storage for ledger entries
#[async_trait]
pub trait JobLedger: DomainPort {
    async fn find_by_idempotency_key(
        &self,
        organization_id: OrganizationId,
        idempotency_key: &str,
    ) -> Result<Option<JobProcessingLog>, PortError>;

    /// Inserts a new entry
    ///
    /// Returns `PortError::Conflict` when the (key, organization) pair is
    /// already taken.
    async fn create(&self, entry: &JobProcessingLog) -> Result<(), PortError>;

    /// Moves the entry back to processing and bumps its retry counter
    ///
    /// Returns `PortError::Conflict` for completed entries.
    async fn begin_retry(&self, id: JobLogId) -> Result<JobProcessingLog, PortError>;

    /// Completes the entry and returns the stored row
    ///
    /// If the entry was already completed, the stored row is returned
    /// unchanged.
    async fn mark_completed(
        &self,
        id: JobLogId,
        result: serde_json::Value,
    ) -> Result<JobProcessingLog, PortError>;

    /// Marks the entry failed unless it is completed
    async fn mark_failed(&self, id: JobLogId, error_message: &str) -> Result<JobProcessingLog, PortError>;
}

/// In-memory implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default, Clone)]
    pub struct InMemoryJobLedger {
        entries: Arc<RwLock<HashMap<JobLogId, JobProcessingLog>>>,
    }

    impl InMemoryJobLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn entries(&self) -> Vec<JobProcessingLog> {
            self.entries.read().await.values().cloned().collect()
        }

        /// Stores an entry directly, bypassing uniqueness checks
        pub async fn seed(&self, entry: JobProcessingLog) {
            self.entries.write().await.insert(entry.id, entry);
        }

        async fn update(
            &self,
            id: JobLogId,
            apply: impl FnOnce(&mut JobProcessingLog) -> Result<(), PortError>,
        ) -> Result<JobProcessingLog, PortError> {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("JobProcessingLog", id))?;
            apply(entry)?;
            Ok(entry.clone())
        }
    }

    impl DomainPort for InMemoryJobLedger {}

    #[async_trait]
    impl JobLedger for InMemoryJobLedger {
        async fn find_by_idempotency_key(
            &self,
            organization_id: OrganizationId,
            idempotency_key: &str,
        ) -> Result<Option<JobProcessingLog>, PortError> {
            Ok(self
                .entries
                .read()
                .await
                .values()
                .find(|e| e.organization_id == organization_id && e.idempotency_key == idempotency_key)
                .cloned())
        }

        async fn create(&self, entry: &JobProcessingLog) -> Result<(), PortError> {
            let mut entries = self.entries.write().await;
            let taken = entries.values().any(|e| {
                e.organization_id == entry.organization_id && e.idempotency_key == entry.idempotency_key
            });
            if taken {
                return Err(PortError::conflict(format!(
                    "idempotency key {} already recorded",
                    entry.idempotency_key
                )));
            }
            entries.insert(entry.id, entry.clone());
            Ok(())
        }

        async fn begin_retry(&self, id: JobLogId) -> Result<JobProcessingLog, PortError> {
            self.update(id, |entry| {
                if entry.begin_retry() {
                    Ok(())
                } else {
                    Err(PortError::conflict(format!("ledger entry {id} is completed")))
                }
            })
            .await
        }

        async fn mark_completed(
            &self,
            id: JobLogId,
            result: serde_json::Value,
        ) -> Result<JobProcessingLog, PortError> {
            self.update(id, |entry| {
                entry.complete(result);
                Ok(())
            })
            .await
        }

        async fn mark_failed(&self, id: JobLogId, error_message: &str) -> Result<JobProcessingLog, PortError> {
            self.update(id, |entry| {
                entry.fail(error_message);
                Ok(())
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> JobProcessingLog {
        JobProcessingLog::start(
            OrganizationId::new(),
            "adm-1",
            PatientEventType::Admission,
            json!({}),
        )
    }

    #[test]
    fn test_completed_result_is_frozen() {
        let mut log = entry();
        log.complete(json!({"claimsUpdated": 2}));
        log.complete(json!({"claimsUpdated": 0}));
        log.fail("late failure");

        assert_eq!(log.status, JobStatus::Completed);
        assert_eq!(log.result, Some(json!({"claimsUpdated": 2})));
        assert!(log.error_message.is_none());
        assert!(!log.begin_retry());
    }

    #[test]
    fn test_failed_entry_can_be_retried() {
        let mut log = entry();
        log.fail("connection reset");
        assert_eq!(log.status, JobStatus::Failed);

        assert!(log.begin_retry());
        assert_eq!(log.status, JobStatus::Processing);
        assert_eq!(log.retry_count, 1);
        assert_eq!(log.error_message.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_in_memory_ledger_enforces_key_uniqueness() {
        let ledger = mock::InMemoryJobLedger::new();
        let first = entry();
        let mut duplicate = entry();
        duplicate.organization_id = first.organization_id;

        ledger.create(&first).await.unwrap();
        let err = ledger.create(&duplicate).await.unwrap_err();
        assert!(err.is_conflict());

        let mut other_org = entry();
        other_org.idempotency_key = first.idempotency_key.clone();
        assert!(ledger.create(&other_org).await.is_ok());
    }
}
