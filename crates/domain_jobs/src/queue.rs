//! Durable job queue port
//!
//! The queue delivers each job at least once. Retry timing belongs to the
//! queue: the worker only reports success or failure, and the queue applies
//! its [`RetryPolicy`] to decide when (or whether) the job runs again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::{DomainPort, JobId, PortError};
use crate::payload::JobPayload;

/// A job handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub payload: JobPayload,
    /// One-based attempt number of this delivery
    pub attempt: u32,
}

/// What the queue did with a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Scheduled again
    Retrying { next_attempt: u32, run_at: DateTime<Utc> },
    /// Attempt budget spent or failure not retryable; the job is dead
    Dead,
}

/// Attempt budget with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `failed_attempt + 1`: `base * 2^(failed_attempt - 1)`
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn allows_another_attempt(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }

    /// Disposition for a failed delivery
    pub fn disposition(&self, failed_attempt: u32, retryable: bool, now: DateTime<Utc>) -> FailureDisposition {
        if !retryable || !self.allows_another_attempt(failed_attempt) {
            return FailureDisposition::Dead;
        }
        let delay = chrono::Duration::from_std(self.backoff(failed_attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        FailureDisposition::Retrying {
            next_attempt: failed_attempt + 1,
            run_at: now + delay,
        }
    }
}

#[async_trait]
pub trait JobQueue: DomainPort {
    /// Adds a job; returns its id
    async fn enqueue(&self, payload: &JobPayload) -> Result<JobId, PortError>;

    /// Takes the next due job, if any, for exclusive processing
    async fn reserve(&self) -> Result<Option<QueuedJob>, PortError>;

    /// Removes a finished job
    async fn ack(&self, id: JobId) -> Result<(), PortError>;

    /// Reports a failed attempt
    ///
    /// Non-retryable failures go straight to dead.
    async fn fail(&self, id: JobId, error: &str, retryable: bool) -> Result<FailureDisposition, PortError>;
}

/// In-memory implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum QueueState {
        Ready,
        Reserved,
        Done,
        Dead { error: String },
    }

    #[derive(Debug, Clone)]
    struct Entry {
        job: QueuedJob,
        state: QueueState,
        run_at: DateTime<Utc>,
        last_error: Option<String>,
    }

    /// FIFO queue that applies a retry policy
    #[derive(Debug, Clone)]
    pub struct InMemoryJobQueue {
        policy: RetryPolicy,
        entries: Arc<Mutex<Vec<Entry>>>,
        /// Ignore `run_at` so tests need not wait out backoff
        ignore_delays: bool,
    }

    impl Default for InMemoryJobQueue {
        fn default() -> Self {
            Self::new(RetryPolicy::default())
        }
    }

    impl InMemoryJobQueue {
        pub fn new(policy: RetryPolicy) -> Self {
            Self {
                policy,
                entries: Arc::new(Mutex::new(Vec::new())),
                ignore_delays: false,
            }
        }

        pub fn without_delays(mut self) -> Self {
            self.ignore_delays = true;
            self
        }

        pub async fn state(&self, id: JobId) -> Option<QueueState> {
            self.entries
                .lock()
                .await
                .iter()
                .find(|entry| entry.job.id == id)
                .map(|entry| entry.state.clone())
        }

        pub async fn last_error(&self, id: JobId) -> Option<String> {
            self.entries
                .lock()
                .await
                .iter()
                .find(|entry| entry.job.id == id)
                .and_then(|entry| entry.last_error.clone())
        }

        pub async fn pending(&self) -> usize {
            self.entries
                .lock()
                .await
                .iter()
                .filter(|entry| matches!(entry.state, QueueState::Ready | QueueState::Reserved))
                .count()
        }

        pub async fn jobs(&self) -> Vec<QueuedJob> {
            self.entries.lock().await.iter().map(|entry| entry.job.clone()).collect()
        }
    }

    impl DomainPort for InMemoryJobQueue {}

    #[async_trait]
    impl JobQueue for InMemoryJobQueue {
        async fn enqueue(&self, payload: &JobPayload) -> Result<JobId, PortError> {
            let id = JobId::new_v7();
            self.entries.lock().await.push(Entry {
                job: QueuedJob {
                    id,
                    payload: payload.clone(),
                    attempt: 1,
                },
                state: QueueState::Ready,
                run_at: Utc::now(),
                last_error: None,
            });
            Ok(id)
        }

        async fn reserve(&self) -> Result<Option<QueuedJob>, PortError> {
            let now = Utc::now();
            let mut entries = self.entries.lock().await;
            let next = entries.iter_mut().find(|entry| {
                entry.state == QueueState::Ready && (self.ignore_delays || entry.run_at <= now)
            });
            Ok(next.map(|entry| {
                entry.state = QueueState::Reserved;
                entry.job.clone()
            }))
        }

        async fn ack(&self, id: JobId) -> Result<(), PortError> {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .iter_mut()
                .find(|entry| entry.job.id == id)
                .ok_or_else(|| PortError::not_found("Job", id))?;
            entry.state = QueueState::Done;
            Ok(())
        }

        async fn fail(&self, id: JobId, error: &str, retryable: bool) -> Result<FailureDisposition, PortError> {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .iter_mut()
                .find(|entry| entry.job.id == id)
                .ok_or_else(|| PortError::not_found("Job", id))?;

            let disposition = self.policy.disposition(entry.job.attempt, retryable, Utc::now());
            entry.last_error = Some(error.to_string());
            match disposition {
                FailureDisposition::Retrying { next_attempt, run_at } => {
                    entry.job.attempt = next_attempt;
                    entry.run_at = run_at;
                    entry.state = QueueState::Ready;
                }
                FailureDisposition::Dead => {
                    entry.state = QueueState::Dead {
                        error: error.to_string(),
                    };
                }
            }
            Ok(disposition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        };

        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
    }

    #[test]
    fn test_disposition() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        assert!(matches!(
            policy.disposition(1, true, now),
            FailureDisposition::Retrying { next_attempt: 2, .. }
        ));
        assert_eq!(policy.disposition(3, true, now), FailureDisposition::Dead);
        assert_eq!(policy.disposition(1, false, now), FailureDisposition::Dead);
    }
}
