//! Per-caller rate limiting
//!
//! The limiter is an injected collaborator keyed by (organization, user).
//! Nothing in the core holds process-wide counters; callers own the limiter
//! instance and decide when to run [`RateLimiter::evict_expired`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use core_kernel::{DomainPort, OrganizationId, UserId};
use crate::context::AccessContext;
use crate::error::AccessError;

/// Identity a request allowance is tracked under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
}

impl RateLimitKey {
    pub fn for_context(context: &AccessContext) -> Self {
        Self {
            organization_id: context.organization_id(),
            user_id: context.user_id(),
        }
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Allowance: `max_requests` per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

#[async_trait]
pub trait RateLimiter: DomainPort {
    /// Counts one request against the key's allowance
    async fn check(&self, key: RateLimitKey) -> RateLimitDecision;

    /// Drops windows that have expired; returns how many were removed
    async fn evict_expired(&self) -> usize;
}

/// Converts a limited decision into `RateLimitExceeded`
pub async fn enforce(limiter: &dyn RateLimiter, key: RateLimitKey) -> Result<u32, AccessError> {
    match limiter.check(key).await {
        RateLimitDecision::Allowed { remaining } => Ok(remaining),
        RateLimitDecision::Limited { retry_after } => Err(AccessError::RateLimitExceeded {
            retry_after_secs: retry_after.as_secs().max(1),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window limiter held in process memory
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<RateLimitKey, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

impl DomainPort for InMemoryRateLimiter {}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: RateLimitKey) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= self.policy.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.policy.max_requests {
            let elapsed = now.duration_since(window.started_at);
            debug!(
                organization_id = %key.organization_id,
                user_id = %key.user_id,
                "rate limit reached"
            );
            return RateLimitDecision::Limited {
                retry_after: self.policy.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.policy.max_requests - window.count,
        }
    }

    async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.started_at) < self.policy.window);
        before - windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RateLimitKey {
        RateLimitKey {
            organization_id: OrganizationId::new(),
            user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = InMemoryRateLimiter::new(RateLimitPolicy {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        let key = key();

        assert_eq!(limiter.check(key).await, RateLimitDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check(key).await, RateLimitDecision::Allowed { remaining: 0 });
        assert!(matches!(limiter.check(key).await, RateLimitDecision::Limited { .. }));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = InMemoryRateLimiter::new(RateLimitPolicy {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let first = key();
        let second = RateLimitKey {
            organization_id: first.organization_id,
            user_id: UserId::new(),
        };

        assert!(enforce(&limiter, first).await.is_ok());
        assert!(enforce(&limiter, second).await.is_ok());
        let err = enforce(&limiter, first).await.unwrap_err();
        assert!(matches!(err, AccessError::RateLimitExceeded { retry_after_secs } if retry_after_secs >= 1));
    }

    #[tokio::test]
    async fn test_window_resets_and_evicts() {
        let limiter = InMemoryRateLimiter::new(RateLimitPolicy {
            max_requests: 1,
            window: Duration::from_millis(30),
        });
        let key = key();

        assert!(enforce(&limiter, key).await.is_ok());
        assert!(enforce(&limiter, key).await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.evict_expired().await, 1);
        assert_eq!(limiter.tracked_keys().await, 0);
        assert!(enforce(&limiter, key).await.is_ok());
    }
}
