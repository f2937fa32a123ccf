//! Process configuration
//!
//! Both binaries read their settings from the environment (after loading a
//! `.env` file, if any). Unset keys keep the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use domain_jobs::{RetryPolicy, WorkerSettings};
use domain_tenancy::RateLimitPolicy;

/// API server configuration, read from `API_*` variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for credential verification
    pub jwt_secret: String,
    /// JWT expiration in seconds, for issued tokens
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Length of one rate-limit window
    pub rate_limit_window_secs: u64,
    /// Requests allowed per (organization, user) per window
    pub rate_limit_max_requests: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/claims".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        load("API")
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_secs(self.rate_limit_window_secs.max(1)),
        }
    }
}

/// Job worker configuration, read from `WORKER_*` variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub database_url: String,
    pub log_level: String,
    pub log_json: bool,
    /// Jobs running at once
    pub concurrency: usize,
    /// Throughput ceiling across the pool
    pub max_jobs_per_second: f64,
    /// Idle sleep between polls of an empty queue
    pub poll_interval_ms: u64,
    /// Deliveries per job before it is dead
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    pub backoff_base_ms: u64,
    /// Retry delay ceiling
    pub backoff_max_ms: u64,
    /// Reservations older than this are redelivered
    pub stale_reservation_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let settings = WorkerSettings::default();
        let retry = RetryPolicy::default();
        Self {
            database_url: "postgres://localhost/claims".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            concurrency: settings.concurrency,
            max_jobs_per_second: settings.max_jobs_per_second,
            poll_interval_ms: duration_ms(settings.poll_interval),
            max_attempts: retry.max_attempts,
            backoff_base_ms: duration_ms(retry.base_delay),
            backoff_max_ms: duration_ms(retry.max_delay),
            stale_reservation_secs: 300,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        load("WORKER")
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.concurrency.max(1),
            max_jobs_per_second: self.max_jobs_per_second,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }

    pub fn stale_reservation_after(&self) -> Duration {
        Duration::from_secs(self.stale_reservation_secs)
    }
}

/// Layers `<PREFIX>_*` environment variables over the type's defaults
fn load<T>(prefix: &str) -> Result<T, config::ConfigError>
where
    T: Default + Serialize + for<'de> Deserialize<'de>,
{
    config::Config::builder()
        .add_source(config::Config::try_from(&T::default())?)
        .add_source(config::Environment::with_prefix(prefix).try_parsing(true))
        .build()?
        .try_deserialize()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
