//! Ports and adapters infrastructure
//!
//! ```text
//!   ClaimGateway / PatientEventProcessor / PatientEventService / WorkerPool
//!                               │
//!                               ▼
//!   ClaimStore  ReferenceStore  UserDirectory  JobLedger
//!   PatientEventStore  JobQueue  RateLimiter            (port traits)
//!              ▲                                 ▲
//!              │                                 │
//!        infra_db (PostgreSQL)          `mock` feature (in memory)
//! ```
//!
//! Every port returns [`PortError`], so the domain reasons about storage
//! failures (missing rows, uniqueness conflicts, lost connections) without
//! knowing which adapter produced them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a port implementation
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// The store rejected the data (foreign key, check constraint)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A uniqueness constraint was hit
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// True when the same call may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. } | PortError::Timeout { .. } | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker for port traits; implementations are shared across tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Up,
    Down,
}

/// One component's answer to a readiness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub component: String,
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn up(component: impl Into<String>, latency: Duration) -> Self {
        Self::new(component.into(), HealthStatus::Up, latency, None)
    }

    pub fn down(component: impl Into<String>, latency: Duration, detail: impl Into<String>) -> Self {
        Self::new(component.into(), HealthStatus::Down, latency, Some(detail.into()))
    }

    fn new(component: String, status: HealthStatus, latency: Duration, detail: Option<String>) -> Self {
        Self {
            component,
            status,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            detail,
            checked_at: Utc::now(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

/// Adapters that can answer a readiness probe
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_not_found() {
        let error = PortError::not_found("Claim", "123");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert!(error.to_string().contains("Claim"));
        assert!(error.to_string().contains("123"));
    }

    #[test]
    fn test_port_error_transient() {
        assert!(PortError::timeout("find_claim", Duration::from_secs(5)).is_transient());
        assert!(PortError::connection("reset by peer").is_transient());
        assert!(!PortError::validation("bad status").is_transient());
    }

    #[test]
    fn test_port_error_conflict() {
        let conflict = PortError::conflict("duplicate idempotency key");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_health_report_serializes_without_empty_detail() {
        let report = HealthReport::up("postgres", Duration::from_millis(3));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "up");
        assert_eq!(json["latencyMs"], 3);
        assert!(json.get("detail").is_none());

        let down = HealthReport::down("postgres", Duration::ZERO, "connection refused");
        assert!(!down.is_up());
    }
}
