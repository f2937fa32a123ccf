//! Audit log stub
//!
//! Audit entries are emitted on the `audit` tracing target. There is no
//! persistence behind them yet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use core_kernel::{AuditEventId, OrganizationId, UserId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: AuditEventId,
    pub organization_id: OrganizationId,
    /// `None` for system-initiated actions
    pub actor: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        organization_id: OrganizationId,
        actor: Option<UserId>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            organization_id,
            actor,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub fn emit(&self) {
        info!(
            target: "audit",
            audit_id = %self.id,
            organization_id = %self.organization_id,
            actor = ?self.actor,
            action = %self.action,
            entity_type = %self.entity_type,
            entity_id = %self.entity_id,
            "audit event"
        );
    }
}
