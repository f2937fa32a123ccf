//! Provider and patient reference entities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{OrganizationId, PatientId, ProviderId};
use domain_tenancy::ScopedEntity;

/// A healthcare provider claims are filed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: ProviderId,
    pub organization_id: OrganizationId,
    pub name: String,
    /// National provider identifier
    pub npi: String,
    pub specialty: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>, npi: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new_v7(),
            organization_id,
            name: name.into(),
            npi: npi.into(),
            specialty: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

impl ScopedEntity for Provider {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    fn scoped_provider_id(&self) -> Option<ProviderId> {
        Some(self.id)
    }
}

/// A patient claims are filed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    pub organization_id: OrganizationId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub member_number: String,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(
        organization_id: OrganizationId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: NaiveDate,
        member_number: impl Into<String>,
    ) -> Self {
        Self {
            id: PatientId::new_v7(),
            organization_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            member_number: member_number.into(),
            created_at: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl ScopedEntity for Patient {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    fn scoped_patient_id(&self) -> Option<PatientId> {
        Some(self.id)
    }
}
