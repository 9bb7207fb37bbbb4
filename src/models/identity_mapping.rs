use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LocalId, RemoteEntity, RemoteId, TenantId};

/// Links a remote record to the local row it was imported into (or
/// exported from). Unique per `(tenant_id, entity_type, remote_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub tenant_id: TenantId,
    pub entity_type: RemoteEntity,
    pub remote_id: RemoteId,
    /// `None` for lookup entities that have no local table.
    pub local_id: Option<LocalId>,
    pub import_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMapping {
    pub tenant_id: TenantId,
    pub entity_type: RemoteEntity,
    pub remote_id: RemoteId,
    pub local_id: Option<LocalId>,
    pub import_run_id: Option<Uuid>,
}

impl NewMapping {
    pub fn into_mapping(self, now: DateTime<Utc>) -> IdentityMapping {
        IdentityMapping {
            tenant_id: self.tenant_id,
            entity_type: self.entity_type,
            remote_id: self.remote_id,
            local_id: self.local_id,
            import_run_id: self.import_run_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Paging for the operator's identity-map listing, newest first.
#[derive(Debug, Clone, Default)]
pub struct MappingFilter {
    pub entity: Option<RemoteEntity>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl MappingFilter {
    pub const DEFAULT_PER_PAGE: u32 = 50;
    pub const MAX_PER_PAGE: u32 = 200;

    pub fn limit(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u32 {
        self.page.unwrap_or(1).max(1).saturating_sub(1) * self.limit()
    }
}

/// One page of mappings plus the total matching the filter.
#[derive(Debug, Clone, Serialize)]
pub struct MappingPage {
    pub mappings: Vec<IdentityMapping>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_pages_default_to_fifty_and_cap_large_requests() {
        let filter = MappingFilter::default();
        assert_eq!(filter.limit(), 50);
        assert_eq!(filter.offset(), 0);

        let filter = MappingFilter {
            page: Some(3),
            per_page: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.limit(), MappingFilter::MAX_PER_PAGE);
        assert_eq!(filter.offset(), 2 * MappingFilter::MAX_PER_PAGE);
    }
}
