// ============================================================================
// Export engine
// ============================================================================
//
// Pushes a local entity to the remote API. A mapped entity is patched in
// place; an unmapped one is created and the returned remote id is written
// to the identity map. Required foreign references are exported first.
//
// ============================================================================

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::error::ExportError;
use super::field_mapper::{FieldMapper, ForeignRef};
use crate::models::{IdentityMapping, LocalId, NewMapping, Record, RemoteEntity, RemoteId, TenantId};
use crate::repositories::SyncStore;
use crate::services::remote::envelope::{as_integer, extract_created_id};
use crate::services::remote::RemoteApiClient;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub entity: RemoteEntity,
    pub local_id: LocalId,
    pub remote_id: RemoteId,
    /// `false` when an existing remote record was patched.
    pub created: bool,
}

pub struct ExportEngine {
    client: RemoteApiClient,
    store: Arc<dyn SyncStore>,
}

impl ExportEngine {
    pub fn new(client: RemoteApiClient, store: Arc<dyn SyncStore>) -> Self {
        Self { client, store }
    }

    /// Boxed because required dependencies are exported recursively.
    pub fn export(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
    ) -> BoxFuture<'_, Result<ExportOutcome>> {
        async move {
            let outbound =
                FieldMapper::outbound_map(entity).ok_or(ExportError::Unsupported(entity))?;
            let target = entity
                .local_target()
                .ok_or(ExportError::Unsupported(entity))?;

            let (record, existing) = self.load(tenant_id, entity, local_id).await?;
            let record = record.ok_or(ExportError::NotFound { entity, local_id })?;

            let mut payload = FieldMapper::to_remote(&record, outbound);
            for reference in FieldMapper::foreign_refs(entity) {
                if let Some(remote_id) = self
                    .resolve_reference(tenant_id, entity, local_id, &record, reference)
                    .await?
                {
                    payload.insert(reference.remote_field.to_string(), Value::from(remote_id));
                }
            }

            let endpoint = FieldMapper::endpoint(entity);
            let body = Value::Object(payload);

            if let Some(mapping) = existing {
                self.client
                    .patch(&format!("{}/{}", endpoint, mapping.remote_id), &body)
                    .await?;

                tracing::info!(
                    entity = %entity,
                    local_id,
                    remote_id = mapping.remote_id,
                    table = target.table(),
                    "Updated remote record"
                );

                return Ok(ExportOutcome {
                    entity,
                    local_id,
                    remote_id: mapping.remote_id,
                    created: false,
                });
            }

            let response = self.client.post(endpoint, &body).await?;
            let remote_id =
                extract_created_id(&response).ok_or(ExportError::MissingRemoteId(entity))?;

            let mut tx = self.store.begin().await?;
            tx.upsert_mapping(&NewMapping {
                tenant_id,
                entity_type: entity,
                remote_id,
                local_id: Some(local_id),
                import_run_id: None,
            })
            .await?;
            tx.commit().await?;

            tracing::info!(entity = %entity, local_id, remote_id, "Created remote record");

            Ok(ExportOutcome {
                entity,
                local_id,
                remote_id,
                created: true,
            })
        }
        .boxed()
    }

    async fn load(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
    ) -> Result<(Option<Record>, Option<IdentityMapping>)> {
        let mut tx = self.store.begin().await?;
        let record = match entity.local_target() {
            Some(target) => tx.load_entity(target, tenant_id, local_id).await?,
            None => None,
        };
        let mapping = tx.find_mapping_by_local(tenant_id, entity, local_id).await?;
        tx.rollback().await?;
        Ok((record, mapping))
    }

    /// Remote id for a foreign key on `record`, exporting the referenced
    /// entity when it has never been synced. Optional references that cannot
    /// be resolved are left out of the payload.
    async fn resolve_reference(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
        record: &Record,
        reference: &ForeignRef,
    ) -> Result<Option<RemoteId>> {
        let unresolved = |reason: String| ExportError::DependencyUnresolved {
            entity,
            local_id,
            reason,
        };

        let Some(ref_id) = record.get(reference.local_field).and_then(as_integer) else {
            return if reference.required {
                Err(unresolved(format!("{} is not set", reference.local_field)))
            } else {
                Ok(None)
            };
        };

        let (_, mapping) = self.load(tenant_id, reference.entity, ref_id).await?;
        if let Some(mapping) = mapping {
            return Ok(Some(mapping.remote_id));
        }

        match self.export(tenant_id, reference.entity, ref_id).await {
            Ok(outcome) => Ok(Some(outcome.remote_id)),
            Err(e) if reference.required => Err(unresolved(format!(
                "{} {} could not be exported: {}",
                reference.entity, ref_id, e
            ))),
            Err(e) => {
                tracing::warn!(
                    entity = %entity,
                    local_id,
                    dependency = %reference.entity,
                    error = %e,
                    "Optional reference could not be exported, omitting it"
                );
                Ok(None)
            }
        }
    }
}
