// ============================================================================
// Import engine
// ============================================================================
//
// Pulls one remote entity page by page and lands every record in its own
// store transaction, so a bad record is logged on the run and the batch
// carries on. Authentication failures abort before a run is created.
//
// ============================================================================

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ImportError;
use super::field_mapper::FieldMapper;
use super::normalize::is_blank;
use super::strategies::{strategy_for, EntityImportStrategy, ImportContext};
use crate::models::{
    DuplicateStrategy, ImportRun, ImportSummary, LocalEntity, LocalId, NewMapping, Record,
    RemoteEntity, RemoteId, RunFilter, RunStatus, TenantId, UserId,
};
use crate::repositories::{StoreResult, SyncStore, SyncTx};
use crate::services::remote::{QueryParams, RemoteApiClient};
use crate::utils::log_sanitizer::sanitize_for_log;

pub type Result<T> = std::result::Result<T, ImportError>;

pub const DEFAULT_PREVIEW_LIMIT: usize = 10;
pub const MAX_PREVIEW_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Inserted(LocalId),
    Updated,
    Skipped,
    Mapped,
}

/// One entity's result inside a full ordered import.
#[derive(Debug, Clone, Serialize)]
pub struct EntityImportResult {
    pub entity: RemoteEntity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRecord {
    pub remote_id: Option<RemoteId>,
    pub raw: Value,
    pub mapped: Record,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub entity: RemoteEntity,
    pub total: i64,
    pub sample: Vec<PreviewRecord>,
    pub mapped_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub import_id: Uuid,
    pub entity_type: RemoteEntity,
    pub deleted: usize,
    /// Rows that were already gone when the rollback ran.
    pub missing: usize,
    pub failed: usize,
    pub mappings_removed: u64,
}

pub struct ImportEngine {
    client: RemoteApiClient,
    store: Arc<dyn SyncStore>,
    page_size: u32,
}

impl ImportEngine {
    pub fn new(client: RemoteApiClient, store: Arc<dyn SyncStore>) -> Self {
        let page_size = client.config().page_size;
        Self {
            client,
            store,
            page_size,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn client(&self) -> &RemoteApiClient {
        &self.client
    }

    // ========================================================================
    // Single entity
    // ========================================================================

    pub async fn import_entity(
        &self,
        entity: RemoteEntity,
        tenant_id: TenantId,
        user_id: UserId,
        strategy: DuplicateStrategy,
        filters: &QueryParams,
    ) -> Result<ImportSummary> {
        self.client.authenticate().await?;

        let filters_json = (!filters.is_empty()).then(|| {
            Value::Object(
                filters
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<Map<String, Value>>(),
            )
        });

        let mut run = ImportRun::new(tenant_id, user_id, entity, strategy, filters_json);
        run.start();
        self.store.create_run(&run).await?;

        tracing::info!(
            import_id = %run.id,
            tenant_id,
            entity = %entity,
            strategy = strategy.as_str(),
            "Starting remote import"
        );

        let ctx = ImportContext {
            run_id: run.id,
            tenant_id,
            user_id,
            entity,
            strategy,
        };

        let fetch_result = self
            .process_records(&ctx, strategy_for(entity), filters, &mut run)
            .await;

        if let Err(e) = &fetch_result {
            run.record_error(format!("Import aborted: {}", e), None);
        }

        run.finish();
        self.store.save_run(&run).await?;

        tracing::info!(
            import_id = %run.id,
            entity = %entity,
            status = %run.status,
            fetched = run.total_fetched,
            imported = run.total_imported,
            updated = run.total_updated,
            skipped = run.total_skipped,
            mapped = run.total_mapped,
            errors = run.total_errors,
            "Remote import finished"
        );

        fetch_result?;
        Ok(run.summary())
    }

    async fn process_records(
        &self,
        ctx: &ImportContext,
        importer: Option<&'static dyn EntityImportStrategy>,
        filters: &QueryParams,
        run: &mut ImportRun,
    ) -> Result<()> {
        let endpoint = FieldMapper::endpoint(ctx.entity);
        let mut pager = self.client.fetch_all(endpoint, filters, self.page_size);

        while let Some(raw) = pager.next().await? {
            run.total_fetched += 1;

            let Some(record) = raw.as_object() else {
                continue;
            };

            match self.import_record(ctx, importer, record).await {
                Ok(RecordOutcome::Inserted(local_id)) => run.record_inserted(local_id),
                Ok(RecordOutcome::Updated) => run.total_updated += 1,
                Ok(RecordOutcome::Skipped) => run.total_skipped += 1,
                Ok(RecordOutcome::Mapped) => run.total_mapped += 1,
                Err(e) => {
                    tracing::warn!(
                        import_id = %ctx.run_id,
                        entity = %ctx.entity,
                        error = %sanitize_for_log(&e.to_string()),
                        "Failed to import remote record"
                    );
                    run.record_error(e.to_string(), Some(raw.clone()));
                }
            }
        }

        tracing::debug!(
            import_id = %ctx.run_id,
            pages = pager.pages_fetched(),
            "Remote pagination finished"
        );

        Ok(())
    }

    /// Map and persist one remote record inside its own transaction.
    async fn import_record(
        &self,
        ctx: &ImportContext,
        importer: Option<&'static dyn EntityImportStrategy>,
        record: &Record,
    ) -> Result<RecordOutcome> {
        let mapped = FieldMapper::map(record, FieldMapper::map_for(ctx.entity));
        let remote_id = FieldMapper::extract_remote_id(&mapped);

        let mut tx = self.store.begin().await?;
        let result = match importer {
            Some(importer) => apply_record(ctx, importer, &mapped, remote_id, tx.as_mut()).await,
            None => apply_mapping_only(ctx, remote_id, tx.as_mut()).await,
        };

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Failed to roll back record transaction");
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // Full ordered import
    // ========================================================================

    /// Import every entity in dependency order. Only an authentication
    /// failure stops the batch.
    pub async fn import_all(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        strategy: DuplicateStrategy,
    ) -> Result<Vec<EntityImportResult>> {
        let filters = QueryParams::new();
        let mut results = Vec::with_capacity(RemoteEntity::IMPORT_ORDER.len());

        for entity in RemoteEntity::IMPORT_ORDER {
            match self
                .import_entity(entity, tenant_id, user_id, strategy, &filters)
                .await
            {
                Ok(summary) => results.push(EntityImportResult {
                    entity,
                    summary: Some(summary),
                    error: None,
                }),
                Err(ImportError::Authentication(message)) => {
                    tracing::error!(entity = %entity, "Full import aborted: authentication failed");
                    return Err(ImportError::Authentication(message));
                }
                Err(e) => {
                    tracing::warn!(entity = %entity, error = %e, "Entity import failed, continuing");
                    results.push(EntityImportResult {
                        entity,
                        summary: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(results)
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Fetch a small sample and show how it would be mapped. Writes nothing.
    pub async fn preview(&self, entity: RemoteEntity, limit: usize) -> Result<PreviewReport> {
        let limit = limit.clamp(1, MAX_PREVIEW_LIMIT);
        let endpoint = FieldMapper::endpoint(entity);
        let field_map = FieldMapper::map_for(entity);
        let filters = QueryParams::new();

        let total = self.client.count(endpoint, &filters).await?;

        let records: Vec<Value> = self
            .client
            .fetch_all(endpoint, &filters, limit as u32)
            .into_stream()
            .take(limit)
            .try_collect()
            .await?;

        let sample = records
            .into_iter()
            .filter_map(|raw| {
                let mapped = FieldMapper::map(raw.as_object()?, field_map);
                Some(PreviewRecord {
                    remote_id: FieldMapper::extract_remote_id(&mapped),
                    mapped: FieldMapper::strip_metadata(mapped),
                    raw,
                })
            })
            .collect();

        Ok(PreviewReport {
            entity,
            total,
            sample,
            mapped_fields: FieldMapper::visible_fields(entity),
        })
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    pub async fn rollback(&self, tenant_id: TenantId, run_id: Uuid) -> Result<RollbackReport> {
        rollback_run(self.store.as_ref(), tenant_id, run_id).await
    }

    // ========================================================================
    // Remote totals
    // ========================================================================

    /// Remote record count per entity; `-1` where the count failed.
    pub async fn entity_counts(&self) -> BTreeMap<RemoteEntity, i64> {
        let timeout = self.client.config().count_timeout;
        let filters = QueryParams::new();
        let mut counts = BTreeMap::new();

        for entity in RemoteEntity::IMPORT_ORDER {
            let count = self
                .client
                .count_with_timeout(FieldMapper::endpoint(entity), &filters, timeout)
                .await
                .unwrap_or(-1);
            counts.insert(entity, count);
        }

        counts
    }
}

// ============================================================================
// Per-record pipeline
// ============================================================================

async fn apply_record(
    ctx: &ImportContext,
    importer: &dyn EntityImportStrategy,
    mapped: &Record,
    remote_id: Option<RemoteId>,
    tx: &mut dyn SyncTx,
) -> Result<RecordOutcome> {
    let target = importer.target();
    let mut existing = None;

    if let Some(remote_id) = remote_id {
        if let Some(mapping) = tx.find_mapping(ctx.tenant_id, ctx.entity, remote_id).await? {
            match ctx.strategy {
                DuplicateStrategy::Skip => return Ok(RecordOutcome::Skipped),
                DuplicateStrategy::Update => {
                    if let Some(local_id) = mapping.local_id {
                        if tx.load_entity(target, ctx.tenant_id, local_id).await?.is_some() {
                            existing = Some(local_id);
                        }
                    }
                }
            }
        }
    }

    let Some(row) = importer.transform(ctx, mapped, tx).await? else {
        return Ok(RecordOutcome::Skipped);
    };
    let row = fillable_only(target, row);

    let existing = match existing {
        Some(local_id) => Some(local_id),
        None => importer.find_duplicate(ctx, &row, tx).await?,
    };

    match existing {
        Some(local_id) => {
            let outcome = match ctx.strategy {
                DuplicateStrategy::Skip => RecordOutcome::Skipped,
                DuplicateStrategy::Update => {
                    let changes: Record = row.into_iter().filter(|(_, v)| !is_blank(v)).collect();
                    if !changes.is_empty() {
                        tx.update_entity(target, ctx.tenant_id, local_id, &changes)
                            .await?;
                    }
                    RecordOutcome::Updated
                }
            };
            link(ctx, remote_id, Some(local_id), tx).await?;
            Ok(outcome)
        }
        None => {
            let mut row = row;
            if target.has_active_flag() {
                row.entry("is_active").or_insert(Value::Bool(true));
            }
            let local_id = tx.insert_entity(target, ctx.tenant_id, &row).await?;
            link(ctx, remote_id, Some(local_id), tx).await?;
            Ok(RecordOutcome::Inserted(local_id))
        }
    }
}

/// Lookup entities only record that the remote id has been seen.
async fn apply_mapping_only(
    ctx: &ImportContext,
    remote_id: Option<RemoteId>,
    tx: &mut dyn SyncTx,
) -> Result<RecordOutcome> {
    let Some(remote_id) = remote_id else {
        return Ok(RecordOutcome::Skipped);
    };
    if tx.is_mapped(ctx.tenant_id, ctx.entity, remote_id).await? {
        return Ok(RecordOutcome::Skipped);
    }
    link(ctx, Some(remote_id), None, tx).await?;
    Ok(RecordOutcome::Mapped)
}

async fn link(
    ctx: &ImportContext,
    remote_id: Option<RemoteId>,
    local_id: Option<LocalId>,
    tx: &mut dyn SyncTx,
) -> StoreResult<()> {
    match remote_id {
        Some(remote_id) => {
            tx.upsert_mapping(&NewMapping {
                tenant_id: ctx.tenant_id,
                entity_type: ctx.entity,
                remote_id,
                local_id,
                import_run_id: Some(ctx.run_id),
            })
            .await
        }
        None => Ok(()),
    }
}

fn fillable_only(target: LocalEntity, mut row: Record) -> Record {
    row.retain(|column, _| target.is_fillable(column));
    row
}

// ============================================================================
// Rollback and status (store only)
// ============================================================================

pub async fn rollback_run(
    store: &dyn SyncStore,
    tenant_id: TenantId,
    run_id: Uuid,
) -> Result<RollbackReport> {
    let mut run = store
        .find_run(tenant_id, run_id)
        .await?
        .ok_or(ImportError::RunNotFound(run_id))?;

    if !run.can_rollback() {
        return Err(ImportError::RollbackPrecondition(format!(
            "Only completed imports can be rolled back (status: {})",
            run.status
        )));
    }
    if run.imported_ids.is_empty() {
        return Err(ImportError::RollbackPrecondition(
            "Import created no records, nothing to roll back".to_string(),
        ));
    }
    let target = run.entity_type.local_target().ok_or_else(|| {
        ImportError::RollbackPrecondition(format!(
            "{} imports only create mappings",
            run.entity_type
        ))
    })?;

    let mut released = Vec::with_capacity(run.imported_ids.len());
    let (mut deleted, mut missing, mut failed) = (0, 0, 0);

    for local_id in run.imported_ids.clone() {
        match delete_local(store, target, tenant_id, local_id).await {
            Ok(true) => {
                deleted += 1;
                released.push(local_id);
            }
            Ok(false) => {
                missing += 1;
                released.push(local_id);
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    import_id = %run.id,
                    local_id,
                    error = %e,
                    "Failed to delete imported record during rollback"
                );
                run.record_error(
                    format!("Rollback failed for {} {}: {}", target.table(), local_id, e),
                    Some(json!({ "local_id": local_id })),
                );
            }
        }
    }

    let mappings_removed = store
        .delete_mappings_for_local_ids(tenant_id, run.entity_type, &released)
        .await?;

    // Rows whose delete failed stay listed so the run still records them.
    run.status = RunStatus::RolledBack;
    run.imported_ids.retain(|id| !released.contains(id));
    store.save_run(&run).await?;

    tracing::info!(
        import_id = %run.id,
        deleted,
        missing,
        failed,
        mappings_removed,
        "Import rolled back"
    );

    Ok(RollbackReport {
        import_id: run.id,
        entity_type: run.entity_type,
        deleted,
        missing,
        failed,
        mappings_removed,
    })
}

async fn delete_local(
    store: &dyn SyncStore,
    target: LocalEntity,
    tenant_id: TenantId,
    local_id: LocalId,
) -> StoreResult<bool> {
    let mut tx = store.begin().await?;
    match tx.delete_entity(target, tenant_id, local_id).await {
        Ok(found) => {
            tx.commit().await?;
            Ok(found)
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySyncStatus {
    pub entity: RemoteEntity,
    pub mapped: i64,
    pub last_import: Option<ImportSummary>,
    pub last_import_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub entities: Vec<EntitySyncStatus>,
    pub total_mappings: i64,
}

/// Latest completed run and mapping count for every entity.
pub async fn sync_status(store: &dyn SyncStore, tenant_id: TenantId) -> StoreResult<SyncStatus> {
    let counts = store.mapping_counts(tenant_id).await?;
    let mut entities = Vec::with_capacity(RemoteEntity::IMPORT_ORDER.len());

    for entity in RemoteEntity::IMPORT_ORDER {
        let filter = RunFilter {
            entity: Some(entity),
            status: Some(RunStatus::Done),
            page: Some(1),
            per_page: Some(1),
        };
        let last = store.list_runs(tenant_id, &filter).await?.into_iter().next();

        entities.push(EntitySyncStatus {
            entity,
            mapped: counts.get(&entity).copied().unwrap_or(0),
            last_import_at: last.as_ref().and_then(|run| run.completed_at),
            last_import: last.map(|run| run.summary()),
        });
    }

    Ok(SyncStatus {
        entities,
        total_mappings: counts.values().sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;

    fn ctx(strategy: DuplicateStrategy) -> ImportContext {
        ImportContext {
            run_id: Uuid::new_v4(),
            tenant_id: 1,
            user_id: 9,
            entity: RemoteEntity::Customers,
            strategy,
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn apply(store: &MemoryStore, ctx: &ImportContext, mapped: Value) -> RecordOutcome {
        let mapped = record(mapped);
        let remote_id = FieldMapper::extract_remote_id(&mapped);
        let importer = strategy_for(ctx.entity).unwrap();
        let mut tx = store.begin().await.unwrap();
        let outcome = apply_record(ctx, importer, &mapped, remote_id, tx.as_mut())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn insert_defaults_active_flag_and_links() {
        let store = MemoryStore::new();
        let ctx = ctx(DuplicateStrategy::Skip);

        let outcome = apply(&store, &ctx, json!({"_remote_id": 10, "name": "ACME"})).await;
        let RecordOutcome::Inserted(local_id) = outcome else {
            panic!("expected an insert, got {:?}", outcome);
        };

        let row = store.entity(LocalEntity::Customer, 1, local_id).await.unwrap();
        assert_eq!(row["is_active"], true);

        let mappings = store.mappings(1, RemoteEntity::Customers).await;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].local_id, Some(local_id));
        assert_eq!(mappings[0].import_run_id, Some(ctx.run_id));
    }

    #[tokio::test]
    async fn mapped_record_is_skipped_before_transforming() {
        let store = MemoryStore::new();
        let ctx = ctx(DuplicateStrategy::Skip);

        apply(&store, &ctx, json!({"_remote_id": 10, "name": "ACME"})).await;
        let outcome = apply(&store, &ctx, json!({"_remote_id": 10, "name": "ACME renamed"})).await;

        assert_eq!(outcome, RecordOutcome::Skipped);
        assert_eq!(store.entities(LocalEntity::Customer, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn update_never_clears_existing_values() {
        let store = MemoryStore::new();
        let local_id = store
            .seed_entity(
                LocalEntity::Customer,
                1,
                record(json!({"name": "ACME", "document": "12345678000190", "email": "old@acme.com"})),
            )
            .await;

        let ctx = ctx(DuplicateStrategy::Update);
        let outcome = apply(
            &store,
            &ctx,
            json!({"_remote_id": 3, "name": "ACME Ltda", "document": "12.345.678/0001-90", "email": ""}),
        )
        .await;

        assert_eq!(outcome, RecordOutcome::Updated);
        let row = store.entity(LocalEntity::Customer, 1, local_id).await.unwrap();
        assert_eq!(row["name"], "ACME Ltda");
        assert_eq!(row["email"], "old@acme.com");
    }

    #[tokio::test]
    async fn update_follows_an_existing_mapping() {
        let store = MemoryStore::new();
        let first = ctx(DuplicateStrategy::Skip);
        let RecordOutcome::Inserted(local_id) =
            apply(&store, &first, json!({"_remote_id": 5, "name": "Old name"})).await
        else {
            panic!("expected an insert");
        };

        let second = ctx(DuplicateStrategy::Update);
        let outcome = apply(&store, &second, json!({"_remote_id": 5, "name": "New name"})).await;

        assert_eq!(outcome, RecordOutcome::Updated);
        let row = store.entity(LocalEntity::Customer, 1, local_id).await.unwrap();
        assert_eq!(row["name"], "New name");
    }

    #[tokio::test]
    async fn lookup_entities_only_write_mappings() {
        let store = MemoryStore::new();
        let ctx = ImportContext {
            entity: RemoteEntity::Segments,
            ..ctx(DuplicateStrategy::Skip)
        };

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            apply_mapping_only(&ctx, Some(4), tx.as_mut()).await.unwrap(),
            RecordOutcome::Mapped
        );
        assert_eq!(
            apply_mapping_only(&ctx, Some(4), tx.as_mut()).await.unwrap(),
            RecordOutcome::Skipped
        );
        assert_eq!(
            apply_mapping_only(&ctx, None, tx.as_mut()).await.unwrap(),
            RecordOutcome::Skipped
        );
        tx.commit().await.unwrap();

        let mappings = store.mappings(1, RemoteEntity::Segments).await;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].local_id, None);
    }

    #[tokio::test]
    async fn rollback_requires_a_done_run_with_created_ids() {
        let store = MemoryStore::new();

        let mut empty = ImportRun::new(1, 9, RemoteEntity::Customers, DuplicateStrategy::Skip, None);
        empty.finish();
        store.create_run(&empty).await.unwrap();
        assert!(matches!(
            rollback_run(&store, 1, empty.id).await,
            Err(ImportError::RollbackPrecondition(_))
        ));

        let mut failed = ImportRun::new(1, 9, RemoteEntity::Customers, DuplicateStrategy::Skip, None);
        failed.record_error("boom", None);
        failed.finish();
        store.create_run(&failed).await.unwrap();
        assert!(matches!(
            rollback_run(&store, 1, failed.id).await,
            Err(ImportError::RollbackPrecondition(_))
        ));

        assert!(matches!(
            rollback_run(&store, 2, failed.id).await,
            Err(ImportError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_reports_latest_done_run_and_mapping_counts() {
        let store = MemoryStore::new();
        let ctx = ctx(DuplicateStrategy::Skip);
        apply(&store, &ctx, json!({"_remote_id": 1, "name": "A"})).await;
        apply(&store, &ctx, json!({"_remote_id": 2, "name": "B"})).await;

        let mut run = ImportRun::new(1, 9, RemoteEntity::Customers, DuplicateStrategy::Skip, None);
        run.total_fetched = 2;
        run.finish();
        store.create_run(&run).await.unwrap();

        let status = sync_status(&store, 1).await.unwrap();
        assert_eq!(status.total_mappings, 2);

        let customers = status
            .entities
            .iter()
            .find(|s| s.entity == RemoteEntity::Customers)
            .unwrap();
        assert_eq!(customers.mapped, 2);
        assert_eq!(customers.last_import.as_ref().unwrap().import_id, run.id);

        let products = status
            .entities
            .iter()
            .find(|s| s.entity == RemoteEntity::Products)
            .unwrap();
        assert!(products.last_import.is_none());
    }
}
