use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{query, PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{StoreError, StoreResult, SyncStore, SyncTx};
use crate::models::{
    CategoryKind, EncryptedCredentials, ErrorEntry, IdentityMapping, ImportRun, LocalEntity,
    LocalId, MappingFilter, MappingPage, NewMapping, Record, RemoteEntity, RemoteId, RunFilter,
    TenantId,
};

const CREDENTIALS_KEY: &str = "remote_credentials";

const MAPPING_COLUMNS: &str =
    "tenant_id, entity_type, remote_id, local_id, import_run_id, created_at, updated_at";

const RUN_COLUMNS: &str = "id, tenant_id, user_id, entity_type, status, duplicate_strategy, filters, \
     total_fetched, total_imported, total_updated, total_skipped, total_errors, total_mapped, \
     error_log, imported_ids, started_at, completed_at, created_at";

pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn mapping_from_row(row: &PgRow) -> StoreResult<IdentityMapping> {
    let entity_type: String = row.try_get("entity_type")?;
    Ok(IdentityMapping {
        tenant_id: row.try_get("tenant_id")?,
        entity_type: entity_type
            .parse()
            .map_err(|e: crate::models::UnknownEntity| StoreError::Corrupt(e.to_string()))?,
        remote_id: row.try_get("remote_id")?,
        local_id: row.try_get("local_id")?,
        import_run_id: row.try_get("import_run_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn run_from_row(row: &PgRow) -> StoreResult<ImportRun> {
    let entity_type: String = row.try_get("entity_type")?;
    let status: String = row.try_get("status")?;
    let strategy: String = row.try_get("duplicate_strategy")?;
    let error_log: Json<Vec<ErrorEntry>> = row.try_get("error_log")?;

    Ok(ImportRun {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        entity_type: entity_type
            .parse()
            .map_err(|e: crate::models::UnknownEntity| StoreError::Corrupt(e.to_string()))?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        duplicate_strategy: strategy.parse().map_err(StoreError::Corrupt)?,
        filters: row.try_get("filters")?,
        total_fetched: row.try_get("total_fetched")?,
        total_imported: row.try_get("total_imported")?,
        total_updated: row.try_get("total_updated")?,
        total_skipped: row.try_get("total_skipped")?,
        total_errors: row.try_get("total_errors")?,
        total_mapped: row.try_get("total_mapped")?,
        error_log: error_log.0,
        imported_ids: row.try_get("imported_ids")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Writable columns present in `row`, in fillable order. Column names are
/// only ever taken from the static whitelist, never from the payload.
fn writable_columns(target: LocalEntity, row: &Record) -> Vec<&'static str> {
    target
        .fillable()
        .iter()
        .copied()
        .filter(|column| row.contains_key(*column))
        .collect()
}

// ============================================================================
// Transaction
// ============================================================================

pub struct PgSyncTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SyncTx for PgSyncTx {
    async fn find_mapping(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        remote_id: RemoteId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let sql = format!(
            "SELECT {} FROM remote_id_mappings WHERE tenant_id = $1 AND entity_type = $2 AND remote_id = $3",
            MAPPING_COLUMNS
        );
        let row = query(&sql)
            .bind(tenant_id)
            .bind(entity.as_str())
            .bind(remote_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn find_mapping_by_local(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let sql = format!(
            "SELECT {} FROM remote_id_mappings WHERE tenant_id = $1 AND entity_type = $2 AND local_id = $3 \
             ORDER BY updated_at DESC LIMIT 1",
            MAPPING_COLUMNS
        );
        let row = query(&sql)
            .bind(tenant_id)
            .bind(entity.as_str())
            .bind(local_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn upsert_mapping(&mut self, mapping: &NewMapping) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO remote_id_mappings (tenant_id, entity_type, remote_id, local_id, import_run_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, entity_type, remote_id) DO UPDATE
            SET local_id = EXCLUDED.local_id,
                import_run_id = COALESCE(EXCLUDED.import_run_id, remote_id_mappings.import_run_id),
                updated_at = NOW()
            "#,
        )
        .bind(mapping.tenant_id)
        .bind(mapping.entity_type.as_str())
        .bind(mapping.remote_id)
        .bind(mapping.local_id)
        .bind(mapping.import_run_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_by_natural_key(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        column: &str,
        value: &str,
    ) -> StoreResult<Option<LocalId>> {
        if !target.is_fillable(column) {
            return Err(StoreError::Conflict(format!(
                "{} is not a lookup column of {}",
                column,
                target.table()
            )));
        }

        let sql = format!(
            "SELECT id FROM {} WHERE tenant_id = $1 AND {}::text = $2 ORDER BY id LIMIT 1",
            target.table(),
            column
        );
        let row = query(&sql)
            .bind(tenant_id)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| r.try_get::<LocalId, _>("id")).transpose()?)
    }

    async fn find_or_create_category(
        &mut self,
        kind: CategoryKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StoreResult<LocalId> {
        let select = format!(
            "SELECT id FROM {} WHERE tenant_id = $1 AND name = $2 ORDER BY id LIMIT 1",
            kind.table()
        );
        if let Some(row) = query(&select)
            .bind(tenant_id)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?
        {
            return Ok(row.try_get("id")?);
        }

        let insert = format!(
            "INSERT INTO {} (tenant_id, name) VALUES ($1, $2) RETURNING id",
            kind.table()
        );
        let row = query(&insert)
            .bind(tenant_id)
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.try_get("id")?)
    }

    async fn load_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<Option<Record>> {
        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE t.id = $1 AND t.tenant_id = $2",
            target.table()
        );
        let row = query(&sql)
            .bind(local_id)
            .bind(tenant_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => {
                let value: Value = row.try_get("row")?;
                match value {
                    Value::Object(record) => Ok(Some(record)),
                    other => Err(StoreError::Corrupt(format!(
                        "{} row is not an object: {}",
                        target.table(),
                        other
                    ))),
                }
            }
            None => Ok(None),
        }
    }

    async fn insert_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        row: &Record,
    ) -> StoreResult<LocalId> {
        let columns = writable_columns(target, row);
        let table = target.table();

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} (tenant_id) VALUES ($1) RETURNING id", table)
        } else {
            let selected: Vec<String> = columns.iter().map(|c| format!("r.{}", c)).collect();
            format!(
                "INSERT INTO {table} (tenant_id, {cols}) \
                 SELECT $1, {selected} FROM jsonb_populate_record(NULL::{table}, $2) r \
                 RETURNING id",
                table = table,
                cols = columns.join(", "),
                selected = selected.join(", ")
            )
        };

        let inserted = query(&sql)
            .bind(tenant_id)
            .bind(Json(Value::Object(row.clone())))
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(inserted.try_get("id")?)
    }

    async fn update_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
        changes: &Record,
    ) -> StoreResult<()> {
        let columns = writable_columns(target, changes);
        if columns.is_empty() {
            return Ok(());
        }

        let table = target.table();
        let selected: Vec<String> = columns.iter().map(|c| format!("r.{}", c)).collect();
        let sql = format!(
            "UPDATE {table} t SET ({cols}, updated_at) = \
             (SELECT {selected}, NOW() FROM jsonb_populate_record(NULL::{table}, $3) r) \
             WHERE t.id = $1 AND t.tenant_id = $2",
            table = table,
            cols = columns.join(", "),
            selected = selected.join(", ")
        );

        let result = query(&sql)
            .bind(local_id)
            .bind(tenant_id)
            .bind(Json(Value::Object(changes.clone())))
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{} {}", table, local_id)));
        }
        Ok(())
    }

    async fn delete_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND tenant_id = $2", target.table());
        let result = query(&sql)
            .bind(local_id)
            .bind(tenant_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn begin(&self) -> StoreResult<Box<dyn SyncTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSyncTx { tx }))
    }

    async fn create_run(&self, run: &ImportRun) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO remote_import_runs (
                id, tenant_id, user_id, entity_type, status, duplicate_strategy, filters,
                total_fetched, total_imported, total_updated, total_skipped, total_errors, total_mapped,
                error_log, imported_ids, started_at, completed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id)
        .bind(run.user_id)
        .bind(run.entity_type.as_str())
        .bind(run.status.as_str())
        .bind(run.duplicate_strategy.as_str())
        .bind(&run.filters)
        .bind(run.total_fetched)
        .bind(run.total_imported)
        .bind(run.total_updated)
        .bind(run.total_skipped)
        .bind(run.total_errors)
        .bind(run.total_mapped)
        .bind(Json(&run.error_log))
        .bind(&run.imported_ids)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_run(&self, run: &ImportRun) -> StoreResult<()> {
        let result = query(
            r#"
            UPDATE remote_import_runs
            SET status = $3,
                total_fetched = $4,
                total_imported = $5,
                total_updated = $6,
                total_skipped = $7,
                total_errors = $8,
                total_mapped = $9,
                error_log = $10,
                imported_ids = $11,
                started_at = $12,
                completed_at = $13,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id)
        .bind(run.status.as_str())
        .bind(run.total_fetched)
        .bind(run.total_imported)
        .bind(run.total_updated)
        .bind(run.total_skipped)
        .bind(run.total_errors)
        .bind(run.total_mapped)
        .bind(Json(&run.error_log))
        .bind(&run.imported_ids)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("import run {}", run.id)));
        }
        Ok(())
    }

    async fn find_run(&self, tenant_id: TenantId, run_id: Uuid) -> StoreResult<Option<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM remote_import_runs WHERE id = $1 AND tenant_id = $2",
            RUN_COLUMNS
        );
        let row = query(&sql)
            .bind(run_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(&self, tenant_id: TenantId, filter: &RunFilter) -> StoreResult<Vec<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM remote_import_runs \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR entity_type = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5",
            RUN_COLUMNS
        );
        let rows = query(&sql)
            .bind(tenant_id)
            .bind(filter.entity.map(|e| e.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(i64::from(filter.limit()))
            .bind(i64::from(filter.offset()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(run_from_row).collect()
    }

    async fn delete_mappings_for_local_ids(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_ids: &[LocalId],
    ) -> StoreResult<u64> {
        if local_ids.is_empty() {
            return Ok(0);
        }

        let result = query(
            "DELETE FROM remote_id_mappings WHERE tenant_id = $1 AND entity_type = $2 AND local_id = ANY($3)",
        )
        .bind(tenant_id)
        .bind(entity.as_str())
        .bind(local_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mapping_counts(&self, tenant_id: TenantId) -> StoreResult<BTreeMap<RemoteEntity, i64>> {
        let rows = query(
            "SELECT entity_type, COUNT(*) AS total FROM remote_id_mappings WHERE tenant_id = $1 GROUP BY entity_type",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let entity_type: String = row.try_get("entity_type")?;
            // Rows written by a newer release with entity kinds we do not know yet.
            if let Ok(entity) = entity_type.parse::<RemoteEntity>() {
                counts.insert(entity, row.try_get::<i64, _>("total")?);
            }
        }
        Ok(counts)
    }

    async fn list_mappings(&self, tenant_id: TenantId, filter: &MappingFilter) -> StoreResult<MappingPage> {
        let entity = filter.entity.map(|e| e.as_str());

        let total: i64 = query(
            "SELECT COUNT(*) AS total FROM remote_id_mappings \
             WHERE tenant_id = $1 AND ($2::text IS NULL OR entity_type = $2)",
        )
        .bind(tenant_id)
        .bind(entity)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let sql = format!(
            "SELECT {} FROM remote_id_mappings \
             WHERE tenant_id = $1 AND ($2::text IS NULL OR entity_type = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4",
            MAPPING_COLUMNS
        );
        let rows = query(&sql)
            .bind(tenant_id)
            .bind(entity)
            .bind(i64::from(filter.limit()))
            .bind(i64::from(filter.offset()))
            .fetch_all(&self.pool)
            .await?;

        Ok(MappingPage {
            mappings: rows.iter().map(mapping_from_row).collect::<StoreResult<_>>()?,
            total,
        })
    }

    async fn load_credentials(&self, tenant_id: TenantId) -> StoreResult<Option<EncryptedCredentials>> {
        let row = query("SELECT value FROM tenant_settings WHERE tenant_id = $1 AND key = $2")
            .bind(tenant_id)
            .bind(CREDENTIALS_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: Value = row.try_get("value")?;
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    async fn save_credentials(
        &self,
        tenant_id: TenantId,
        credentials: &EncryptedCredentials,
    ) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO tenant_settings (tenant_id, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(CREDENTIALS_KEY)
        .bind(Json(credentials))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
