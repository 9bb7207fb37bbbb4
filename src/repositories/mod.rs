// Persistence seams for the sync engines.
// `SyncStore` owns run history, credentials and bulk mapping maintenance;
// `SyncTx` is one database transaction covering a single record's entity
// write together with its identity mapping.

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryStore;
pub use pg_store::PgSyncStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CategoryKind, EncryptedCredentials, IdentityMapping, ImportRun, LocalEntity, LocalId,
    MappingFilter, MappingPage, NewMapping, Record, RemoteEntity, RemoteId, RunFilter, TenantId,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait SyncTx: Send {
    // ------------------------------------------------------------------
    // Identity map
    // ------------------------------------------------------------------

    async fn find_mapping(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        remote_id: RemoteId,
    ) -> StoreResult<Option<IdentityMapping>>;

    async fn find_mapping_by_local(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
    ) -> StoreResult<Option<IdentityMapping>>;

    /// Insert or overwrite the mapping for `(tenant, entity, remote_id)`.
    async fn upsert_mapping(&mut self, mapping: &NewMapping) -> StoreResult<()>;

    async fn is_mapped(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        remote_id: RemoteId,
    ) -> StoreResult<bool> {
        Ok(self.find_mapping(tenant_id, entity, remote_id).await?.is_some())
    }

    /// Local id a remote record was imported into, if any.
    async fn local_id_for(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        remote_id: RemoteId,
    ) -> StoreResult<Option<LocalId>> {
        Ok(self
            .find_mapping(tenant_id, entity, remote_id)
            .await?
            .and_then(|mapping| mapping.local_id))
    }

    // ------------------------------------------------------------------
    // Local entities
    // ------------------------------------------------------------------

    /// First local row (lowest id) whose `column` equals `value`.
    async fn find_by_natural_key(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        column: &str,
        value: &str,
    ) -> StoreResult<Option<LocalId>>;

    async fn find_or_create_category(
        &mut self,
        kind: CategoryKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StoreResult<LocalId>;

    async fn load_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<Option<Record>>;

    async fn insert_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        row: &Record,
    ) -> StoreResult<LocalId>;

    async fn update_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
        changes: &Record,
    ) -> StoreResult<()>;

    /// `Ok(false)` when the row no longer exists.
    async fn delete_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn SyncTx>>;

    async fn create_run(&self, run: &ImportRun) -> StoreResult<()>;

    async fn save_run(&self, run: &ImportRun) -> StoreResult<()>;

    async fn find_run(&self, tenant_id: TenantId, run_id: Uuid) -> StoreResult<Option<ImportRun>>;

    /// Newest first.
    async fn list_runs(&self, tenant_id: TenantId, filter: &RunFilter) -> StoreResult<Vec<ImportRun>>;

    async fn delete_mappings_for_local_ids(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_ids: &[LocalId],
    ) -> StoreResult<u64>;

    async fn mapping_counts(&self, tenant_id: TenantId) -> StoreResult<BTreeMap<RemoteEntity, i64>>;

    /// Newest first, optionally narrowed to one entity type.
    async fn list_mappings(&self, tenant_id: TenantId, filter: &MappingFilter) -> StoreResult<MappingPage>;

    /// Credentials are stored and returned sealed; callers own the key.
    async fn load_credentials(&self, tenant_id: TenantId) -> StoreResult<Option<EncryptedCredentials>>;

    async fn save_credentials(
        &self,
        tenant_id: TenantId,
        credentials: &EncryptedCredentials,
    ) -> StoreResult<()>;
}
