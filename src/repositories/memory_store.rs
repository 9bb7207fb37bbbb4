// In-process store
// Backs the engines in tests and local dry runs. A transaction holds the
// store lock for its whole lifetime and works on a copy of the state, so
// commit is a swap and rollback (or drop) is a discard. Do not call
// `SyncStore` methods while a transaction from the same store is open.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{StoreError, StoreResult, SyncStore, SyncTx};
use crate::models::{
    CategoryKind, EncryptedCredentials, IdentityMapping, ImportRun, LocalEntity, LocalId,
    MappingFilter, MappingPage, NewMapping, Record, RemoteEntity, RemoteId, RunFilter, TenantId,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    last_id: LocalId,
    entities: BTreeMap<(LocalEntity, TenantId, LocalId), Record>,
    categories: BTreeMap<(CategoryKind, TenantId, String), LocalId>,
    mappings: BTreeMap<(TenantId, RemoteEntity, RemoteId), IdentityMapping>,
    runs: HashMap<Uuid, ImportRun>,
    credentials: HashMap<TenantId, EncryptedCredentials>,
    undeletable: HashSet<(LocalEntity, LocalId)>,
}

impl MemoryState {
    fn next_id(&mut self) -> LocalId {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a local row directly, bypassing any import.
    pub async fn seed_entity(&self, target: LocalEntity, tenant_id: TenantId, row: Record) -> LocalId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state
            .entities
            .insert((target, tenant_id, id), stored_row(id, tenant_id, row));
        id
    }

    pub async fn entity(&self, target: LocalEntity, tenant_id: TenantId, id: LocalId) -> Option<Record> {
        let state = self.state.lock().await;
        state.entities.get(&(target, tenant_id, id)).cloned()
    }

    /// All rows of one table for a tenant, ordered by id.
    pub async fn entities(&self, target: LocalEntity, tenant_id: TenantId) -> Vec<(LocalId, Record)> {
        let state = self.state.lock().await;
        state
            .entities
            .iter()
            .filter(|((t, tenant, _), _)| *t == target && *tenant == tenant_id)
            .map(|((_, _, id), row)| (*id, row.clone()))
            .collect()
    }

    pub async fn mappings(&self, tenant_id: TenantId, entity: RemoteEntity) -> Vec<IdentityMapping> {
        let state = self.state.lock().await;
        state
            .mappings
            .values()
            .filter(|m| m.tenant_id == tenant_id && m.entity_type == entity)
            .cloned()
            .collect()
    }

    pub async fn category_count(&self, kind: CategoryKind, tenant_id: TenantId) -> usize {
        let state = self.state.lock().await;
        state
            .categories
            .keys()
            .filter(|(k, tenant, _)| *k == kind && *tenant == tenant_id)
            .count()
    }

    /// Make every later delete of this row fail, as a foreign-key
    /// violation would.
    pub async fn reject_deletes_of(&self, target: LocalEntity, id: LocalId) {
        self.state.lock().await.undeletable.insert((target, id));
    }
}

fn stored_row(id: LocalId, tenant_id: TenantId, mut row: Record) -> Record {
    row.insert("id".to_string(), Value::from(id));
    row.insert("tenant_id".to_string(), Value::from(tenant_id));
    row
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn ensure_columns(target: LocalEntity, row: &Record) -> StoreResult<()> {
    match row.keys().find(|column| !target.is_fillable(column)) {
        Some(column) => Err(StoreError::Conflict(format!(
            "column {} is not writable on {}",
            column,
            target.table()
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// Transaction
// ============================================================================

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl SyncTx for MemoryTx {
    async fn find_mapping(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        remote_id: RemoteId,
    ) -> StoreResult<Option<IdentityMapping>> {
        Ok(self.working.mappings.get(&(tenant_id, entity, remote_id)).cloned())
    }

    async fn find_mapping_by_local(
        &mut self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_id: LocalId,
    ) -> StoreResult<Option<IdentityMapping>> {
        Ok(self
            .working
            .mappings
            .values()
            .find(|m| m.tenant_id == tenant_id && m.entity_type == entity && m.local_id == Some(local_id))
            .cloned())
    }

    async fn upsert_mapping(&mut self, mapping: &NewMapping) -> StoreResult<()> {
        let key = (mapping.tenant_id, mapping.entity_type, mapping.remote_id);
        let now = Utc::now();

        match self.working.mappings.get_mut(&key) {
            Some(existing) => {
                existing.local_id = mapping.local_id;
                if mapping.import_run_id.is_some() {
                    existing.import_run_id = mapping.import_run_id;
                }
                existing.updated_at = now;
            }
            None => {
                self.working
                    .mappings
                    .insert(key, mapping.clone().into_mapping(now));
            }
        }
        Ok(())
    }

    async fn find_by_natural_key(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        column: &str,
        value: &str,
    ) -> StoreResult<Option<LocalId>> {
        Ok(self
            .working
            .entities
            .iter()
            .filter(|((t, tenant, _), _)| *t == target && *tenant == tenant_id)
            .find(|(_, row)| row.get(column).and_then(value_text).as_deref() == Some(value))
            .map(|((_, _, id), _)| *id))
    }

    async fn find_or_create_category(
        &mut self,
        kind: CategoryKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StoreResult<LocalId> {
        let key = (kind, tenant_id, name.to_string());
        if let Some(id) = self.working.categories.get(&key) {
            return Ok(*id);
        }
        let id = self.working.next_id();
        self.working.categories.insert(key, id);
        Ok(id)
    }

    async fn load_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<Option<Record>> {
        Ok(self.working.entities.get(&(target, tenant_id, local_id)).cloned())
    }

    async fn insert_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        row: &Record,
    ) -> StoreResult<LocalId> {
        ensure_columns(target, row)?;
        let id = self.working.next_id();
        self.working
            .entities
            .insert((target, tenant_id, id), stored_row(id, tenant_id, row.clone()));
        Ok(id)
    }

    async fn update_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
        changes: &Record,
    ) -> StoreResult<()> {
        ensure_columns(target, changes)?;
        let row = self
            .working
            .entities
            .get_mut(&(target, tenant_id, local_id))
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", target.table(), local_id)))?;
        for (column, value) in changes {
            row.insert(column.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_entity(
        &mut self,
        target: LocalEntity,
        tenant_id: TenantId,
        local_id: LocalId,
    ) -> StoreResult<bool> {
        if self.working.undeletable.contains(&(target, local_id)) {
            return Err(StoreError::Conflict(format!(
                "{} {} is still referenced",
                target.table(),
                local_id
            )));
        }
        Ok(self
            .working
            .entities
            .remove(&(target, tenant_id, local_id))
            .is_some())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl SyncStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn SyncTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn create_run(&self, run: &ImportRun) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("import run {} already exists", run.id)));
        }
        state.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn save_run(&self, run: &ImportRun) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        match state.runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("import run {}", run.id))),
        }
    }

    async fn find_run(&self, tenant_id: TenantId, run_id: Uuid) -> StoreResult<Option<ImportRun>> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .get(&run_id)
            .filter(|run| run.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_runs(&self, tenant_id: TenantId, filter: &RunFilter) -> StoreResult<Vec<ImportRun>> {
        let state = self.state.lock().await;
        let mut runs: Vec<ImportRun> = state
            .runs
            .values()
            .filter(|run| run.tenant_id == tenant_id)
            .filter(|run| filter.entity.map_or(true, |e| run.entity_type == e))
            .filter(|run| filter.status.map_or(true, |s| run.status == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn delete_mappings_for_local_ids(
        &self,
        tenant_id: TenantId,
        entity: RemoteEntity,
        local_ids: &[LocalId],
    ) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.mappings.len();
        state.mappings.retain(|_, m| {
            !(m.tenant_id == tenant_id
                && m.entity_type == entity
                && m.local_id.map_or(false, |id| local_ids.contains(&id)))
        });
        Ok((before - state.mappings.len()) as u64)
    }

    async fn mapping_counts(&self, tenant_id: TenantId) -> StoreResult<BTreeMap<RemoteEntity, i64>> {
        let state = self.state.lock().await;
        let mut counts = BTreeMap::new();
        for mapping in state.mappings.values().filter(|m| m.tenant_id == tenant_id) {
            *counts.entry(mapping.entity_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_mappings(&self, tenant_id: TenantId, filter: &MappingFilter) -> StoreResult<MappingPage> {
        let state = self.state.lock().await;
        let mut mappings: Vec<IdentityMapping> = state
            .mappings
            .values()
            .filter(|m| m.tenant_id == tenant_id)
            .filter(|m| filter.entity.map_or(true, |e| m.entity_type == e))
            .cloned()
            .collect();
        // Stable tie-break for rows written within the same instant.
        mappings.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.remote_id.cmp(&a.remote_id))
        });

        let total = mappings.len() as i64;
        let mappings = mappings
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok(MappingPage { mappings, total })
    }

    async fn load_credentials(&self, tenant_id: TenantId) -> StoreResult<Option<EncryptedCredentials>> {
        Ok(self.state.lock().await.credentials.get(&tenant_id).cloned())
    }

    async fn save_credentials(
        &self,
        tenant_id: TenantId,
        credentials: &EncryptedCredentials,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .credentials
            .insert(tenant_id, credentials.clone());
        Ok(())
    }
}
