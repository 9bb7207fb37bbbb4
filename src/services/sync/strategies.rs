// ============================================================================
// Entity import strategies
// ============================================================================
//
// Each business entity plugs into the generic import loop with three pieces:
// the local table it lands in, a transformer from the mapped remote record
// to a persistable row, and a duplicate finder over existing local data.
//
// Foreign references are resolved through the identity map. A reference
// whose target was never imported is left unset instead of failing the row.
//
// ============================================================================

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::error::ImportError;
use super::field_mapper::FieldMapper;
use super::normalize::{
    date_value, datetime_value, digits_only, first_value, is_blank, money_value, parse_bool,
    parse_date, parse_datetime, text,
};
use crate::models::{
    CategoryKind, DuplicateStrategy, LocalEntity, LocalId, Record, RemoteEntity, TenantId, UserId,
};
use crate::repositories::{StoreResult, SyncTx};
use crate::services::remote::envelope::as_integer;

/// Per-run values every transformer may need.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub run_id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub entity: RemoteEntity,
    pub strategy: DuplicateStrategy,
}

#[async_trait]
pub trait EntityImportStrategy: Send + Sync {
    fn target(&self) -> LocalEntity;

    /// Build the persistable row. `Ok(None)` skips the record.
    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError>;

    /// Existing local row the record duplicates, by natural key.
    async fn find_duplicate(
        &self,
        _ctx: &ImportContext,
        _row: &Record,
        _tx: &mut dyn SyncTx,
    ) -> StoreResult<Option<LocalId>> {
        Ok(None)
    }
}

/// `None` for lookup entities, which only get an identity mapping.
pub fn strategy_for(entity: RemoteEntity) -> Option<&'static dyn EntityImportStrategy> {
    match entity {
        RemoteEntity::Customers => Some(&CustomerImport),
        RemoteEntity::Equipments => Some(&EquipmentImport),
        RemoteEntity::Products => Some(&ProductImport),
        RemoteEntity::Services => Some(&ServiceImport),
        RemoteEntity::Tasks => Some(&TaskImport),
        RemoteEntity::Expenses => Some(&ExpenseImport),
        RemoteEntity::Quotations => Some(&QuotationImport),
        RemoteEntity::Segments
        | RemoteEntity::CustomerGroups
        | RemoteEntity::Keywords
        | RemoteEntity::TaskTypes
        | RemoteEntity::Users
        | RemoteEntity::Teams => None,
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn resolve_reference(
    tx: &mut dyn SyncTx,
    tenant_id: TenantId,
    entity: RemoteEntity,
    mapped: &Record,
    field: &str,
) -> StoreResult<Option<LocalId>> {
    match mapped.get(field).and_then(as_integer) {
        Some(remote_id) => tx.local_id_for(tenant_id, entity, remote_id).await,
        None => Ok(None),
    }
}

/// Look up by the first natural key the row fills in. Later keys are only
/// consulted when every earlier one is blank, so a present but unknown
/// document never falls through to a name match.
async fn find_by_keys(
    tx: &mut dyn SyncTx,
    target: LocalEntity,
    tenant_id: TenantId,
    row: &Record,
    keys: &[&str],
) -> StoreResult<Option<LocalId>> {
    let first_filled = keys
        .iter()
        .find_map(|key| text(row.get(*key)).map(|value| (*key, value)));

    match first_filled {
        Some((key, value)) => tx.find_by_natural_key(target, tenant_id, key, &value).await,
        None => Ok(None),
    }
}

async fn resolve_category(
    tx: &mut dyn SyncTx,
    kind: CategoryKind,
    tenant_id: TenantId,
    mapped: &Record,
    field: &str,
) -> StoreResult<Option<LocalId>> {
    match text(mapped.get(field)) {
        Some(name) => Ok(Some(tx.find_or_create_category(kind, tenant_id, &name).await?)),
        None => Ok(None),
    }
}

fn normalize_money(row: &mut Record, field: &str) -> Result<(), ImportError> {
    if let Some(raw) = row.get(field) {
        let normalized = money_value(raw)
            .map_err(|e| ImportError::Transform(format!("{}: {}", field, e)))?;
        match normalized {
            Some(value) => row.insert(field.to_string(), value),
            None => row.remove(field),
        };
    }
    Ok(())
}

fn insert_id(row: &mut Record, field: &str, id: Option<LocalId>) {
    if let Some(id) = id {
        row.insert(field.to_string(), Value::from(id));
    }
}

fn code_for(label: &str, ctx: &ImportContext, mapped: &Record) -> String {
    match FieldMapper::extract_remote_id(mapped) {
        Some(remote_id) => format!("{}-{:05}", label, remote_id),
        None => format!("{}-{}", label, &ctx.run_id.simple().to_string()[..8]).to_uppercase(),
    }
}

// ============================================================================
// Customers
// ============================================================================

pub struct CustomerImport;

#[async_trait]
impl EntityImportStrategy for CustomerImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Customer
    }

    async fn transform(
        &self,
        _ctx: &ImportContext,
        mapped: &Record,
        _tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = FieldMapper::strip_metadata(mapped.clone());

        let name = text(row.get("name")).unwrap_or_else(|| {
            match FieldMapper::extract_remote_id(mapped) {
                Some(remote_id) => format!("Remote customer #{}", remote_id),
                None => "Remote customer".to_string(),
            }
        });
        row.insert("name".into(), Value::String(name));

        for field in ["email", "phone"] {
            if let Some(raw) = row.get(field) {
                let value = first_value(raw).map_or(Value::Null, Value::String);
                row.insert(field.into(), value);
            }
        }

        let document = text(row.get("document")).map(|d| digits_only(&d)).filter(|d| !d.is_empty());
        match document {
            Some(document) => {
                let kind = if document.len() <= 11 { "PF" } else { "PJ" };
                row.insert("type".into(), Value::from(kind));
                row.insert("document".into(), Value::String(document));
            }
            None => {
                row.remove("document");
                row.entry("type").or_insert_with(|| Value::from("PF"));
            }
        }

        if let Some(zip) = text(row.get("address_zip")) {
            row.insert("address_zip".into(), Value::String(digits_only(&zip)));
        }

        let active = row.get("is_active").map_or(true, parse_bool);
        row.insert("is_active".into(), Value::Bool(active));

        Ok(Some(row))
    }

    async fn find_duplicate(
        &self,
        ctx: &ImportContext,
        row: &Record,
        tx: &mut dyn SyncTx,
    ) -> StoreResult<Option<LocalId>> {
        find_by_keys(tx, self.target(), ctx.tenant_id, row, &["document", "name"]).await
    }
}

// ============================================================================
// Equipments
// ============================================================================

pub struct EquipmentImport;

#[async_trait]
impl EntityImportStrategy for EquipmentImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Equipment
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = FieldMapper::strip_metadata(mapped.clone());

        // Equipments have no name column; keep the remote label in the notes.
        if let Some(name) = row.remove("name").and_then(|n| text(Some(&n))) {
            let notes = match text(row.get("notes")) {
                Some(notes) => format!("{}\nRemote name: {}", notes, name),
                None => format!("Remote name: {}", name),
            };
            row.insert("notes".into(), Value::String(notes));
        }

        let customer_id = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Customers,
            mapped,
            "_customer_remote_id",
        )
        .await?;
        insert_id(&mut row, "customer_id", customer_id);

        if let Some(category) = text(mapped.get("_category_name")) {
            row.insert("type".into(), Value::String(category.to_lowercase()));
            row.insert("category".into(), Value::String(category));
        }

        if text(row.get("code")).is_none() {
            row.insert("code".into(), Value::String(code_for("EQP", ctx, mapped)));
        }

        if text(row.get("status")).is_none() {
            row.insert("status".into(), Value::from("active"));
        }

        Ok(Some(row))
    }

    async fn find_duplicate(
        &self,
        ctx: &ImportContext,
        row: &Record,
        tx: &mut dyn SyncTx,
    ) -> StoreResult<Option<LocalId>> {
        find_by_keys(tx, self.target(), ctx.tenant_id, row, &["serial_number", "code"]).await
    }
}

// ============================================================================
// Products and services
// ============================================================================

pub struct ProductImport;

#[async_trait]
impl EntityImportStrategy for ProductImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Product
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = FieldMapper::strip_metadata(mapped.clone());

        let category_id =
            resolve_category(tx, CategoryKind::Product, ctx.tenant_id, mapped, "_category_name").await?;
        insert_id(&mut row, "category_id", category_id);

        normalize_money(&mut row, "sell_price")?;
        normalize_money(&mut row, "cost_price")?;

        if let Some(active) = row.get("is_active").map(parse_bool) {
            row.insert("is_active".into(), Value::Bool(active));
        }

        Ok(Some(row))
    }

    async fn find_duplicate(
        &self,
        ctx: &ImportContext,
        row: &Record,
        tx: &mut dyn SyncTx,
    ) -> StoreResult<Option<LocalId>> {
        find_by_keys(tx, self.target(), ctx.tenant_id, row, &["code", "name"]).await
    }
}

pub struct ServiceImport;

#[async_trait]
impl EntityImportStrategy for ServiceImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Service
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = FieldMapper::strip_metadata(mapped.clone());

        let category_id =
            resolve_category(tx, CategoryKind::Service, ctx.tenant_id, mapped, "_category_name").await?;
        insert_id(&mut row, "category_id", category_id);

        normalize_money(&mut row, "default_price")?;

        if let Some(raw) = row.remove("estimated_minutes") {
            if let Some(minutes) = as_integer(&raw) {
                row.insert("estimated_minutes".into(), Value::from(minutes));
            }
        }

        let active = row.get("is_active").map_or(true, parse_bool);
        row.insert("is_active".into(), Value::Bool(active));

        Ok(Some(row))
    }

    async fn find_duplicate(
        &self,
        ctx: &ImportContext,
        row: &Record,
        tx: &mut dyn SyncTx,
    ) -> StoreResult<Option<LocalId>> {
        find_by_keys(tx, self.target(), ctx.tenant_id, row, &["code", "name"]).await
    }
}

// ============================================================================
// Tasks -> work orders
// ============================================================================

/// Remote task status codes: 1 open, 2 in transit, 3 check-in,
/// 4 check-out, 5 finished, 6 paused.
pub fn work_order_status(raw: Option<&Value>) -> &'static str {
    match text(raw).as_deref() {
        Some("1") | Some("Open") => "open",
        Some("2") | Some("InTransit") | Some("3") | Some("CheckIn") | Some("4")
        | Some("CheckOut") => "in_progress",
        Some("5") | Some("Finished") => "completed",
        Some("6") | Some("Paused") => "on_hold",
        _ => "open",
    }
}

pub fn work_order_priority(raw: Option<&Value>) -> &'static str {
    match text(raw).map(|p| p.to_lowercase()).as_deref() {
        Some("1") | Some("low") => "low",
        Some("3") | Some("high") => "high",
        Some("4") | Some("urgent") => "urgent",
        _ => "normal",
    }
}

pub struct TaskImport;

#[async_trait]
impl EntityImportStrategy for TaskImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::WorkOrder
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = Record::new();

        let description = text(mapped.get("title"))
            .or_else(|| text(mapped.get("description")))
            .unwrap_or_else(|| "Imported from remote".to_string());
        row.insert("description".into(), Value::String(description));

        if let Some(notes) = text(mapped.get("notes")) {
            row.insert("internal_notes".into(), Value::String(notes));
        }
        row.insert("priority".into(), Value::from(work_order_priority(mapped.get("priority"))));
        row.insert("status".into(), Value::from(work_order_status(mapped.get("status"))));

        let received_at = mapped
            .get("scheduled_start")
            .and_then(parse_datetime)
            .unwrap_or_else(Utc::now);
        row.insert("received_at".into(), datetime_value(received_at));

        if let Some(completed_at) = mapped.get("completed_at").and_then(parse_datetime) {
            row.insert("completed_at".into(), datetime_value(completed_at));
        }

        let customer_id = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Customers,
            mapped,
            "_customer_remote_id",
        )
        .await?;
        insert_id(&mut row, "customer_id", customer_id);

        let technician_id = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Users,
            mapped,
            "_technician_remote_id",
        )
        .await?;
        insert_id(&mut row, "assigned_to", technician_id);

        row.insert("created_by".into(), Value::from(ctx.user_id));

        Ok(Some(row))
    }
}

// ============================================================================
// Expenses
// ============================================================================

pub struct ExpenseImport;

#[async_trait]
impl EntityImportStrategy for ExpenseImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Expense
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let mut row = FieldMapper::strip_metadata(mapped.clone());

        let spender = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Users,
            mapped,
            "_user_remote_id",
        )
        .await?;
        row.insert("created_by".into(), Value::from(spender.unwrap_or(ctx.user_id)));

        let work_order_id = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Tasks,
            mapped,
            "_task_remote_id",
        )
        .await?;
        insert_id(&mut row, "work_order_id", work_order_id);

        let category_id =
            resolve_category(tx, CategoryKind::Expense, ctx.tenant_id, mapped, "_type_name").await?;
        insert_id(&mut row, "expense_category_id", category_id);

        normalize_money(&mut row, "amount")?;

        if let Some(raw) = row.remove("expense_date") {
            if let Some(date) = parse_date(&raw) {
                row.insert("expense_date".into(), date_value(date));
            }
        }

        if row.get("status").map_or(true, is_blank) {
            row.insert("status".into(), Value::from("approved"));
        }

        Ok(Some(row))
    }
}

// ============================================================================
// Quotations
// ============================================================================

pub fn quote_status(raw: Option<&Value>) -> &'static str {
    match text(raw).map(|s| s.to_lowercase()).as_deref() {
        Some("sent") | Some("enviado") => "sent",
        Some("approved") | Some("aprovado") => "approved",
        Some("rejected") | Some("rejeitado") | Some("recusado") => "rejected",
        Some("expired") | Some("expirado") => "expired",
        Some("invoiced") | Some("faturado") => "invoiced",
        _ => "draft",
    }
}

pub struct QuotationImport;

#[async_trait]
impl EntityImportStrategy for QuotationImport {
    fn target(&self) -> LocalEntity {
        LocalEntity::Quote
    }

    async fn transform(
        &self,
        ctx: &ImportContext,
        mapped: &Record,
        tx: &mut dyn SyncTx,
    ) -> Result<Option<Record>, ImportError> {
        let customer_id = resolve_reference(
            tx,
            ctx.tenant_id,
            RemoteEntity::Customers,
            mapped,
            "_customer_remote_id",
        )
        .await?;

        let Some(customer_id) = customer_id else {
            tracing::warn!(
                remote_id = ?FieldMapper::extract_remote_id(mapped),
                "Quotation customer is not mapped locally, skipping"
            );
            return Ok(None);
        };

        let mut row = Record::new();
        let remote_id = FieldMapper::extract_remote_id(mapped).unwrap_or(0);
        row.insert("quote_number".into(), Value::String(format!("ORC-{:05}", remote_id)));
        row.insert("customer_id".into(), Value::from(customer_id));
        row.insert("seller_id".into(), Value::from(ctx.user_id));
        row.insert("status".into(), Value::from(quote_status(mapped.get("status"))));

        if let Some(title) = text(mapped.get("title")) {
            row.insert("observations".into(), Value::String(title));
        }

        let internal_notes = text(mapped.get("notes")).or_else(|| text(mapped.get("_observation")));
        if let Some(notes) = internal_notes {
            row.insert("internal_notes".into(), Value::String(notes));
        }

        if let Some(total) = mapped.get("total") {
            row.insert("total".into(), total.clone());
            normalize_money(&mut row, "total")?;
        }

        if let Some(valid_until) = mapped.get("valid_until").and_then(parse_date) {
            row.insert("valid_until".into(), date_value(valid_until));
        }

        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MemoryStore, SyncStore};
    use crate::models::NewMapping;
    use serde_json::json;

    fn ctx(entity: RemoteEntity) -> ImportContext {
        ImportContext {
            run_id: Uuid::new_v4(),
            tenant_id: 1,
            user_id: 42,
            entity,
            strategy: DuplicateStrategy::Skip,
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn transform(entity: RemoteEntity, store: &MemoryStore, mapped: Value) -> Option<Record> {
        let strategy = strategy_for(entity).unwrap();
        let mut tx = store.begin().await.unwrap();
        let row = strategy
            .transform(&ctx(entity), &record(mapped), tx.as_mut())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        row
    }

    async fn map_customer(store: &MemoryStore, remote_id: i64, local_id: i64) {
        let mut tx = store.begin().await.unwrap();
        tx.upsert_mapping(&NewMapping {
            tenant_id: 1,
            entity_type: RemoteEntity::Customers,
            remote_id,
            local_id: Some(local_id),
            import_run_id: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn customer_normalisation() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Customers,
            &store,
            json!({
                "_remote_id": 5,
                "name": "  ",
                "document": "123.456.789-01",
                "email": ["first@acme.com", "second@acme.com"],
                "phone": [{"phone": "11 99999-0000"}],
                "address_zip": "01310-100",
                "_segment_remote_id": 3,
            }),
        )
        .await
        .unwrap();

        assert_eq!(row["name"], "Remote customer #5");
        assert_eq!(row["document"], "12345678901");
        assert_eq!(row["type"], "PF");
        assert_eq!(row["email"], "first@acme.com");
        assert_eq!(row["phone"], "11 99999-0000");
        assert_eq!(row["address_zip"], "01310100");
        assert_eq!(row["is_active"], true);
        assert!(!row.contains_key("_segment_remote_id"));
    }

    #[tokio::test]
    async fn company_documents_are_pj() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Customers,
            &store,
            json!({"_remote_id": 1, "name": "ACME", "document": "12.345.678/0001-90", "is_active": "0"}),
        )
        .await
        .unwrap();
        assert_eq!(row["type"], "PJ");
        assert_eq!(row["is_active"], false);
    }

    #[tokio::test]
    async fn equipment_resolves_customer_and_generates_code() {
        let store = MemoryStore::new();
        map_customer(&store, 77, 700).await;

        let row = transform(
            RemoteEntity::Equipments,
            &store,
            json!({
                "_remote_id": 12,
                "name": "Compressor",
                "_customer_remote_id": 77,
                "_category_name": "HVAC",
            }),
        )
        .await
        .unwrap();

        assert_eq!(row["customer_id"], 700);
        assert_eq!(row["code"], "EQP-00012");
        assert_eq!(row["status"], "active");
        assert_eq!(row["category"], "HVAC");
        assert_eq!(row["type"], "hvac");
        assert_eq!(row["notes"], "Remote name: Compressor");
        assert!(!row.contains_key("name"));
    }

    #[tokio::test]
    async fn unmapped_customer_is_left_unset_on_equipment() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Equipments,
            &store,
            json!({"_remote_id": 12, "_customer_remote_id": 999}),
        )
        .await
        .unwrap();
        assert!(!row.contains_key("customer_id"));
    }

    #[tokio::test]
    async fn product_prices_and_category() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Products,
            &store,
            json!({"_remote_id": 1, "name": "Filtro", "sell_price": "150,5", "_category_name": "Peças"}),
        )
        .await
        .unwrap();

        assert_eq!(row["sell_price"], "150.50");
        assert!(row["category_id"].is_i64());
        assert_eq!(store.category_count(CategoryKind::Product, 1).await, 1);
    }

    #[tokio::test]
    async fn invalid_price_is_a_transform_error() {
        let store = MemoryStore::new();
        let strategy = strategy_for(RemoteEntity::Products).unwrap();
        let mut tx = store.begin().await.unwrap();
        let result = strategy
            .transform(
                &ctx(RemoteEntity::Products),
                &record(json!({"_remote_id": 1, "sell_price": "abc"})),
                tx.as_mut(),
            )
            .await;
        assert!(matches!(result, Err(ImportError::Transform(_))));
    }

    #[tokio::test]
    async fn task_becomes_work_order() {
        let store = MemoryStore::new();
        map_customer(&store, 3, 30).await;

        let row = transform(
            RemoteEntity::Tasks,
            &store,
            json!({
                "_remote_id": 9,
                "title": "Preventiva",
                "status": 5,
                "priority": "3",
                "scheduled_start": "2025-01-10T08:00:00",
                "_customer_remote_id": 3,
            }),
        )
        .await
        .unwrap();

        assert_eq!(row["description"], "Preventiva");
        assert_eq!(row["status"], "completed");
        assert_eq!(row["priority"], "high");
        assert_eq!(row["received_at"], "2025-01-10T08:00:00Z");
        assert_eq!(row["customer_id"], 30);
        assert_eq!(row["created_by"], 42);
    }

    async fn duplicate_of(entity: RemoteEntity, store: &MemoryStore, row: Value) -> Option<LocalId> {
        let strategy = strategy_for(entity).unwrap();
        let mut tx = store.begin().await.unwrap();
        strategy
            .find_duplicate(&ctx(entity), &record(row), tx.as_mut())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn secondary_key_is_only_used_when_the_primary_is_blank() {
        let store = MemoryStore::new();
        let customer = store
            .seed_entity(
                LocalEntity::Customer,
                1,
                record(json!({"name": "Padaria Central", "document": "11111111111"})),
            )
            .await;
        let equipment = store
            .seed_entity(
                LocalEntity::Equipment,
                1,
                record(json!({"code": "EQP-00001", "serial_number": "SN-1"})),
            )
            .await;
        let product = store
            .seed_entity(
                LocalEntity::Product,
                1,
                record(json!({"code": "P-1", "name": "Filtro"})),
            )
            .await;

        let cases = [
            (
                RemoteEntity::Customers,
                json!({"name": "Padaria Central", "document": "22222222222"}),
                json!({"name": "Padaria Central", "document": ""}),
                customer,
            ),
            (
                RemoteEntity::Equipments,
                json!({"serial_number": "SN-2", "code": "EQP-00001"}),
                json!({"serial_number": null, "code": "EQP-00001"}),
                equipment,
            ),
            (
                RemoteEntity::Products,
                json!({"code": "P-2", "name": "Filtro"}),
                json!({"code": "  ", "name": "Filtro"}),
                product,
            ),
        ];

        for (entity, unmatched_primary, blank_primary, existing) in cases {
            assert_eq!(duplicate_of(entity, &store, unmatched_primary).await, None, "{}", entity);
            assert_eq!(
                duplicate_of(entity, &store, blank_primary).await,
                Some(existing),
                "{}",
                entity
            );
        }
    }

    #[test]
    fn status_vocabularies_default_safely() {
        assert_eq!(work_order_status(Some(&json!("InTransit"))), "in_progress");
        assert_eq!(work_order_status(Some(&json!(6))), "on_hold");
        assert_eq!(work_order_status(None), "open");
        assert_eq!(work_order_priority(Some(&json!("Urgent"))), "urgent");
        assert_eq!(work_order_priority(Some(&json!("whatever"))), "normal");
        assert_eq!(quote_status(Some(&json!("Aprovado"))), "approved");
        assert_eq!(quote_status(Some(&json!("recusado"))), "rejected");
        assert_eq!(quote_status(Some(&json!("???"))), "draft");
    }

    #[tokio::test]
    async fn expense_defaults() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Expenses,
            &store,
            json!({
                "_remote_id": 4,
                "description": "Combustível",
                "amount": "89,90",
                "expense_date": "2025-02-01T10:00:00",
                "_type_name": "Transporte",
                "_user_remote_id": 1234,
            }),
        )
        .await
        .unwrap();

        assert_eq!(row["amount"], "89.90");
        assert_eq!(row["expense_date"], "2025-02-01");
        assert_eq!(row["status"], "approved");
        assert_eq!(row["created_by"], 42);
        assert!(row["expense_category_id"].is_i64());
    }

    #[tokio::test]
    async fn quotation_without_mapped_customer_is_skipped() {
        let store = MemoryStore::new();
        let row = transform(
            RemoteEntity::Quotations,
            &store,
            json!({"_remote_id": 1, "title": "Orçamento", "_customer_remote_id": 555}),
        )
        .await;
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn quotation_fields() {
        let store = MemoryStore::new();
        map_customer(&store, 5, 50).await;

        let row = transform(
            RemoteEntity::Quotations,
            &store,
            json!({
                "_remote_id": 42,
                "title": "Manutenção anual",
                "_customer_remote_id": 5,
                "status": "Enviado",
                "total": "1.500,00",
                "valid_until": "not-a-date",
                "_observation": "Cliente pediu desconto",
            }),
        )
        .await
        .unwrap();

        assert_eq!(row["quote_number"], "ORC-00042");
        assert_eq!(row["observations"], "Manutenção anual");
        assert_eq!(row["internal_notes"], "Cliente pediu desconto");
        assert_eq!(row["customer_id"], 50);
        assert_eq!(row["seller_id"], 42);
        assert_eq!(row["status"], "sent");
        assert_eq!(row["total"], "1500.00");
        assert!(!row.contains_key("valid_until"));
        assert!(!row.contains_key("title"));
    }
}
