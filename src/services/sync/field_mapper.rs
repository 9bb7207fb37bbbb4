// Field mapping tables
// Remote and local vocabularies for every synced entity, declared as data.
// Local names starting with `_` are metadata: they carry remote ids and
// lookup names to the transformers and are never persisted.

use serde_json::Value;

use crate::models::{Record, RemoteEntity, RemoteId, UnknownEntity};
use crate::services::remote::envelope::as_integer;

/// `(remote field, local field)` pairs.
pub type FieldMap = &'static [(&'static str, &'static str)];

pub const METADATA_PREFIX: char = '_';
pub const REMOTE_ID_FIELD: &str = "_remote_id";

// ============================================================================
// Inbound maps (remote -> local)
// ============================================================================

const CUSTOMERS: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("description", "name"),
    ("cpfCnpj", "document"),
    ("email", "email"),
    ("phone", "phone"),
    ("address", "address_street"),
    ("addressNumber", "address_number"),
    ("addressComplement", "address_complement"),
    ("neighborhood", "address_neighborhood"),
    ("city", "address_city"),
    ("state", "address_state"),
    ("zipCode", "address_zip"),
    ("note", "notes"),
    ("active", "is_active"),
    ("segmentId", "_segment_remote_id"),
    ("groupId", "_group_remote_id"),
];

const EQUIPMENTS: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("name", "name"),
    ("identifier", "code"),
    ("serialNumber", "serial_number"),
    ("brand", "brand"),
    ("model", "model"),
    ("description", "notes"),
    ("status", "status"),
    ("associatedCustomerId", "_customer_remote_id"),
    ("categoryName", "_category_name"),
];

const PRODUCTS: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("code", "code"),
    ("name", "name"),
    ("description", "description"),
    ("unit", "unit"),
    ("unitaryValue", "sell_price"),
    ("unitaryCost", "cost_price"),
    ("totalStock", "stock_qty"),
    ("active", "is_active"),
    ("categoryName", "_category_name"),
];

const SERVICES: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("code", "code"),
    ("title", "name"),
    ("description", "description"),
    ("price", "default_price"),
    ("estimatedDuration", "estimated_minutes"),
    ("active", "is_active"),
    ("categoryName", "_category_name"),
];

const TASKS: FieldMap = &[
    ("taskID", REMOTE_ID_FIELD),
    ("title", "title"),
    ("orientation", "description"),
    ("report", "notes"),
    ("taskStatus", "status"),
    ("priority", "priority"),
    ("taskDate", "scheduled_start"),
    ("checkOutDate", "completed_at"),
    ("customerId", "_customer_remote_id"),
    ("idUserTo", "_technician_remote_id"),
    ("taskType", "_task_type_remote_id"),
];

const EXPENSES: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("description", "description"),
    ("amount", "amount"),
    ("date", "expense_date"),
    ("observation", "notes"),
    ("typeName", "_type_name"),
    ("userId", "_user_remote_id"),
    ("taskId", "_task_remote_id"),
];

const QUOTATIONS: FieldMap = &[
    ("id", REMOTE_ID_FIELD),
    ("title", "title"),
    ("customerId", "_customer_remote_id"),
    ("status", "status"),
    ("totalValue", "total"),
    ("validUntil", "valid_until"),
    ("notes", "notes"),
    ("observation", "_observation"),
];

const USERS: FieldMap = &[
    ("userID", REMOTE_ID_FIELD),
    ("name", "_name"),
    ("login", "_login"),
    ("email", "_email"),
];

const LOOKUP: FieldMap = &[("id", REMOTE_ID_FIELD), ("description", "_name")];

// ============================================================================
// Outbound maps (local -> remote)
// ============================================================================

const CUSTOMERS_OUT: FieldMap = &[
    ("name", "description"),
    ("document", "cpfCnpj"),
    ("email", "email"),
    ("phone", "phone"),
    ("address_street", "address"),
    ("address_number", "addressNumber"),
    ("address_complement", "addressComplement"),
    ("address_neighborhood", "neighborhood"),
    ("address_city", "city"),
    ("address_state", "state"),
    ("address_zip", "zipCode"),
    ("notes", "note"),
    ("is_active", "active"),
];

const EQUIPMENTS_OUT: FieldMap = &[
    ("code", "identifier"),
    ("serial_number", "serialNumber"),
    ("brand", "brand"),
    ("model", "model"),
    ("notes", "description"),
    ("category", "categoryName"),
    ("status", "status"),
];

const PRODUCTS_OUT: FieldMap = &[
    ("code", "code"),
    ("name", "name"),
    ("description", "description"),
    ("unit", "unit"),
    ("sell_price", "unitaryValue"),
    ("cost_price", "unitaryCost"),
    ("is_active", "active"),
];

const SERVICES_OUT: FieldMap = &[
    ("code", "code"),
    ("name", "title"),
    ("description", "description"),
    ("default_price", "price"),
    ("estimated_minutes", "estimatedDuration"),
    ("is_active", "active"),
];

const QUOTATIONS_OUT: FieldMap = &[
    ("observations", "title"),
    ("internal_notes", "notes"),
    ("status", "status"),
    ("total", "totalValue"),
    ("valid_until", "validUntil"),
];

/// Foreign key that must be translated to a remote id before export.
#[derive(Debug, Clone, Copy)]
pub struct ForeignRef {
    pub local_field: &'static str,
    pub entity: RemoteEntity,
    pub remote_field: &'static str,
    pub required: bool,
}

const EQUIPMENT_REFS: &[ForeignRef] = &[ForeignRef {
    local_field: "customer_id",
    entity: RemoteEntity::Customers,
    remote_field: "associatedCustomerId",
    required: false,
}];

const QUOTATION_REFS: &[ForeignRef] = &[ForeignRef {
    local_field: "customer_id",
    entity: RemoteEntity::Customers,
    remote_field: "customerId",
    required: true,
}];

pub struct FieldMapper;

impl FieldMapper {
    pub fn map_for(entity: RemoteEntity) -> FieldMap {
        match entity {
            RemoteEntity::Customers => CUSTOMERS,
            RemoteEntity::Equipments => EQUIPMENTS,
            RemoteEntity::Products => PRODUCTS,
            RemoteEntity::Services => SERVICES,
            RemoteEntity::Tasks => TASKS,
            RemoteEntity::Expenses => EXPENSES,
            RemoteEntity::Quotations => QUOTATIONS,
            RemoteEntity::Users => USERS,
            RemoteEntity::Segments
            | RemoteEntity::CustomerGroups
            | RemoteEntity::Keywords
            | RemoteEntity::TaskTypes
            | RemoteEntity::Teams => LOOKUP,
        }
    }

    /// Unknown names map to an empty table.
    pub fn map_for_name(entity: &str) -> FieldMap {
        entity
            .parse::<RemoteEntity>()
            .map(Self::map_for)
            .unwrap_or(&[])
    }

    pub fn endpoint(entity: RemoteEntity) -> &'static str {
        match entity {
            RemoteEntity::Customers => "customers",
            RemoteEntity::Segments => "segments",
            RemoteEntity::CustomerGroups => "customerGroups",
            RemoteEntity::Keywords => "keywords",
            RemoteEntity::TaskTypes => "taskTypes",
            RemoteEntity::Users => "users",
            RemoteEntity::Teams => "teams",
            RemoteEntity::Equipments => "equipments",
            RemoteEntity::Products => "products",
            RemoteEntity::Services => "services",
            RemoteEntity::Tasks => "tasks",
            RemoteEntity::Expenses => "expenses",
            RemoteEntity::Quotations => "quotations",
        }
    }

    pub fn endpoint_for_name(entity: &str) -> Result<&'static str, UnknownEntity> {
        entity.parse::<RemoteEntity>().map(Self::endpoint)
    }

    pub fn is_valid_entity(entity: &str) -> bool {
        entity.parse::<RemoteEntity>().is_ok()
    }

    /// Copy every mapped remote field the record actually carries.
    pub fn map(record: &Record, field_map: FieldMap) -> Record {
        field_map
            .iter()
            .filter_map(|(remote, local)| {
                record
                    .get(*remote)
                    .map(|value| (local.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn extract_remote_id(mapped: &Record) -> Option<RemoteId> {
        mapped.get(REMOTE_ID_FIELD).and_then(as_integer)
    }

    pub fn strip_metadata(mut record: Record) -> Record {
        record.retain(|key, _| !key.starts_with(METADATA_PREFIX));
        record
    }

    /// Local field names an operator sees in a preview.
    pub fn visible_fields(entity: RemoteEntity) -> Vec<&'static str> {
        Self::map_for(entity)
            .iter()
            .map(|(_, local)| *local)
            .filter(|local| !local.starts_with(METADATA_PREFIX))
            .collect()
    }

    /// `None` for entities that cannot be pushed to the remote system.
    pub fn outbound_map(entity: RemoteEntity) -> Option<FieldMap> {
        match entity {
            RemoteEntity::Customers => Some(CUSTOMERS_OUT),
            RemoteEntity::Equipments => Some(EQUIPMENTS_OUT),
            RemoteEntity::Products => Some(PRODUCTS_OUT),
            RemoteEntity::Services => Some(SERVICES_OUT),
            RemoteEntity::Quotations => Some(QUOTATIONS_OUT),
            _ => None,
        }
    }

    /// Outbound payload: mapped local fields that hold a value.
    pub fn to_remote(record: &Record, outbound: FieldMap) -> Record {
        outbound
            .iter()
            .filter_map(|(local, remote)| match record.get(*local) {
                Some(Value::Null) | None => None,
                Some(value) => Some((remote.to_string(), value.clone())),
            })
            .collect()
    }

    pub fn foreign_refs(entity: RemoteEntity) -> &'static [ForeignRef] {
        match entity {
            RemoteEntity::Equipments => EQUIPMENT_REFS,
            RemoteEntity::Quotations => QUOTATION_REFS,
            _ => &[],
        }
    }
}
