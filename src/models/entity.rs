// Entity catalogue
// Remote entity kinds exposed by the field-service API and the local tables
// they land in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown entity type: {0}")]
pub struct UnknownEntity(pub String);

// ============================================================================
// Remote Entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteEntity {
    Customers,
    Segments,
    CustomerGroups,
    Keywords,
    TaskTypes,
    Users,
    Teams,
    Equipments,
    Products,
    Services,
    Tasks,
    Expenses,
    Quotations,
}

impl RemoteEntity {
    /// Import order for a full run: lookup tables first, then entities
    /// that reference customers, users and tasks.
    pub const IMPORT_ORDER: [RemoteEntity; 13] = [
        RemoteEntity::Segments,
        RemoteEntity::CustomerGroups,
        RemoteEntity::Keywords,
        RemoteEntity::TaskTypes,
        RemoteEntity::Users,
        RemoteEntity::Teams,
        RemoteEntity::Customers,
        RemoteEntity::Equipments,
        RemoteEntity::Products,
        RemoteEntity::Services,
        RemoteEntity::Tasks,
        RemoteEntity::Expenses,
        RemoteEntity::Quotations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteEntity::Customers => "customers",
            RemoteEntity::Segments => "segments",
            RemoteEntity::CustomerGroups => "customer_groups",
            RemoteEntity::Keywords => "keywords",
            RemoteEntity::TaskTypes => "task_types",
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

    /// Local table the entity is materialised into. `None` for lookup
    /// entities that only record an identity mapping.
    pub fn local_target(&self) -> Option<LocalEntity> {
        match self {
            RemoteEntity::Customers => Some(LocalEntity::Customer),
            RemoteEntity::Equipments => Some(LocalEntity::Equipment),
            RemoteEntity::Products => Some(LocalEntity::Product),
            RemoteEntity::Services => Some(LocalEntity::Service),
            RemoteEntity::Tasks => Some(LocalEntity::WorkOrder),
            RemoteEntity::Expenses => Some(LocalEntity::Expense),
            RemoteEntity::Quotations => Some(LocalEntity::Quote),
            RemoteEntity::Segments
            | RemoteEntity::CustomerGroups
            | RemoteEntity::Keywords
            | RemoteEntity::TaskTypes
            | RemoteEntity::Users
            | RemoteEntity::Teams => None,
        }
    }

    pub fn is_mapping_only(&self) -> bool {
        self.local_target().is_none()
    }
}

impl fmt::Display for RemoteEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteEntity {
    type Err = UnknownEntity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RemoteEntity::IMPORT_ORDER
            .iter()
            .copied()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}

// ============================================================================
// Local Entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalEntity {
    Customer,
    Equipment,
    Product,
    Service,
    WorkOrder,
    Expense,
    Quote,
}

impl LocalEntity {
    pub fn table(&self) -> &'static str {
        match self {
            LocalEntity::Customer => "customers",
            LocalEntity::Equipment => "equipments",
            LocalEntity::Product => "products",
            LocalEntity::Service => "services",
            LocalEntity::WorkOrder => "work_orders",
            LocalEntity::Expense => "expenses",
            LocalEntity::Quote => "quotes",
        }
    }

    /// Columns an import may write. Anything else produced by a
    /// transformer is dropped before it reaches the table.
    pub fn fillable(&self) -> &'static [&'static str] {
        match self {
            LocalEntity::Customer => &[
                "name",
                "document",
                "type",
                "email",
                "phone",
                "address_street",
                "address_number",
                "address_complement",
                "address_neighborhood",
                "address_city",
                "address_state",
                "address_zip",
                "notes",
                "is_active",
            ],
            LocalEntity::Equipment => &[
                "code",
                "serial_number",
                "brand",
                "model",
                "category",
                "type",
                "notes",
                "status",
                "customer_id",
            ],
            LocalEntity::Product => &[
                "code",
                "name",
                "description",
                "unit",
                "sell_price",
                "cost_price",
                "stock_qty",
                "category_id",
                "is_active",
            ],
            LocalEntity::Service => &[
                "code",
                "name",
                "description",
                "default_price",
                "estimated_minutes",
                "category_id",
                "is_active",
            ],
            LocalEntity::WorkOrder => &[
                "description",
                "internal_notes",
                "priority",
                "status",
                "received_at",
                "completed_at",
                "customer_id",
                "assigned_to",
                "created_by",
            ],
            LocalEntity::Expense => &[
                "description",
                "amount",
                "expense_date",
                "status",
                "created_by",
                "work_order_id",
                "expense_category_id",
                "notes",
            ],
            LocalEntity::Quote => &[
                "quote_number",
                "customer_id",
                "seller_id",
                "status",
                "total",
                "valid_until",
                "observations",
                "internal_notes",
            ],
        }
    }

    pub fn is_fillable(&self, column: &str) -> bool {
        self.fillable().contains(&column)
    }

    /// Whether newly created rows default to `is_active = true`.
    pub fn has_active_flag(&self) -> bool {
        self.is_fillable("is_active")
    }
}

impl fmt::Display for LocalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Per-tenant category tables resolved with find-or-create during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryKind {
    Product,
    Service,
    Expense,
}

impl CategoryKind {
    pub fn table(&self) -> &'static str {
        match self {
            CategoryKind::Product => "product_categories",
            CategoryKind::Service => "service_categories",
            CategoryKind::Expense => "expense_categories",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_round_trip_through_from_str() {
        for entity in RemoteEntity::IMPORT_ORDER {
            assert_eq!(entity.as_str().parse::<RemoteEntity>().unwrap(), entity);
        }
        assert_eq!(
            "invalid_entity".parse::<RemoteEntity>(),
            Err(UnknownEntity("invalid_entity".to_string()))
        );
    }

    #[test]
    fn lookups_come_before_the_entities_that_reference_them() {
        let position = |e: RemoteEntity| {
            RemoteEntity::IMPORT_ORDER.iter().position(|x| *x == e).unwrap()
        };
        assert!(position(RemoteEntity::Customers) < position(RemoteEntity::Equipments));
        assert!(position(RemoteEntity::Customers) < position(RemoteEntity::Quotations));
        assert!(position(RemoteEntity::Users) < position(RemoteEntity::Tasks));
        assert!(position(RemoteEntity::Tasks) < position(RemoteEntity::Expenses));
    }

    #[test]
    fn mapping_only_entities_have_no_table() {
        assert!(RemoteEntity::Segments.is_mapping_only());
        assert!(RemoteEntity::Users.is_mapping_only());
        assert_eq!(RemoteEntity::Tasks.local_target(), Some(LocalEntity::WorkOrder));
    }

    #[test]
    fn active_flag_follows_fillable_columns() {
        assert!(LocalEntity::Customer.has_active_flag());
        assert!(LocalEntity::Product.has_active_flag());
        assert!(!LocalEntity::Quote.has_active_flag());
    }
}
