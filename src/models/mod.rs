pub mod credentials;
pub mod entity;
pub mod identity_mapping;
pub mod import_run;

pub use credentials::*;
pub use entity::*;
pub use identity_mapping::*;
pub use import_run::*;

/// Tenant (company) owning every local row and mapping.
pub type TenantId = i64;
/// Platform user who triggered an import.
pub type UserId = i64;
/// Primary key of a local business record.
pub type LocalId = i64;
/// Identifier assigned by the remote field-service API.
pub type RemoteId = i64;

/// Loosely typed record, as received from the remote API or as stored
/// locally before it reaches a concrete table.
pub type Record = serde_json::Map<String, serde_json::Value>;
