use thiserror::Error;
use uuid::Uuid;

use crate::models::{LocalId, RemoteEntity, UnknownEntity};
use crate::repositories::StoreError;
use crate::services::remote::RemoteApiError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid entity type: {0}")]
    InvalidEntity(String),

    #[error("Remote authentication failed: {0}")]
    Authentication(String),

    #[error("Remote API error: {0}")]
    Remote(RemoteApiError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid record: {0}")]
    Transform(String),

    #[error("{0}")]
    RollbackPrecondition(String),

    #[error("Import run {0} not found")]
    RunNotFound(Uuid),
}

impl From<RemoteApiError> for ImportError {
    fn from(err: RemoteApiError) -> Self {
        match err {
            RemoteApiError::Authentication(message) => ImportError::Authentication(message),
            other => ImportError::Remote(other),
        }
    }
}

impl From<UnknownEntity> for ImportError {
    fn from(err: UnknownEntity) -> Self {
        ImportError::InvalidEntity(err.0)
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("{entity} record {local_id} not found")]
    NotFound { entity: RemoteEntity, local_id: LocalId },

    #[error("{0} cannot be exported to the remote system")]
    Unsupported(RemoteEntity),

    #[error("Cannot export {entity} {local_id}: {reason}")]
    DependencyUnresolved {
        entity: RemoteEntity,
        local_id: LocalId,
        reason: String,
    },

    #[error("Remote API returned no id for the new {0} record")]
    MissingRemoteId(RemoteEntity),

    #[error("Remote API error: {0}")]
    Remote(#[from] RemoteApiError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
