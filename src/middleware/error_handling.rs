// ============================================================================
// Error Handling - HTTP error responses for the operator API
// ============================================================================
//
// Every failure leaves the API as `{ "error": ..., "status": ... }`.
// Store failures and remote API details are logged server-side with
// tracing::error! and replaced with a generic message; only
// developer-controlled messages (invalid entity, rollback preconditions,
// missing runs) are returned verbatim.
//
// ============================================================================

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::models::UnknownEntity;
use crate::repositories::StoreError;
use crate::services::encryption_service::EncryptionError;
use crate::services::remote::RemoteApiError;
use crate::services::sync::{ExportError, ImportError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] JsonRejection),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Remote API failure: {0}")]
    BadGateway(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<UnknownEntity> for AppError {
    fn from(err: UnknownEntity) -> Self {
        AppError::Unprocessable(format!("Invalid entity type: {}", err.0))
    }
}

impl From<RemoteApiError> for AppError {
    fn from(err: RemoteApiError) -> Self {
        match err {
            RemoteApiError::Authentication(detail) => {
                tracing::error!("Remote authentication failed: {}", detail);
                AppError::BadGateway(
                    "Could not authenticate with the remote API, check the credentials".to_string(),
                )
            }
            RemoteApiError::Config(detail) => AppError::Internal(anyhow::anyhow!(detail)),
            other => {
                tracing::error!("Remote API error: {:?}", other);
                AppError::BadGateway("Remote API request failed".to_string())
            }
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::InvalidEntity(entity) => {
                AppError::Unprocessable(format!("Invalid entity type: {}", entity))
            }
            ImportError::Authentication(detail) => {
                RemoteApiError::Authentication(detail).into()
            }
            ImportError::Remote(e) => e.into(),
            ImportError::Store(e) => AppError::Store(e),
            ImportError::Transform(msg) => AppError::Unprocessable(msg),
            ImportError::RollbackPrecondition(msg) => AppError::Unprocessable(msg),
            ImportError::RunNotFound(id) => AppError::NotFound(format!("Import run {} not found", id)),
        }
    }
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::NotFound { .. } => AppError::NotFound(err.to_string()),
            ExportError::Unsupported(_) | ExportError::DependencyUnresolved { .. } => {
                AppError::Unprocessable(err.to_string())
            }
            ExportError::MissingRemoteId(_) => {
                tracing::error!("{}", err);
                AppError::BadGateway("Remote API did not return the created record id".to_string())
            }
            ExportError::Remote(e) => e.into(),
            ExportError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Store(StoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            AppError::Store(err) => {
                tracing::error!("Storage error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Encryption(err) => {
                tracing::error!("Stored credentials could not be processed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Validation(ref e) => {
                tracing::debug!("Validation failed: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed".to_string())
            }
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON".to_string()),
            AppError::Jwt(ref e) => {
                tracing::warn!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn sync_errors_map_to_operator_statuses() {
        assert_eq!(
            status_of(ImportError::InvalidEntity("bogus".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ImportError::RollbackPrecondition("not done".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(ImportError::RunNotFound(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ImportError::Authentication("bad key".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ExportError::NotFound {
                entity: crate::models::RemoteEntity::Customers,
                local_id: 1
            }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn store_failures_hide_details() {
        let response = AppError::Store(StoreError::Corrupt("bad row".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
