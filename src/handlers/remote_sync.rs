// Remote Sync API Handlers
// Operator endpoints for connecting a tenant to the remote field-service API,
// previewing and running imports, browsing run history and exporting records.
// Tenant and acting user always come from the JWT claims.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::auth::Claims;
use crate::middleware::error_handling::{AppError, Result};
use crate::models::{
    DuplicateStrategy, ImportRun, ImportSummary, LocalId, MappingFilter, MappingPage,
    RemoteCredentials, RemoteEntity, RunFilter, RunStatus, UserId,
};
use crate::services::remote::{ConnectionStatus, QueryParams, TokenScope};
use crate::services::sync::import_engine::DEFAULT_PREVIEW_LIMIT;
use crate::services::sync::{rollback_run, sync_status, ExportEngine, ImportEngine};
use crate::state::AppState;
use crate::utils::log_sanitizer::sanitize_for_log;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct SaveCredentialsRequest {
    #[validate(length(min = 5, message = "API key must be at least 5 characters"))]
    pub api_key: String,
    #[validate(length(min = 5, message = "API token must be at least 5 characters"))]
    pub api_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportRequest {
    pub strategy: Option<String>,
    #[serde(default)]
    pub filters: QueryParams,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    pub entity: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MappingsQuery {
    pub entity: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MappingListResponse {
    #[serde(flatten)]
    pub page_data: MappingPage,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    #[serde(flatten)]
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_counts: Option<BTreeMap<RemoteEntity, i64>>,
}

/// Run history row. The full error log is only served by the detail route.
#[derive(Debug, Serialize)]
pub struct RunListItem {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub user_id: UserId,
    pub duplicate_strategy: DuplicateStrategy,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ImportRun> for RunListItem {
    fn from(run: ImportRun) -> Self {
        Self {
            summary: run.summary(),
            user_id: run.user_id,
            duplicate_strategy: run.duplicate_strategy,
            started_at: run.started_at,
            completed_at: run.completed_at,
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunListItem>,
    pub page: u32,
    pub per_page: u32,
}

fn parse_entity(entity: &str) -> Result<RemoteEntity> {
    Ok(entity.parse::<RemoteEntity>()?)
}

fn parse_strategy(strategy: Option<&str>) -> Result<DuplicateStrategy> {
    match strategy {
        Some(raw) => raw.parse().map_err(AppError::Unprocessable),
        None => Ok(DuplicateStrategy::default()),
    }
}

// ============================================================================
// Connection & Credentials
// ============================================================================

/// Test the tenant's credentials and report remote totals
/// GET /api/remote-sync/connection
pub async fn test_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let client = state.client_for(claims.tenant_id).await?;
    let status = client.test_connection().await;

    let entity_counts = if status.connected {
        Some(ImportEngine::new(client, state.store.clone()).entity_counts().await)
    } else {
        None
    };

    Ok(Json(ConnectionResponse {
        status,
        entity_counts,
    }))
}

/// GET /api/remote-sync/credentials
pub async fn get_credentials(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let credentials = state
        .stored_credentials(claims.tenant_id)
        .await?
        .unwrap_or_default();

    Ok(Json(credentials.masked()))
}

/// Save or rotate the tenant's credentials, then verify them
/// PUT /api/remote-sync/credentials
pub async fn save_credentials(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<SaveCredentialsRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;

    let credentials = RemoteCredentials::new(request.api_key.trim(), request.api_token.trim());
    state.store_credentials(claims.tenant_id, &credentials).await?;
    state.token_cache.invalidate(TokenScope::Tenant(claims.tenant_id));

    tracing::info!(
        tenant_id = claims.tenant_id,
        user_id = claims.user_id,
        "Remote API credentials updated"
    );

    let connection = state
        .client_for(claims.tenant_id)
        .await?
        .test_connection()
        .await;

    Ok(Json(json!({
        "credentials": credentials.masked(),
        "connection": connection,
    })))
}

// ============================================================================
// Import
// ============================================================================

/// GET /api/remote-sync/preview/:entity?limit=
pub async fn preview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(entity): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<impl IntoResponse> {
    let entity = parse_entity(&entity)?;
    let engine = ImportEngine::new(state.client_for(claims.tenant_id).await?, state.store.clone());

    let report = engine
        .preview(entity, query.limit.unwrap_or(DEFAULT_PREVIEW_LIMIT))
        .await?;

    Ok(Json(report))
}

/// POST /api/remote-sync/import/:entity
pub async fn import_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(entity): Path<String>,
    request: Option<Json<ImportRequest>>,
) -> Result<impl IntoResponse> {
    let entity = parse_entity(&entity)?;
    let Json(request) = request.unwrap_or_default();
    let strategy = parse_strategy(request.strategy.as_deref())?;

    tracing::info!(
        tenant_id = claims.tenant_id,
        user_id = claims.user_id,
        entity = %entity,
        strategy = %strategy,
        filters = %sanitize_for_log(&format!("{:?}", request.filters)),
        "Import requested"
    );

    let engine = ImportEngine::new(state.client_for(claims.tenant_id).await?, state.store.clone());
    let summary = engine
        .import_entity(entity, claims.tenant_id, claims.user_id, strategy, &request.filters)
        .await?;

    Ok(Json(summary))
}

/// Import every entity in dependency order
/// POST /api/remote-sync/import
pub async fn import_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request: Option<Json<ImportRequest>>,
) -> Result<impl IntoResponse> {
    let Json(request) = request.unwrap_or_default();
    let strategy = parse_strategy(request.strategy.as_deref())?;

    let engine = ImportEngine::new(state.client_for(claims.tenant_id).await?, state.store.clone());
    let results = engine
        .import_all(claims.tenant_id, claims.user_id, strategy)
        .await?;

    Ok(Json(json!({ "results": results })))
}

// ============================================================================
// Run History
// ============================================================================

/// GET /api/remote-sync/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RunsQuery>,
) -> Result<impl IntoResponse> {
    let entity = query.entity.as_deref().map(parse_entity).transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<RunStatus>().map_err(AppError::Unprocessable))
        .transpose()?;

    let filter = RunFilter {
        entity,
        status,
        page: query.page,
        per_page: query.per_page,
    };

    let runs = state.store.list_runs(claims.tenant_id, &filter).await?;

    Ok(Json(RunListResponse {
        runs: runs.into_iter().map(RunListItem::from).collect(),
        page: filter.page.unwrap_or(1).max(1),
        per_page: filter.limit(),
    }))
}

/// GET /api/remote-sync/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let run = state
        .store
        .find_run(claims.tenant_id, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Import run {} not found", run_id)))?;

    Ok(Json(run))
}

/// POST /api/remote-sync/runs/:id/rollback
pub async fn rollback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    tracing::info!(
        tenant_id = claims.tenant_id,
        user_id = claims.user_id,
        import_id = %run_id,
        "Rollback requested"
    );

    let report = rollback_run(state.store.as_ref(), claims.tenant_id, run_id).await?;
    Ok(Json(report))
}

/// GET /api/remote-sync/status
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let status = sync_status(state.store.as_ref(), claims.tenant_id).await?;
    Ok(Json(status))
}

// ============================================================================
// Identity Map
// ============================================================================

/// Which remote ids are linked to which local rows
/// GET /api/remote-sync/mappings?entity=&page=&per_page=
pub async fn list_mappings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MappingsQuery>,
) -> Result<impl IntoResponse> {
    let filter = MappingFilter {
        entity: query.entity.as_deref().map(parse_entity).transpose()?,
        page: query.page,
        per_page: query.per_page,
    };

    let page_data = state.store.list_mappings(claims.tenant_id, &filter).await?;

    Ok(Json(MappingListResponse {
        page_data,
        page: filter.page.unwrap_or(1).max(1),
        per_page: filter.limit(),
    }))
}

// ============================================================================
// Export
// ============================================================================

/// POST /api/remote-sync/export/:entity/:local_id
pub async fn export_entity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((entity, local_id)): Path<(String, LocalId)>,
) -> Result<impl IntoResponse> {
    let entity = parse_entity(&entity)?;
    let engine = ExportEngine::new(state.client_for(claims.tenant_id).await?, state.store.clone());

    let outcome = engine.export(claims.tenant_id, entity, local_id).await?;
    Ok(Json(outcome))
}
