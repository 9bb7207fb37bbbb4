// Mock remote field-service API for integration tests.
// Serves login, paginated list endpoints, creates and patches on a random
// local port, with knobs for token shapes, revocation and transient failures.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use fieldsync::config::RemoteApiConfig;
use fieldsync::models::{Record, RemoteCredentials, TenantId};
use fieldsync::services::remote::{RemoteApiClient, TokenCache};

pub const API_KEY: &str = "test-key";
pub const API_TOKEN: &str = "test-token";

// ============================================================================
// Mock State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginShape {
    #[default]
    ResultAccessToken,
    ResultToken,
    BareToken,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListShape {
    #[default]
    EntityList,
    ResultList,
    Data,
    Bare,
}

#[derive(Debug, Default)]
pub struct MockRemoteState {
    pub login_shape: LoginShape,
    pub list_shape: ListShape,
    pub logins: u32,
    pub valid_tokens: HashSet<String>,
    /// Answer the next N authenticated calls with 503.
    pub fail_next: u32,
    /// Answer list requests for this page and later with 503.
    pub fail_pages_from: Option<u32>,
    pub records: HashMap<String, Vec<Value>>,
    /// `(page, pageSize)` of every list call, per endpoint.
    pub list_requests: HashMap<String, Vec<(u32, u32)>>,
    pub created: Vec<(String, Value)>,
    pub patched: Vec<(String, i64, Value)>,
    pub next_remote_id: i64,
    pub omit_created_id: bool,
}

impl MockRemoteState {
    pub fn set_records(&mut self, endpoint: &str, records: Vec<Value>) {
        self.records.insert(endpoint.to_string(), records);
    }

    /// Page numbers requested for a full listing, ignoring count probes.
    pub fn pages_requested(&self, endpoint: &str) -> Vec<u32> {
        self.list_requests
            .get(endpoint)
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(_, size)| *size != 1)
                    .map(|(page, _)| *page)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn revoke_tokens(&mut self) {
        self.valid_tokens.clear();
    }
}

pub type SharedState = Arc<RwLock<MockRemoteState>>;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Bearer check plus the transient-failure knob.
fn guard(state: &mut MockRemoteState, headers: &HeaderMap) -> Option<Response> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if state.valid_tokens.contains(token) => {}
        _ => return Some(error(StatusCode::UNAUTHORIZED, "invalid token")),
    }

    if state.fail_next > 0 {
        state.fail_next -= 1;
        return Some(error(StatusCode::SERVICE_UNAVAILABLE, "try again"));
    }

    None
}

// ============================================================================
// Mock Endpoints
// ============================================================================

async fn login(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut state = state.write().await;

    if body["apiKey"] != API_KEY || body["apiToken"] != API_TOKEN {
        return error(StatusCode::UNAUTHORIZED, "invalid credentials");
    }

    state.logins += 1;
    let token = format!("token-{}", state.logins);
    state.valid_tokens.insert(token.clone());

    let body = match state.login_shape {
        LoginShape::ResultAccessToken => json!({
            "result": { "authenticated": true, "accessToken": token, "expiration": "2099-01-01" }
        }),
        LoginShape::ResultToken => json!({ "result": { "token": token } }),
        LoginShape::BareToken => json!({ "token": token }),
        LoginShape::Missing => json!({ "result": { "authenticated": true } }),
    };

    Json(body).into_response()
}

async fn list(
    State(state): State<SharedState>,
    Path(endpoint): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Some(rejection) = guard(&mut state, &headers) {
        return rejection;
    }

    let page: u32 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let page_size: u32 = params
        .get("pageSize")
        .and_then(|p| p.parse().ok())
        .unwrap_or(100);

    state
        .list_requests
        .entry(endpoint.clone())
        .or_default()
        .push((page, page_size));

    if state.fail_pages_from.map_or(false, |from| page >= from) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "page unavailable");
    }

    let records = state.records.get(&endpoint).cloned().unwrap_or_default();
    let total = records.len();
    let slice: Vec<Value> = records
        .into_iter()
        .skip(((page.max(1) - 1) * page_size) as usize)
        .take(page_size as usize)
        .collect();

    let body = match state.list_shape {
        ListShape::EntityList => json!({ "result": { "entityList": slice, "totalCount": total } }),
        ListShape::ResultList => json!({ "result": slice }),
        ListShape::Data => json!({ "data": slice, "totalCount": total }),
        ListShape::Bare => Value::Array(slice),
    };

    Json(body).into_response()
}

async fn create(
    State(state): State<SharedState>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    if let Some(rejection) = guard(&mut state, &headers) {
        return rejection;
    }

    state.next_remote_id += 1;
    let id = 9000 + state.next_remote_id;
    state.created.push((endpoint, body));

    if state.omit_created_id {
        return Json(json!({ "result": {} })).into_response();
    }
    (StatusCode::CREATED, Json(json!({ "result": { "id": id } }))).into_response()
}

async fn update(
    State(state): State<SharedState>,
    Path((endpoint, id)): Path<(String, i64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    if let Some(rejection) = guard(&mut state, &headers) {
        return rejection;
    }

    state.patched.push((endpoint, id, body));
    StatusCode::NO_CONTENT.into_response()
}

fn create_mock_remote(state: SharedState) -> Router {
    Router::new()
        .route("/v2/login/", post(login))
        .route("/v2/:endpoint", get(list).post(create))
        .route("/v2/:endpoint/:id", patch(update))
        .with_state(state)
}

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Start the mock on a random port. Returns the versioned base URL.
pub async fn start_mock_remote() -> (String, SharedState) {
    let state: SharedState = Arc::new(RwLock::new(MockRemoteState::default()));
    let app = create_mock_remote(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v2", addr), state)
}

pub fn credentials() -> RemoteCredentials {
    RemoteCredentials::new(API_KEY, API_TOKEN)
}

pub fn client(base_url: &str, tenant_id: TenantId) -> RemoteApiClient {
    client_with_cache(base_url, tenant_id, Arc::new(TokenCache::new()))
}

pub fn client_with_cache(
    base_url: &str,
    tenant_id: TenantId,
    cache: Arc<TokenCache>,
) -> RemoteApiClient {
    RemoteApiClient::new(
        RemoteApiConfig::for_base_url(base_url),
        credentials(),
        Some(tenant_id),
        cache,
    )
    .unwrap()
}

pub fn remote_customer(id: i64, name: &str, document: &str) -> Value {
    json!({
        "id": id,
        "description": name,
        "cpfCnpj": document,
        "email": [format!("contact{}@example.com", id)],
        "phone": [{ "phone": "11 4000-0000" }],
        "zipCode": "01310-100",
        "active": true,
        "segmentId": 1,
    })
}

pub fn remote_customers(count: i64) -> Vec<Value> {
    (1..=count)
        .map(|id| remote_customer(id, &format!("Customer {}", id), &format!("{:011}", id)))
        .collect()
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}
