// Operator HTTP surface: router, JWT middleware and handlers over the
// in-memory store and the mock remote API.
// Run with: cargo test --test operator_api

mod common;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use std::sync::Arc;

use common::{record, remote_customers, start_mock_remote, SharedState, API_KEY, API_TOKEN};
use fieldsync::build_router;
use fieldsync::config::RemoteApiConfig;
use fieldsync::middleware::JwtService;
use fieldsync::models::LocalEntity;
use fieldsync::repositories::{MemoryStore, SyncStore};
use fieldsync::services::encryption_service::EncryptionService;
use fieldsync::state::AppState;

const SECRET: &str = "test-jwt-secret";
const TENANT: i64 = 1;

struct Harness {
    server: TestServer,
    store: Arc<MemoryStore>,
    remote: SharedState,
    token: String,
}

impl Harness {
    async fn new() -> Self {
        let (url, remote) = start_mock_remote().await;
        let store = Arc::new(MemoryStore::new());
        let encryption = EncryptionService::new(&EncryptionService::generate_key()).unwrap();
        let state = AppState::new(
            store.clone(),
            RemoteApiConfig::for_base_url(&url),
            SECRET,
            encryption,
        );
        let server = TestServer::new(build_router(state)).unwrap();

        let token = JwtService::new(SECRET)
            .generate_token(TENANT, 7, chrono::Duration::hours(1))
            .unwrap();

        Self {
            server,
            store,
            remote,
            token,
        }
    }

    fn authorized(&self, request: TestRequest) -> TestRequest {
        let value = HeaderValue::from_str(&format!("Bearer {}", self.token)).unwrap();
        request.add_header(header::AUTHORIZATION, value)
    }

    fn get(&self, path: &str) -> TestRequest {
        self.authorized(self.server.get(path))
    }

    fn post(&self, path: &str) -> TestRequest {
        self.authorized(self.server.post(path))
    }

    fn put(&self, path: &str) -> TestRequest {
        self.authorized(self.server.put(path))
    }

    async fn connect(&self) {
        let response = self
            .put("/api/remote-sync/credentials")
            .json(&json!({ "api_key": API_KEY, "api_token": API_TOKEN }))
            .await;
        response.assert_status_ok();
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn health_is_public() {
    let harness = Harness::new().await;

    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn operator_routes_require_a_valid_token() {
    let harness = Harness::new().await;

    let response = harness.server.get("/api/remote-sync/status").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = harness
        .server
        .get("/api/remote-sync/status")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let foreign = JwtService::new("another-secret")
        .generate_token(TENANT, 7, chrono::Duration::hours(1))
        .unwrap();
    let response = harness
        .server
        .get("/api/remote-sync/status")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", foreign)).unwrap(),
        )
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Credentials and connection
// ============================================================================

#[tokio::test]
async fn credentials_are_saved_masked_and_verified() {
    let harness = Harness::new().await;

    let before = harness.get("/api/remote-sync/credentials").await.json::<Value>();
    assert_eq!(before["has_credentials"], false);

    let response = harness
        .put("/api/remote-sync/credentials")
        .json(&json!({ "api_key": API_KEY, "api_token": API_TOKEN }))
        .await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    assert_eq!(body["connection"]["connected"], true);
    assert_eq!(body["credentials"]["has_credentials"], true);
    assert_ne!(body["credentials"]["api_token"], API_TOKEN);

    let after = harness.get("/api/remote-sync/credentials").await.json::<Value>();
    assert_eq!(after["has_credentials"], true);
    assert!(!after.to_string().contains(API_TOKEN));
}

#[tokio::test]
async fn stored_credentials_hold_no_plaintext() {
    let harness = Harness::new().await;
    harness.connect().await;

    let sealed = harness.store.load_credentials(TENANT).await.unwrap().unwrap();
    let stored = serde_json::to_string(&sealed).unwrap();
    assert!(!stored.contains(API_KEY));
    assert!(!stored.contains(API_TOKEN));

    // The sealed pair still opens: a later import authenticates with it.
    harness.remote.write().await.set_records("customers", remote_customers(1));
    harness
        .post("/api/remote-sync/import/customers")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn short_credentials_are_rejected() {
    let harness = Harness::new().await;

    let response = harness
        .put("/api/remote-sync/credentials")
        .json(&json!({ "api_key": "abc", "api_token": API_TOKEN }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn connection_reports_remote_totals() {
    let harness = Harness::new().await;
    harness.remote.write().await.set_records("customers", remote_customers(12));
    harness.connect().await;

    let body = harness.get("/api/remote-sync/connection").await.json::<Value>();
    assert_eq!(body["connected"], true);
    assert_eq!(body["entity_counts"]["customers"], 12);
    assert_eq!(body["entity_counts"]["segments"], 0);
}

#[tokio::test]
async fn connection_without_credentials_is_reported_not_raised() {
    let harness = Harness::new().await;

    let response = harness.get("/api/remote-sync/connection").await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    assert_eq!(body["connected"], false);
    assert!(body.get("entity_counts").is_none());
}

// ============================================================================
// Import lifecycle
// ============================================================================

#[tokio::test]
async fn import_then_browse_and_roll_back() {
    let harness = Harness::new().await;
    harness.remote.write().await.set_records("customers", remote_customers(3));
    harness.connect().await;

    let response = harness.post("/api/remote-sync/import/customers").await;
    response.assert_status_ok();
    let summary = response.json::<Value>();
    assert_eq!(summary["total_imported"], 3);
    assert_eq!(summary["status"], "done");
    let import_id = summary["import_id"].as_str().unwrap().to_string();

    let runs = harness
        .get("/api/remote-sync/runs?entity=customers&status=done")
        .await
        .json::<Value>();
    assert_eq!(runs["runs"].as_array().unwrap().len(), 1);
    assert_eq!(runs["runs"][0]["import_id"], import_id.as_str());
    assert_eq!(runs["runs"][0]["duplicate_strategy"], "skip");
    assert_eq!(runs["page"], 1);
    assert_eq!(runs["per_page"], 20);

    let run = harness
        .get(&format!("/api/remote-sync/runs/{}", import_id))
        .await
        .json::<Value>();
    assert_eq!(run["imported_ids"].as_array().unwrap().len(), 3);

    let status = harness.get("/api/remote-sync/status").await.json::<Value>();
    assert_eq!(status["total_mappings"], 3);

    let response = harness
        .post(&format!("/api/remote-sync/runs/{}/rollback", import_id))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["deleted"], 3);
    assert!(harness.store.entities(LocalEntity::Customer, TENANT).await.is_empty());

    let response = harness
        .post(&format!("/api/remote-sync/runs/{}/rollback", import_id))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn import_accepts_strategy_and_filters() {
    let harness = Harness::new().await;
    harness.remote.write().await.set_records("customers", remote_customers(2));
    harness.connect().await;

    harness.post("/api/remote-sync/import/customers").await.assert_status_ok();

    let response = harness
        .post("/api/remote-sync/import/customers")
        .json(&json!({ "strategy": "update", "filters": { "active": "true" } }))
        .await;
    response.assert_status_ok();

    let summary = response.json::<Value>();
    assert_eq!(summary["total_updated"], 2);
    assert_eq!(summary["total_imported"], 0);
}

#[tokio::test]
async fn mappings_are_listed_per_tenant_and_entity() {
    let harness = Harness::new().await;
    {
        let mut remote = harness.remote.write().await;
        remote.set_records("customers", remote_customers(3));
        remote.set_records("segments", vec![json!({ "id": 1, "description": "Retail" })]);
    }
    harness.connect().await;

    harness.post("/api/remote-sync/import/customers").await.assert_status_ok();
    harness.post("/api/remote-sync/import/segments").await.assert_status_ok();

    let all = harness.get("/api/remote-sync/mappings").await.json::<Value>();
    assert_eq!(all["total"], 4);
    assert_eq!(all["page"], 1);
    assert_eq!(all["per_page"], 50);

    let customers = harness
        .get("/api/remote-sync/mappings?entity=customers&per_page=2")
        .await
        .json::<Value>();
    assert_eq!(customers["total"], 3);
    let rows = customers["mappings"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|m| m["entity_type"] == "customers"));
    assert!(rows.iter().all(|m| m["local_id"].is_i64()));

    let second_page = harness
        .get("/api/remote-sync/mappings?entity=customers&per_page=2&page=2")
        .await
        .json::<Value>();
    assert_eq!(second_page["mappings"].as_array().unwrap().len(), 1);

    harness
        .get("/api/remote-sync/mappings?entity=invoices")
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let other_tenant = JwtService::new(SECRET)
        .generate_token(2, 7, chrono::Duration::hours(1))
        .unwrap();
    let foreign = harness
        .server
        .get("/api/remote-sync/mappings")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", other_tenant)).unwrap(),
        )
        .await
        .json::<Value>();
    assert_eq!(foreign["total"], 0);
}

#[tokio::test]
async fn full_import_returns_one_result_per_entity() {
    let harness = Harness::new().await;
    harness.connect().await;

    let response = harness.post("/api/remote-sync/import").await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    assert_eq!(body["results"].as_array().unwrap().len(), 13);
    assert_eq!(body["results"][0]["entity"], "segments");
}

#[tokio::test]
async fn preview_returns_a_mapped_sample() {
    let harness = Harness::new().await;
    harness.remote.write().await.set_records("customers", remote_customers(8));
    harness.connect().await;

    let body = harness
        .get("/api/remote-sync/preview/customers?limit=3")
        .await
        .json::<Value>();

    assert_eq!(body["total"], 8);
    assert_eq!(body["sample"].as_array().unwrap().len(), 3);
    assert_eq!(body["sample"][0]["mapped"]["name"], "Customer 1");
}

#[tokio::test]
async fn bad_input_is_rejected_before_any_work() {
    let harness = Harness::new().await;
    harness.connect().await;

    harness
        .post("/api/remote-sync/import/invoices")
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    harness
        .post("/api/remote-sync/import/customers")
        .json(&json!({ "strategy": "merge" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    harness
        .get("/api/remote-sync/runs?status=exploded")
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    harness
        .get("/api/remote-sync/runs/3f6c1a6e-8d7b-4d4e-9a55-0b9a7c2f1e10")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    assert!(harness.remote.read().await.list_requests.is_empty());
}

#[tokio::test]
async fn import_without_credentials_is_a_bad_gateway() {
    let harness = Harness::new().await;

    let response = harness.post("/api/remote-sync/import/customers").await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let body = response.json::<Value>();
    assert_eq!(body["status"], 502);
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn export_pushes_a_local_record() {
    let harness = Harness::new().await;
    harness.connect().await;

    let customer = harness
        .store
        .seed_entity(
            LocalEntity::Customer,
            TENANT,
            record(json!({ "name": "ACME Ltda", "document": "12345678000190" })),
        )
        .await;

    let response = harness
        .post(&format!("/api/remote-sync/export/customers/{}", customer))
        .await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    assert_eq!(body["created"], true);
    assert_eq!(body["remote_id"], 9001);

    harness
        .post("/api/remote-sync/export/tasks/1")
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    harness
        .post("/api/remote-sync/export/customers/4040")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
