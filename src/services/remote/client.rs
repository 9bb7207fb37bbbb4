// Remote field-service API client
// Token-based login with a shared per-tenant token cache, fixed-delay retry on
// transient failures and a single re-authentication on 401.
// Reads degrade to `None` so pagination can stop gracefully; writes raise.

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::envelope::{extract_count, extract_token};
use super::pager::RecordPager;
use super::token_cache::{TokenCache, TokenScope};
use crate::config::RemoteApiConfig;
use crate::models::{RemoteCredentials, TenantId};
use crate::utils::log_sanitizer::{redact_payload, sanitize_for_log};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum RemoteApiError {
    #[error("Remote authentication failed: {0}")]
    Authentication(String),

    #[error("Remote request {method} {endpoint} failed: {detail}")]
    Request {
        method: String,
        endpoint: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RemoteApiError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, RemoteApiError::Authentication(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteApiError>;

/// Query parameters passed through to list endpoints.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

impl ConnectionStatus {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 403 | 429 | 500 | 502 | 503 | 504)
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

struct Call<'a> {
    method: Method,
    endpoint: &'a str,
    query: &'a [(String, String)],
    body: Option<&'a Value>,
    timeout: Duration,
}

// ============================================================================
// Client
// ============================================================================

pub struct RemoteApiClient {
    config: RemoteApiConfig,
    credentials: RemoteCredentials,
    tenant_id: Option<TenantId>,
    http_client: Client,
    token_cache: Arc<TokenCache>,
}

impl RemoteApiClient {
    pub fn new(
        config: RemoteApiConfig,
        credentials: RemoteCredentials,
        tenant_id: Option<TenantId>,
        token_cache: Arc<TokenCache>,
    ) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| RemoteApiError::Config(format!("invalid base_url: {}", e)))?;

        let http_client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            credentials,
            tenant_id,
            http_client,
            token_cache,
        })
    }

    pub fn config(&self) -> &RemoteApiConfig {
        &self.config
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_complete()
    }

    fn scope(&self) -> TokenScope {
        TokenScope::from(self.tenant_id)
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    /// Return a valid bearer token, logging in when the cache has none.
    pub async fn authenticate(&self) -> Result<String> {
        if !self.has_credentials() {
            return Err(RemoteApiError::Authentication(
                "API key and token are not configured".to_string(),
            ));
        }

        if let Some(token) = self.token_cache.get(self.scope()) {
            return Ok(token);
        }

        tracing::info!(tenant_id = ?self.tenant_id, "Authenticating against remote API");

        let response = self
            .http_client
            .post(self.url("login/"))
            .header(ACCEPT, "application/json")
            .timeout(self.config.timeout)
            .json(&json!({
                "apiKey": self.credentials.api_key,
                "apiToken": self.credentials.api_token,
            }))
            .send()
            .await
            .map_err(|e| RemoteApiError::Authentication(format!("login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                tenant_id = ?self.tenant_id,
                status = %status,
                body = %sanitize_for_log(&body),
                "Remote authentication failed"
            );
            return Err(RemoteApiError::Authentication(format!(
                "login rejected with HTTP {}, check the API credentials",
                status.as_u16()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            RemoteApiError::Authentication(format!("login response is not JSON: {}", e))
        })?;

        let token = extract_token(&body).ok_or_else(|| {
            tracing::error!(body = %redact_payload(&body), "Login response carries no token");
            RemoteApiError::Authentication("login response carries no token".to_string())
        })?;

        self.token_cache
            .put(self.scope(), token.clone(), self.config.token_ttl);

        Ok(token)
    }

    pub fn clear_token(&self) {
        self.token_cache.invalidate(self.scope());
    }

    /// Force a fresh login and report whether it worked.
    pub async fn test_connection(&self) -> ConnectionStatus {
        if !self.has_credentials() {
            return ConnectionStatus::failed("Remote API credentials are not configured");
        }

        self.clear_token();

        match self.authenticate().await {
            Ok(_) => ConnectionStatus {
                connected: true,
                message: "Connected to remote API".to_string(),
            },
            Err(e) => ConnectionStatus::failed(e.to_string()),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Authenticated GET. `Ok(None)` means the call ultimately failed and the
    /// caller should stop or skip; `Err` is reserved for authentication.
    pub async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<Option<Value>> {
        self.get_with_timeout(endpoint, params, self.config.timeout)
            .await
    }

    pub async fn get_with_timeout(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let call = Call {
            method: Method::GET,
            endpoint,
            query: params,
            body: None,
            timeout,
        };

        match self.execute(&call).await? {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(body) => Ok(Some(body)),
                    Err(e) => {
                        tracing::warn!(endpoint, error = %e, "Remote GET returned a non-JSON body");
                        Ok(None)
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    endpoint,
                    status = %status,
                    body = %sanitize_for_log(&body),
                    "Remote GET failed"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "Remote GET failed after retries");
                Ok(None)
            }
        }
    }

    /// Lazily page through a list endpoint.
    pub fn fetch_all(&self, endpoint: &str, filters: &QueryParams, page_size: u32) -> RecordPager<'_> {
        RecordPager::new(self, endpoint, filters, page_size)
    }

    /// Total advertised by a list endpoint; 0 when the call fails.
    pub async fn count(&self, endpoint: &str, filters: &QueryParams) -> Result<i64> {
        self.count_with_timeout(endpoint, filters, self.config.timeout)
            .await
    }

    pub async fn count_with_timeout(
        &self,
        endpoint: &str,
        filters: &QueryParams,
        timeout: Duration,
    ) -> Result<i64> {
        let mut params: Vec<(String, String)> = filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.push(("page".to_string(), "1".to_string()));
        params.push(("pageSize".to_string(), "1".to_string()));

        Ok(self
            .get_with_timeout(endpoint, &params, timeout)
            .await?
            .map(|response| extract_count(&response))
            .unwrap_or(0))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn post(&self, endpoint: &str, data: &Value) -> Result<Value> {
        self.write(Method::POST, endpoint, data).await
    }

    pub async fn put(&self, endpoint: &str, data: &Value) -> Result<Value> {
        self.write(Method::PUT, endpoint, data).await
    }

    pub async fn patch(&self, endpoint: &str, data: &Value) -> Result<Value> {
        self.write(Method::PATCH, endpoint, data).await
    }

    async fn write(&self, method: Method, endpoint: &str, data: &Value) -> Result<Value> {
        let call = Call {
            method: method.clone(),
            endpoint,
            query: &[],
            body: Some(data),
            timeout: self.config.timeout,
        };

        let response = self.execute(&call).await?.map_err(|e| {
            tracing::error!(method = %method, endpoint, error = %e, "Remote write failed");
            RemoteApiError::Request {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                status: None,
                detail: sanitize_for_log(&e.to_string()),
            }
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                method = %method,
                endpoint,
                status = %status,
                body = %sanitize_for_log(&text),
                "Remote write rejected"
            );
            return Err(RemoteApiError::Request {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                detail: format!("HTTP {}: {}", status.as_u16(), sanitize_for_log(&text)),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text)?)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Send an authenticated call. A 401 clears the token, logs in again and
    /// replays the call exactly once, outside the retry loop.
    async fn execute(
        &self,
        call: &Call<'_>,
    ) -> Result<std::result::Result<Response, reqwest::Error>> {
        let token = self.authenticate().await?;

        match self.send_with_retry(self.build(call, &token)).await {
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                tracing::info!(
                    endpoint = call.endpoint,
                    "Remote API rejected the token, re-authenticating"
                );
                self.clear_token();
                let token = self.authenticate().await?;
                Ok(self.build(call, &token).send().await)
            }
            other => Ok(other),
        }
    }

    fn build(&self, call: &Call<'_>, token: &str) -> RequestBuilder {
        let mut request = self
            .http_client
            .request(call.method.clone(), self.url(call.endpoint))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .timeout(call.timeout);

        if !call.query.is_empty() {
            request = request.query(call.query);
        }
        if let Some(body) = call.body {
            request = request.json(body);
        }

        request
    }

    async fn send_with_retry(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<Response, reqwest::Error> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            let Some(current) = request.try_clone() else {
                return request.send().await;
            };

            match current.send().await {
                Ok(response) if is_retryable(response.status()) && attempt < max_attempts => {
                    tracing::warn!(
                        status = %response.status(),
                        attempt,
                        "Remote API returned a transient status, retrying"
                    );
                }
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    tracing::warn!(error = %e, attempt, "Remote API unreachable, retrying");
                }
                outcome => return outcome,
            }

            attempt += 1;
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}
