pub mod database;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::models::RemoteCredentials;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DATABASE_PASSWORD")?,
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "fieldsync".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
        })
    }

    /// `DATABASE_URL` wins over the individual `DATABASE_*` parts.
    pub fn connection_string(&self) -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                self.username, self.password, self.host, self.port, self.database, self.ssl_mode
            )
        })
    }
}

// ============================================================================
// Remote API
// ============================================================================

#[derive(Debug, Clone)]
pub struct RemoteApiConfig {
    pub base_url: String,
    /// Used when a tenant has not stored its own credentials.
    pub fallback_credentials: RemoteCredentials,
    pub page_size: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub count_timeout: Duration,
    pub rate_limit_delay: Duration,
    pub token_ttl: Duration,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.auvo.com.br/v2".to_string(),
            fallback_credentials: RemoteCredentials::default(),
            page_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            count_timeout: Duration::from_secs(6),
            rate_limit_delay: Duration::from_millis(150),
            token_ttl: Duration::from_secs(1500),
        }
    }
}

impl RemoteApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_url: env::var("REMOTE_API_BASE_URL").unwrap_or(defaults.base_url),
            fallback_credentials: RemoteCredentials::new(
                env::var("REMOTE_API_KEY").unwrap_or_default(),
                env::var("REMOTE_API_TOKEN").unwrap_or_default(),
            ),
            page_size: env_or("REMOTE_PAGE_SIZE", defaults.page_size),
            max_retries: env_or("REMOTE_MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_millis(env_or("REMOTE_RETRY_DELAY_MS", 500)),
            timeout: Duration::from_secs(env_or("REMOTE_TIMEOUT_SECS", 30)),
            count_timeout: Duration::from_secs(env_or("REMOTE_COUNT_TIMEOUT_SECS", 6)),
            rate_limit_delay: Duration::from_millis(env_or("REMOTE_RATE_LIMIT_DELAY_MS", 150)),
            token_ttl: Duration::from_secs(env_or("REMOTE_TOKEN_TTL_SECS", 1500)),
        }
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("REMOTE_API_BASE_URL is not a valid URL: {}", e))?;
        if self.page_size == 0 {
            anyhow::bail!("REMOTE_PAGE_SIZE must be greater than zero");
        }
        if self.max_retries == 0 {
            anyhow::bail!("REMOTE_MAX_RETRIES must be at least 1");
        }
        Ok(())
    }

    /// Config pointed at a test server with all pacing delays removed.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

// ============================================================================
// Application
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    /// Base64 AES-256 key sealing stored remote credentials.
    pub encryption_key: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub remote: RemoteApiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            jwt_secret: env::var("JWT_SECRET")?,
            encryption_key: env::var("ENCRYPTION_KEY")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env_or("SERVER_PORT", 8080),
            cors_origins,
            remote: RemoteApiConfig::from_env(),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
