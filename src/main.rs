use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldsync::config::database::{create_pool, run_migrations};
use fieldsync::config::AppConfig;
use fieldsync::repositories::PgSyncStore;
use fieldsync::services::encryption_service::EncryptionService;
use fieldsync::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO; RUST_LOG overrides.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "fieldsync=info,tower_http=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    config.remote.validate()?;

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let cors_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(header_val) => Some(header_val),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    let encryption = EncryptionService::new(&config.encryption_key)
        .map_err(|e| anyhow::anyhow!("ENCRYPTION_KEY is unusable: {}", e))?;

    let state = AppState::new(
        Arc::new(PgSyncStore::new(pool)),
        config.remote.clone(),
        config.jwt_secret.clone(),
        encryption,
    );

    let app = fieldsync::build_router(state).layer(cors);

    let addr = config.server_address();
    tracing::info!(
        remote = %config.remote.base_url,
        "Starting fieldsync on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
