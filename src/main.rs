//! Metered API Gateway - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

use std::{net::SocketAddr, sync::Arc};

use metered_api_gateway::{AppState, build_router, config, db, store::postgres::PgStore};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    if config.rapidapi_proxy_secret.as_deref().unwrap_or("").is_empty() {
        tracing::warn!("RAPIDAPI_PROXY_SECRET not set; proxy requests will be rejected");
    }

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::new(
        store.clone(),
        store,
        config.rapidapi_proxy_secret.clone(),
        config.usage_queue_capacity,
    );

    let app = build_router(state)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the usage log when no x-forwarded-for is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
