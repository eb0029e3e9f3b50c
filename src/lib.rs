//! Metered API gateway.
//!
//! Multi-tenant authentication and metering in front of a set of paid
//! endpoints. Every paid request passes through one gate that:
//!
//! - authenticates either a direct API key or a RapidAPI proxy subscriber
//!   (auto-provisioning the subscriber's tenant on first sight)
//! - enforces the tenant's daily call quota with an atomic per-day counter
//! - records one usage event per attributed call, off the response path
//!
//! # Architecture
//!
//! - **Web Framework**: Axum
//! - **Storage**: PostgreSQL via sqlx ([`store::postgres::PgStore`]), or the
//!   in-process [`store::memory::MemoryStore`]
//! - **Authentication**: SHA-256 hashed API keys, constant-time proxy secret check
//! - **Format**: JSON envelope `{ success, message, data }`

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::{
    services::{gate::Gate, usage_recorder::UsageRecorder},
    store::{KeyStore, UsageLedger},
};

/// Shared state handed to every handler and to the gate middleware.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<dyn KeyStore>,
    pub ledger: Arc<dyn UsageLedger>,
    pub gate: Arc<Gate>,
    pub recorder: UsageRecorder,
}

impl AppState {
    /// Wire the gate and start the usage recorder.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        keys: Arc<dyn KeyStore>,
        ledger: Arc<dyn UsageLedger>,
        proxy_secret: Option<String>,
        usage_queue_capacity: usize,
    ) -> Self {
        let gate = Arc::new(Gate::new(keys.clone(), ledger.clone(), proxy_secret));
        let recorder = UsageRecorder::spawn(ledger.clone(), usage_queue_capacity);

        Self {
            keys,
            ledger,
            gate,
            recorder,
        }
    }
}

/// Build the HTTP router.
///
/// Paid routes sit behind the unified gate; key management, pricing and
/// health are public.
pub fn build_router(state: AppState) -> Router {
    // Routes metered by the unified gate
    let paid_routes = Router::new()
        .route("/v1/usage", get(handlers::usage::usage_stats))
        .route("/v1/employer/lookup", get(handlers::paid::employer_lookup))
        .route("/v1/region/data", get(handlers::paid::region_data))
        .route("/v1/income/predict", post(handlers::paid::income_predict))
        .route(
            "/v1/intelligence/scan",
            post(handlers::paid::intelligence_scan),
        )
        .route("/v1/docs/analyze", post(handlers::paid::docs_analyze))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::api_gate,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/v1", get(handlers::catalog::api_index))
        .route("/v1/pricing", get(handlers::catalog::pricing))
        .route("/v1/keys/create", post(handlers::keys::create_key))
        .route("/v1/keys", get(handlers::keys::list_keys))
        .route("/v1/keys/{id}", delete(handlers::keys::deactivate_key))
        .merge(paid_routes)
        .with_state(state)
}
