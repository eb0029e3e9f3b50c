//! Shared helpers for router-level tests.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

use metered_api_gateway::{
    AppState, build_router,
    models::{
        api_key::{ApiKey, KeySource},
        tier::Tier,
        usage::UsageEvent,
    },
    services::credentials,
    store::{KeyStore, UsageLedger, memory::MemoryStore},
};

pub const PROXY_SECRET: &str = "test-proxy-secret";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

/// Router over a fresh in-memory store. Call from inside a Tokio runtime.
pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), store.clone());
    TestApp { store, router }
}

pub fn router_with(keys: Arc<dyn KeyStore>, ledger: Arc<dyn UsageLedger>) -> Router {
    let state = AppState::new(keys, ledger, Some(PROXY_SECRET.to_string()), 256);
    build_router(state)
}

/// Insert a direct tenant and return it with its raw key.
pub async fn issue_key(store: &MemoryStore, tier: Tier) -> (ApiKey, String) {
    let (record, raw_key) = credentials::issue("test key", "owner@example.com", tier, KeySource::Direct);
    let key = store.create(record).await.expect("create key");
    (key, raw_key)
}

pub fn direct_get(path: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-api-key", api_key)
        .body(Body::empty())
        .unwrap()
}

pub fn proxy_get(path: &str, subscriber: &str, plan: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(path)
        .header("x-rapidapi-proxy-secret", PROXY_SECRET)
        .header("x-rapidapi-user", subscriber);
    if let Some(plan) = plan {
        builder = builder.header("x-rapidapi-subscription", plan);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, path: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Send one request and parse the JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    };
    (status, body)
}

/// Poll until the background recorder has flushed `expected` events.
pub async fn wait_for_events(store: &MemoryStore, expected: usize) -> Vec<UsageEvent> {
    for _ in 0..200 {
        let events = store.events_snapshot();
        if events.len() >= expected {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} usage events, found {}",
        store.events_snapshot().len()
    );
}

/// Give the recorder a moment, then return whatever was flushed.
pub async fn settled_events(store: &MemoryStore) -> Vec<UsageEvent> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.events_snapshot()
}
