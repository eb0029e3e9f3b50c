//! Router-level tests for the unified gate: both authentication paths, quota
//! enforcement, auto-provisioning and usage recording.

mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::{
    PROXY_SECRET, direct_get, issue_key, json_request, proxy_get, router_with, send,
    settled_events, test_app, wait_for_events,
};
use metered_api_gateway::{
    models::{
        api_key::{ApiKey, KeySource, NewApiKey},
        tier::Tier,
        usage::{UsageEvent, UsageStats},
    },
    store::{KeyStore, StoreError, UsageLedger, memory::MemoryStore},
};

const LOOKUP: &str = "/v1/employer/lookup?name=google";

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ============================================================================
// Direct keys
// ============================================================================

#[tokio::test]
async fn free_key_is_admitted_exactly_one_hundred_times() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Free).await;

    for call in 1..=100 {
        let (status, body) = send(&app.router, direct_get(LOOKUP, &raw)).await;
        assert_eq!(status, StatusCode::OK, "call {call} should be admitted");
        assert_eq!(body["data"]["api_calls_remaining"], json!(100 - call));
    }

    let (status, body) = send(&app.router, direct_get(LOOKUP, &raw)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "quota_exceeded");
    assert_eq!(body["data"]["current_usage"], 100);
    assert_eq!(body["data"]["limit"], 100);
    assert_eq!(body["data"]["tier"], "free");

    // The rejected call does not move the counter
    assert_eq!(app.store.today_count(key.id, today()).await.unwrap(), 100);
}

#[tokio::test]
async fn query_parameter_key_is_accepted() {
    let app = test_app();
    let (_, raw) = issue_key(&app.store, Tier::Starter).await;

    let path = format!("{LOOKUP}&api_key={raw}");
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_calls_remaining"], 999);
}

#[tokio::test]
async fn missing_credential_is_rejected() {
    let app = test_app();
    let request = Request::builder().uri(LOOKUP).body(Body::empty()).unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "missing_credential");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_key_leaves_no_trace() {
    let app = test_app();
    issue_key(&app.store, Tier::Free).await;

    let (status, body) = send(&app.router, direct_get(LOOKUP, "sl_live_not-a-real-key")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credential");

    assert_eq!(app.store.key_count(), 1);
    assert_eq!(app.store.counter_rows(), 0);
    assert!(settled_events(&app.store).await.is_empty());
}

#[tokio::test]
async fn deactivated_key_is_rejected_but_attributed() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Pro).await;
    app.store.set_active(key.id, false).await.unwrap();

    let (status, body) = send(&app.router, direct_get(LOOKUP, &raw)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "deactivated");
    assert_eq!(app.store.today_count(key.id, today()).await.unwrap(), 0);

    let events = wait_for_events(&app.store, 1).await;
    assert_eq!(events[0].api_key_id, key.id);
    assert_eq!(events[0].response_status, 403);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_never_exceed_quota() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Free).await;

    let mut handles = Vec::new();
    for _ in 0..150 {
        let router = app.router.clone();
        let request = direct_get(LOOKUP, &raw);
        handles.push(tokio::spawn(async move {
            router.oneshot(request).await.unwrap().status()
        }));
    }

    let mut admitted = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(admitted, 100);
    assert_eq!(limited, 50);
    assert_eq!(app.store.today_count(key.id, today()).await.unwrap(), 100);
}

// ============================================================================
// Proxy subscribers
// ============================================================================

#[tokio::test]
async fn first_proxy_request_provisions_tenant() {
    let app = test_app();

    let (status, body) = send(&app.router, proxy_get(LOOKUP, "alice", Some("PRO"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_calls_remaining"], 999);

    let tenant = app.store.find_by_label("rapidapi-alice").await.unwrap().unwrap();
    assert_eq!(tenant.tier, Tier::Starter);
    assert_eq!(tenant.daily_quota, 1000);
    assert_eq!(tenant.source, KeySource::Proxy);
    assert_eq!(tenant.owner_email, "alice@rapidapi.proxy");
    assert_eq!(app.store.today_count(tenant.id, today()).await.unwrap(), 1);
}

#[tokio::test]
async fn plan_change_resyncs_same_tenant() {
    let app = test_app();

    send(&app.router, proxy_get(LOOKUP, "alice", Some("PRO"))).await;
    let before = app.store.find_by_label("rapidapi-alice").await.unwrap().unwrap();

    let (status, _) = send(&app.router, proxy_get(LOOKUP, "alice", Some("MEGA"))).await;
    assert_eq!(status, StatusCode::OK);

    let after = app.store.find_by_label("rapidapi-alice").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.tier, Tier::Enterprise);
    assert_eq!(after.daily_quota, 1_000_000);
    assert_eq!(app.store.key_count(), 1);
}

#[tokio::test]
async fn missing_plan_maps_to_free() {
    let app = test_app();

    let (status, _) = send(&app.router, proxy_get(LOOKUP, "bob", None)).await;
    assert_eq!(status, StatusCode::OK);

    let tenant = app.store.find_by_label("rapidapi-bob").await.unwrap().unwrap();
    assert_eq!(tenant.tier, Tier::Free);
    assert_eq!(tenant.daily_quota, 100);
}

#[tokio::test]
async fn proxy_secret_takes_precedence_over_direct_key() {
    let app = test_app();
    let (direct, raw) = issue_key(&app.store, Tier::Pro).await;

    let request = Request::builder()
        .uri(LOOKUP)
        .header("x-rapidapi-proxy-secret", PROXY_SECRET)
        .header("x-rapidapi-user", "carol")
        .header("x-rapidapi-subscription", "BASIC")
        .header("x-api-key", &raw)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let proxy = app.store.find_by_label("rapidapi-carol").await.unwrap().unwrap();
    assert_eq!(app.store.today_count(proxy.id, today()).await.unwrap(), 1);
    assert_eq!(app.store.today_count(direct.id, today()).await.unwrap(), 0);
}

#[tokio::test]
async fn wrong_proxy_secret_does_not_fall_back_to_direct_key() {
    let app = test_app();
    let (direct, raw) = issue_key(&app.store, Tier::Pro).await;

    let request = Request::builder()
        .uri(LOOKUP)
        .header("x-rapidapi-proxy-secret", "guess")
        .header("x-rapidapi-user", "mallory")
        .header("x-api-key", &raw)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "invalid_proxy_secret");
    assert_eq!(app.store.key_count(), 1);
    assert_eq!(app.store.today_count(direct.id, today()).await.unwrap(), 0);
}

#[tokio::test]
async fn undecodable_proxy_secret_does_not_fall_back_to_direct_key() {
    let app = test_app();
    let (direct, raw) = issue_key(&app.store, Tier::Pro).await;

    let request = Request::builder()
        .uri(LOOKUP)
        .header(
            "x-rapidapi-proxy-secret",
            HeaderValue::from_bytes(b"s\xe9cret").unwrap(),
        )
        .header("x-rapidapi-user", "mallory")
        .header("x-api-key", &raw)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "invalid_proxy_secret");
    assert_eq!(app.store.key_count(), 1);
    assert_eq!(app.store.today_count(direct.id, today()).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_proxy_secret_is_missing() {
    let app = test_app();
    let request = Request::builder()
        .uri(LOOKUP)
        .header("x-rapidapi-proxy-secret", "")
        .header("x-rapidapi-user", "alice")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "missing_proxy_secret");
}

#[tokio::test]
async fn missing_subscriber_is_rejected_without_provisioning() {
    let app = test_app();
    let request = Request::builder()
        .uri(LOOKUP)
        .header("x-rapidapi-proxy-secret", PROXY_SECRET)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_subscriber_id");
    assert_eq!(app.store.key_count(), 0);
}

#[tokio::test]
async fn unconfigured_proxy_secret_rejects_every_proxy_request() {
    let store = Arc::new(MemoryStore::new());
    let state = metered_api_gateway::AppState::new(store.clone(), store.clone(), None, 16);
    let router = metered_api_gateway::build_router(state);

    let (status, body) = send(&router, proxy_get(LOOKUP, "alice", Some("PRO"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "invalid_proxy_secret");
    assert_eq!(store.key_count(), 0);
}

#[tokio::test]
async fn deactivated_proxy_tenant_is_not_reprovisioned() {
    let app = test_app();
    send(&app.router, proxy_get(LOOKUP, "dave", Some("ULTRA"))).await;
    let tenant = app.store.find_by_label("rapidapi-dave").await.unwrap().unwrap();
    app.store.set_active(tenant.id, false).await.unwrap();

    let (status, body) = send(&app.router, proxy_get(LOOKUP, "dave", Some("ULTRA"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "deactivated");
    assert_eq!(app.store.key_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_provision_one_tenant() {
    let app = test_app();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let router = app.router.clone();
        let request = proxy_get(LOOKUP, "erin", Some("PRO"));
        handles.push(tokio::spawn(async move {
            router.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.store.key_count(), 1);
    let tenant = app.store.find_by_label("rapidapi-erin").await.unwrap().unwrap();
    assert_eq!(app.store.today_count(tenant.id, today()).await.unwrap(), 20);
}

// ============================================================================
// Failure injection
// ============================================================================

/// Key store whose tier updates always fail.
struct StuckTierStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl KeyStore for StuckTierStore {
    async fn find_by_credential_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        self.inner.find_by_credential_hash(key_hash).await
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<ApiKey>, StoreError> {
        self.inner.find_by_label(label).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn list_by_owner(&self, owner_email: &str) -> Result<Vec<ApiKey>, StoreError> {
        self.inner.list_by_owner(owner_email).await
    }

    async fn create(&self, key: NewApiKey) -> Result<ApiKey, StoreError> {
        self.inner.create(key).await
    }

    async fn update_tier(&self, _id: Uuid, _tier: Tier, _daily_quota: i64) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        self.inner.set_active(id, active).await
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.touch_last_used(id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Ledger whose event log always fails.
struct LossyLedger {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl UsageLedger for LossyLedger {
    async fn today_count(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        self.inner.today_count(api_key_id, date).await
    }

    async fn increment_today(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        self.inner.increment_today(api_key_id, date).await
    }

    async fn increment_within_quota(
        &self,
        api_key_id: Uuid,
        date: NaiveDate,
        limit: i64,
    ) -> Result<Option<i64>, StoreError> {
        self.inner.increment_within_quota(api_key_id, date, limit).await
    }

    async fn record_event(&self, _event: UsageEvent) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn stats_since(
        &self,
        api_key_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<UsageStats, StoreError> {
        self.inner.stats_since(api_key_id, since).await
    }
}

#[tokio::test]
async fn failed_tier_sync_does_not_fail_the_request() {
    let store = Arc::new(MemoryStore::new());
    let keys = Arc::new(StuckTierStore {
        inner: store.clone(),
    });
    let router = router_with(keys, store.clone());

    send(&router, proxy_get(LOOKUP, "frank", Some("PRO"))).await;
    let (status, body) = send(&router, proxy_get(LOOKUP, "frank", Some("MEGA"))).await;

    // Admitted under the previously stored tier
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_calls_remaining"], 998);

    let tenant = store.find_by_label("rapidapi-frank").await.unwrap().unwrap();
    assert_eq!(tenant.tier, Tier::Starter);
}

#[tokio::test]
async fn event_log_failure_is_invisible_to_the_caller() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(LossyLedger {
        inner: store.clone(),
    });
    let router = router_with(store.clone(), ledger);
    let (key, raw) = issue_key(&store, Tier::Free).await;

    for _ in 0..3 {
        let (status, _) = send(&router, direct_get(LOOKUP, &raw)).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(store.today_count(key.id, today()).await.unwrap(), 3);
    assert!(settled_events(&store).await.is_empty());
}

// ============================================================================
// Usage events and tier gates
// ============================================================================

#[tokio::test]
async fn admitted_call_records_one_event() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Free).await;

    let request = Request::builder()
        .uri(LOOKUP)
        .header("x-api-key", &raw)
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let events = wait_for_events(&app.store, 1).await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.api_key_id, key.id);
    assert_eq!(event.endpoint, "/v1/employer/lookup");
    assert_eq!(event.method, "GET");
    assert_eq!(event.response_status, 200);
    assert_eq!(event.source_address, "203.0.113.7");
}

#[tokio::test]
async fn quota_rejection_is_recorded_with_429() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Free).await;
    for _ in 0..100 {
        app.store.increment_today(key.id, today()).await.unwrap();
    }

    let (status, _) = send(&app.router, direct_get(LOOKUP, &raw)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let events = wait_for_events(&app.store, 1).await;
    assert_eq!(events[0].response_status, 429);
}

#[tokio::test]
async fn tier_gated_endpoint_rejects_lower_tiers() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Starter).await;

    let request = json_request(
        "POST",
        "/v1/income/predict",
        Some(&raw),
        json!({"job_title": "Engineer", "experience_years": 5}),
    );
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "tier_not_allowed");
    assert_eq!(body["data"]["current_tier"], "starter");

    // Admitted by the gate, so the call still counts
    assert_eq!(app.store.today_count(key.id, today()).await.unwrap(), 1);
    let events = wait_for_events(&app.store, 1).await;
    assert_eq!(events[0].response_status, 403);
}

fn malformed_post(path: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("x-api-key", api_key)
        .body(Body::from("{not json"))
        .unwrap()
}

#[tokio::test]
async fn tier_gate_runs_before_body_parsing() {
    let app = test_app();
    let (_, raw) = issue_key(&app.store, Tier::Free).await;

    for path in ["/v1/income/predict", "/v1/intelligence/scan", "/v1/docs/analyze"] {
        let (status, body) = send(&app.router, malformed_post(path, &raw)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        assert_eq!(body["code"], "tier_not_allowed", "{path}");
    }
}

#[tokio::test]
async fn malformed_body_from_entitled_tier_uses_error_envelope() {
    let app = test_app();
    let (_, raw) = issue_key(&app.store, Tier::Enterprise).await;

    let (status, body) = send(&app.router, malformed_post("/v1/docs/analyze", &raw)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn enterprise_reaches_document_analysis() {
    let app = test_app();
    let (_, raw) = issue_key(&app.store, Tier::Enterprise).await;

    let request = json_request(
        "POST",
        "/v1/docs/analyze",
        Some(&raw),
        json!({"document_type": "paystub", "document_data": "base64data"}),
    );
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["api_calls_remaining"], 999_999);
}

#[tokio::test]
async fn usage_report_reflects_admitted_calls() {
    let app = test_app();
    let (key, raw) = issue_key(&app.store, Tier::Starter).await;

    send(&app.router, direct_get(LOOKUP, &raw)).await;
    wait_for_events(&app.store, 1).await;

    let (status, body) = send(&app.router, direct_get("/v1/usage", &raw)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"]["id"], key.id.to_string());
    assert_eq!(body["data"]["key"]["tier"], "starter");
    // The usage call itself is the second admitted call today
    assert_eq!(body["data"]["today"]["calls"], 2);
    assert_eq!(body["data"]["last_7_days"]["total_calls"], 1);
}
