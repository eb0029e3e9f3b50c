//! Unified gate middleware.
//!
//! This middleware intercepts every paid request to:
//! 1. Collect the presented credentials (proxy headers or direct API key)
//! 2. Hand them to the [`Gate`](crate::services::gate::Gate), which resolves
//!    the tenant and runs the quota check
//! 3. Inject [`TenantContext`] into the request, or reject it
//! 4. Queue a usage event for every call attributed to a tenant

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::{collections::HashMap, net::SocketAddr, time::Instant};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::{api_key::ApiKey, tier::Tier, usage::UsageEvent},
    services::{
        direct_auth::{API_KEY_HEADER, API_KEY_QUERY_PARAM},
        proxy_auth::{PLAN_HEADER, PROXY_SECRET_HEADER, SUBSCRIBER_HEADER},
    },
};

/// Authentication context attached to admitted requests.
///
/// Identical for both entry paths, so paid handlers have one contract.
/// Extract it with `Extension<TenantContext>`.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: ApiKey,

    /// Today's call count including this call
    pub usage_count_this_call: i64,
}

impl TenantContext {
    /// Calls left today after this one.
    pub fn remaining(&self) -> i64 {
        (self.tenant.daily_quota - self.usage_count_this_call).max(0)
    }

    /// Endpoint-level tier gate.
    ///
    /// # Errors
    ///
    /// `TierNotAllowed` when the tenant's tier is not in `allowed`.
    pub fn require_tier(&self, feature: &'static str, allowed: &'static [Tier]) -> Result<(), AppError> {
        if allowed.contains(&self.tenant.tier) {
            return Ok(());
        }
        Err(AppError::TierNotAllowed {
            feature,
            allowed,
            current_tier: self.tenant.tier,
        })
    }
}

/// Credential signals found on a request.
///
/// `proxy_secret` is `Some` whenever the header is present, even if empty:
/// presence alone selects the proxy path.
#[derive(Debug, Clone, Default)]
pub struct PresentedCredentials {
    pub proxy_secret: Option<String>,
    pub subscriber: Option<String>,
    pub plan: Option<String>,
    pub api_key: Option<String>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// `Some` whenever the header exists. Bytes that are not visible ASCII are
/// replaced lossily, so the value still reaches (and fails) the comparison.
fn presence_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|h| String::from_utf8_lossy(h.as_bytes()).trim().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl PresentedCredentials {
    /// Read credentials from headers, falling back to the `api_key` query
    /// parameter for the direct key.
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        let api_key = non_empty(header_string(headers, API_KEY_HEADER)).or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(uri)
                .ok()
                .and_then(|Query(params)| params.get(API_KEY_QUERY_PARAM).cloned())
                .filter(|v| !v.is_empty())
        });

        Self {
            proxy_secret: presence_header(headers, PROXY_SECRET_HEADER),
            subscriber: non_empty(header_string(headers, SUBSCRIBER_HEADER)),
            plan: non_empty(header_string(headers, PLAN_HEADER)),
            api_key,
        }
    }
}

/// Caller address: first `x-forwarded-for` hop, else the peer address.
fn source_address(request: &Request) -> String {
    if let Some(forwarded) = header_string(request.headers(), "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Gate middleware function.
///
/// # Flow
///
/// 1. Read credentials from the request
/// 2. Authenticate through the gate (dispatch, resolve, admit)
/// 3. Admitted: insert `TenantContext` and call the next handler
/// 4. Rejected: render the error response; the handler never runs
/// 5. If a tenant was resolved, queue a usage event with the final status
///    and latency once the handler returns. The body may still be streaming
///    when the event is queued; queuing never blocks the response.
pub async fn api_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let source_address = source_address(&request);
    let credentials = PresentedCredentials::from_parts(request.headers(), request.uri());
    let today = Utc::now().date_naive();

    let (tenant_id, response) = match state.gate.authenticate(&credentials, today).await {
        Ok(context) => {
            let tenant_id = context.tenant.id;
            request.extensions_mut().insert(context);
            (Some(tenant_id), next.run(request).await)
        }
        Err(rejection) => {
            tracing::debug!(
                code = rejection.error.code(),
                endpoint = %endpoint,
                "request rejected at gate"
            );
            (rejection.tenant_id, rejection.error.into_response())
        }
    };

    if let Some(api_key_id) = tenant_id {
        state.recorder.record(UsageEvent {
            id: Uuid::new_v4(),
            api_key_id,
            endpoint,
            method,
            response_status: response.status().as_u16(),
            latency_ms: u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX),
            source_address,
            created_at: Utc::now(),
        });
    }

    response
}
