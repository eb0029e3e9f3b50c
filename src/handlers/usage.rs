//! Usage statistics for the calling tenant.

use axum::{Extension, Json, extract::State};
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::auth::TenantContext,
    models::{response::ApiResponse, tier::Tier, usage::TodayUsage},
};

#[derive(Debug, Serialize)]
pub struct KeyInfo {
    pub id: Uuid,
    pub name: String,
    pub tier: Tier,
    pub daily_quota: i64,
}

#[derive(Debug, Serialize)]
pub struct WeekUsage {
    pub total_calls: i64,
    pub avg_response_time_ms: i64,
    pub error_count: i64,
    pub error_rate: String,
}

#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub key: KeyInfo,
    pub today: TodayUsage,
    pub last_7_days: WeekUsage,
}

/// `GET /v1/usage`
///
/// Today's count includes the current call. The 7-day window only covers
/// events already flushed by the usage recorder.
pub async fn usage_stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<Json<ApiResponse<UsageReport>>, AppError> {
    let tenant = &ctx.tenant;
    let now = Utc::now();

    let calls = state.ledger.today_count(tenant.id, now.date_naive()).await?;
    let week = state
        .ledger
        .stats_since(tenant.id, now - Duration::days(7))
        .await?;

    let report = UsageReport {
        key: KeyInfo {
            id: tenant.id,
            name: tenant.name.clone(),
            tier: tenant.tier,
            daily_quota: tenant.daily_quota,
        },
        today: TodayUsage {
            calls,
            remaining: (tenant.daily_quota - calls).max(0),
            limit: tenant.daily_quota,
        },
        last_7_days: WeekUsage {
            total_calls: week.total_calls,
            avg_response_time_ms: week.avg_latency_ms.map(|ms| ms.round() as i64).unwrap_or(0),
            error_count: week.error_count,
            error_rate: week.error_rate(),
        },
    };

    Ok(Json(ApiResponse::ok("Usage statistics", report)))
}
