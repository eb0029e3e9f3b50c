//! Paid endpoints behind the unified gate.
//!
//! Every handler receives the [`TenantContext`] injected by the gate, applies
//! its own tier gate where needed, and reports `api_calls_remaining`.

use axum::{
    Extension, Json,
    extract::{Query, rejection::JsonRejection},
};
use serde_json::Value;

use crate::{
    error::AppError,
    middleware::auth::TenantContext,
    models::{response::ApiResponse, tier::Tier},
    services::insights::{
        self, DocumentRequest, EmployerQuery, IncomeRequest, RegionQuery, ScanRequest,
    },
};

const PRO_AND_UP: &[Tier] = &[Tier::Pro, Tier::Enterprise];
const ENTERPRISE_ONLY: &[Tier] = &[Tier::Enterprise];

/// Unwrap a JSON body after the tier gate has passed, so lower tiers see
/// `TierNotAllowed` no matter what they sent.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

/// Attach `api_calls_remaining` to a handler result.
fn respond(ctx: &TenantContext, message: &str, mut data: Value) -> Json<ApiResponse<Value>> {
    if let Value::Object(ref mut fields) = data {
        fields.insert("api_calls_remaining".to_string(), ctx.remaining().into());
    }
    Json(ApiResponse::ok(message, data))
}

/// `GET /v1/employer/lookup?name=&ein=` (all tiers)
pub async fn employer_lookup(
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<EmployerQuery>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let data = insights::lookup_employer(&query)?;
    Ok(respond(&ctx, "Employer lookup complete", data))
}

/// `GET /v1/region/data?country=&state=` (all tiers)
pub async fn region_data(
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let data = insights::region_data(&query)?;
    Ok(respond(&ctx, "Regional data retrieved", data))
}

/// `POST /v1/income/predict` (pro, enterprise)
pub async fn income_predict(
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Json<IncomeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    ctx.require_tier("income predictions", PRO_AND_UP)?;
    let request = body(payload)?;
    let data = insights::predict_income(&request)?;
    Ok(respond(&ctx, "Income prediction complete", data))
}

/// `POST /v1/intelligence/scan` (pro, enterprise)
pub async fn intelligence_scan(
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    ctx.require_tier("intelligence scanning", PRO_AND_UP)?;
    let request = body(payload)?;
    let data = insights::scan(&request)?;
    Ok(respond(&ctx, "Intelligence scan complete", data))
}

/// `POST /v1/docs/analyze` (enterprise)
pub async fn docs_analyze(
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Json<DocumentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    ctx.require_tier("document analysis", ENTERPRISE_ONLY)?;
    let request = body(payload)?;
    let data = insights::analyze_document(&request)?;
    Ok(respond(&ctx, "Document analysis complete", data))
}
