//! Public, unauthenticated API information.

use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

use crate::models::{response::ApiResponse, tier::Tier};

#[derive(Debug, Serialize)]
pub struct PlanInfo {
    pub tier: Tier,
    pub name: &'static str,
    pub price_monthly: u32,
    pub calls_per_day: i64,
    /// Price of one call assuming a 30-day month, or `"free"`
    pub price_per_call: String,
    pub features: &'static [&'static str],
}

impl From<Tier> for PlanInfo {
    fn from(tier: Tier) -> Self {
        let price = tier.monthly_price_usd();
        let calls = tier.daily_quota();
        let price_per_call = if price > 0 {
            format!("{:.4}", f64::from(price) / (calls as f64 * 30.0))
        } else {
            "free".to_string()
        };

        Self {
            tier,
            name: tier.display_name(),
            price_monthly: price,
            calls_per_day: calls,
            price_per_call,
            features: tier.features(),
        }
    }
}

fn plans() -> Vec<PlanInfo> {
    Tier::ALL.into_iter().map(PlanInfo::from).collect()
}

/// `GET /v1`
pub async fn api_index() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::ok(
        "Public API v1",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "GET /v1/employer/lookup": "Employer verification (Free)",
                "GET /v1/region/data": "Regional economic data (Free)",
                "POST /v1/income/predict": "Predict income from limited data (Pro+)",
                "POST /v1/intelligence/scan": "Analyze data points for fraud signals (Pro+)",
                "POST /v1/docs/analyze": "Full document analysis (Enterprise)",
                "GET /v1/usage": "Usage statistics for the calling key",
            },
            "authentication": {
                "direct": "x-api-key header or api_key query parameter",
                "rapidapi": "X-RapidAPI-Proxy-Secret, X-RapidAPI-User, X-RapidAPI-Subscription",
            },
            "pricing": plans(),
        }),
    ))
}

/// `GET /v1/pricing`
pub async fn pricing() -> Json<ApiResponse<Vec<PlanInfo>>> {
    Json(ApiResponse::ok("API Pricing", plans()))
}
