//! Usage ledger models.
//!
//! - `UsageEvent`: one row per completed call, appended after the response
//! - `UsageStats`: aggregate over a window of events

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A single completed API call.
///
/// # Database Table
///
/// Maps to the `api_usage` table. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub id: Uuid,
    pub api_key_id: Uuid,
    /// Request path, e.g. `/v1/employer/lookup`
    pub endpoint: String,
    pub method: String,
    pub response_status: u16,
    pub latency_ms: u32,
    /// Caller address; empty when unknown
    pub source_address: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over the usage events of one tenant.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct UsageStats {
    pub total_calls: i64,
    /// `None` when there are no events in the window
    pub avg_latency_ms: Option<f64>,
    /// Calls that finished with status >= 400
    pub error_count: i64,
}

impl UsageStats {
    /// Error percentage formatted for display, e.g. `"12.50%"`.
    pub fn error_rate(&self) -> String {
        if self.total_calls == 0 {
            return "0%".to_string();
        }
        let rate = self.error_count as f64 / self.total_calls as f64 * 100.0;
        format!("{rate:.2}%")
    }
}

/// Today's counter as reported by `GET /v1/usage`.
#[derive(Debug, Serialize)]
pub struct TodayUsage {
    pub calls: i64,
    pub remaining: i64,
    pub limit: i64,
}
