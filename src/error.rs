//! Error types and HTTP error response handling.
//!
//! This module defines every rejection the gateway can produce and how each
//! one is rendered as an HTTP response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{models::tier::Tier, store::StoreError};

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Credential Errors**: Missing, unknown or deactivated API keys
/// - **Proxy Errors**: Missing or wrong marketplace secret, missing subscriber
/// - **Quota Errors**: Daily allowance used up, or tier not entitled to an endpoint
/// - **Storage Errors**: Provisioning failures and unavailable storage
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No API key in the `x-api-key` header or `api_key` query parameter.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("API key required. Pass it in the x-api-key header")]
    MissingCredential,

    /// The presented key does not match any tenant.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidCredential,

    /// The key exists but has been deactivated.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("API key has been deactivated")]
    Deactivated,

    /// The tenant already used its whole daily allowance.
    ///
    /// Returns HTTP 429 Too Many Requests with usage details so the caller
    /// can self-diagnose.
    #[error("Rate limit exceeded")]
    QuotaExceeded {
        current_usage: i64,
        limit: i64,
        tier: Tier,
    },

    /// Request came through the proxy path without the shared secret.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Missing RapidAPI proxy secret")]
    MissingProxySecret,

    /// The shared secret does not match, or none is configured.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Invalid RapidAPI proxy secret")]
    InvalidProxySecret,

    /// Proxy request without a subscriber identity.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Missing X-RapidAPI-User header")]
    MissingSubscriberId,

    /// Storage failed while auto-creating a proxy tenant.
    ///
    /// Returns HTTP 500. Admission never proceeds without a tenant.
    #[error("Failed to provision API key")]
    ProvisioningFailure(#[source] StoreError),

    /// Storage failed on the request path.
    ///
    /// Returns HTTP 503 Service Unavailable (hides details from client).
    #[error("Storage unavailable")]
    StorageUnavailable(#[from] StoreError),

    /// The tenant's tier is not entitled to this endpoint.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("{} tier required for {feature}", lowest_display_name(.allowed))]
    TierNotAllowed {
        feature: &'static str,
        allowed: &'static [Tier],
        current_tier: Tier,
    },

    /// Referenced key does not exist or is not owned by the caller.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("API key not found")]
    KeyNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    InvalidRequest(String),
}

fn lowest_display_name(allowed: &[Tier]) -> &'static str {
    allowed.first().map(Tier::display_name).unwrap_or("Higher")
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingCredential
            | AppError::InvalidCredential
            | AppError::MissingProxySecret => StatusCode::UNAUTHORIZED,
            AppError::Deactivated
            | AppError::InvalidProxySecret
            | AppError::TierNotAllowed { .. } => StatusCode::FORBIDDEN,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MissingSubscriberId | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::KeyNotFound => StatusCode::NOT_FOUND,
            AppError::ProvisioningFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingCredential => "missing_credential",
            AppError::InvalidCredential => "invalid_credential",
            AppError::Deactivated => "deactivated",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::MissingProxySecret => "missing_proxy_secret",
            AppError::InvalidProxySecret => "invalid_proxy_secret",
            AppError::MissingSubscriberId => "missing_subscriber_id",
            AppError::ProvisioningFailure(_) => "provisioning_failure",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::TierNotAllowed { .. } => "tier_not_allowed",
            AppError::KeyNotFound => "key_not_found",
            AppError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Machine-readable details, present only for quota and tier rejections.
    fn details(&self) -> Value {
        match self {
            AppError::QuotaExceeded {
                current_usage,
                limit,
                tier,
            } => json!({
                "current_usage": current_usage,
                "limit": limit,
                "tier": tier,
            }),
            AppError::TierNotAllowed {
                allowed,
                current_tier,
                ..
            } => json!({
                "current_tier": current_tier,
                "allowed_tiers": allowed,
            }),
            _ => Value::Null,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "success": false,
///   "message": "Rate limit exceeded",
///   "code": "quota_exceeded",
///   "data": { "current_usage": 100, "limit": 100, "tier": "free" }
/// }
/// ```
///
/// `data` is `null` for credential rejections. Storage errors are logged here
/// and replaced by a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::ProvisioningFailure(source) => {
                tracing::error!(error = %source, "tenant provisioning failed");
            }
            AppError::StorageUnavailable(source) => {
                tracing::error!(error = %source, "storage unavailable on request path");
            }
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "code": self.code(),
            "data": self.details(),
        }));

        (self.status(), body).into_response()
    }
}
