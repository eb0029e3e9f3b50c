//! API key management HTTP handlers.
//!
//! - POST /v1/keys/create - Issue a new free key (raw key shown once)
//! - GET /v1/keys?email= - List keys for an email (masked)
//! - DELETE /v1/keys/{id} - Deactivate a key

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::{api_key::ApiKeySummary, response::ApiResponse},
    services::key_service::{self, CreateKeyRequest, IssuedKey},
};

/// Issue a new API key.
///
/// # Request Body
///
/// ```json
/// { "email": "dev@example.com", "name": "CI pipeline" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the raw key, its id and quota
/// - **Error (400)**: missing fields, bad email, or free-key limit reached
pub async fn create_key(
    State(state): State<AppState>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedKey>>), AppError> {
    let issued = key_service::create_key(state.keys.as_ref(), request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("API key created successfully", issued)),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct KeyListing {
    pub keys: Vec<ApiKeySummary>,
    pub total: usize,
}

pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<ApiResponse<KeyListing>>, AppError> {
    let keys = key_service::list_keys(state.keys.as_ref(), &query.email).await?;
    let total = keys.len();

    Ok(Json(ApiResponse::ok(
        "API keys retrieved",
        KeyListing { keys, total },
    )))
}

#[derive(Debug, Deserialize)]
pub struct DeactivateKeyRequest {
    #[serde(default)]
    pub email: String,
}

/// Deactivate a key.
///
/// The caller proves ownership with the owner email. Unknown keys and keys
/// owned by someone else both return 404.
pub async fn deactivate_key(
    State(state): State<AppState>,
    Path(key_id): Path<Uuid>,
    Json(request): Json<DeactivateKeyRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    key_service::deactivate_key(state.keys.as_ref(), key_id, &request.email).await?;

    Ok(Json(ApiResponse::ok("API key deactivated", ())))
}
