//! Self-service key issuance and management.
//!
//! Keys issued here are always `free`; paid tiers are applied by the billing
//! side through [`KeyStore::update_tier`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        api_key::{ApiKeySummary, KeySource},
        tier::Tier,
    },
    services::credentials,
    store::KeyStore,
};

/// Maximum number of free keys one email may hold.
pub const MAX_FREE_KEYS_PER_EMAIL: usize = 5;

/// Request body for `POST /v1/keys/create`.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub email: String,
    pub name: String,
}

/// Response for a freshly issued key. The only time `key` is ever returned.
#[derive(Debug, Serialize)]
pub struct IssuedKey {
    pub key: String,
    pub key_id: Uuid,
    pub name: String,
    pub tier: Tier,
    pub daily_quota: i64,
    pub important: &'static str,
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain, no spaces.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Issue a new free key.
///
/// # Errors
///
/// - `InvalidRequest`: missing name, malformed email, or free-key limit reached
/// - `StorageUnavailable`: storage failure
pub async fn create_key(keys: &dyn KeyStore, request: CreateKeyRequest) -> Result<IssuedKey, AppError> {
    let email = request.email.trim();
    let name = request.name.trim();

    if email.is_empty() || name.is_empty() {
        return Err(AppError::InvalidRequest(
            "Email and name are required".to_string(),
        ));
    }
    if !is_valid_email(email) {
        return Err(AppError::InvalidRequest("Invalid email format".to_string()));
    }

    let free_keys = keys
        .list_by_owner(email)
        .await?
        .into_iter()
        .filter(|k| k.tier == Tier::Free)
        .count();
    if free_keys >= MAX_FREE_KEYS_PER_EMAIL {
        return Err(AppError::InvalidRequest(format!(
            "Maximum {MAX_FREE_KEYS_PER_EMAIL} free API keys per email. Upgrade to create more."
        )));
    }

    let (record, raw_key) = credentials::issue(name, email, Tier::Free, KeySource::Direct);
    let created = keys.create(record).await?;

    tracing::info!(api_key_id = %created.id, "issued API key");

    Ok(IssuedKey {
        key: raw_key,
        key_id: created.id,
        name: created.name,
        tier: created.tier,
        daily_quota: created.daily_quota,
        important: "Save this key now! It will not be shown again.",
    })
}

/// Masked listing of every key owned by `email`.
pub async fn list_keys(keys: &dyn KeyStore, email: &str) -> Result<Vec<ApiKeySummary>, AppError> {
    if email.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Email parameter required".to_string(),
        ));
    }

    let owned = keys.list_by_owner(email.trim()).await?;
    Ok(owned.into_iter().map(Into::into).collect())
}

/// Deactivate a key owned by `email`.
///
/// Returns `KeyNotFound` both when the key does not exist and when it belongs
/// to someone else.
pub async fn deactivate_key(keys: &dyn KeyStore, id: Uuid, email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Email required for verification".to_string(),
        ));
    }

    let key = keys
        .find_by_id(id)
        .await?
        .filter(|k| k.owner_email == email.trim())
        .ok_or(AppError::KeyNotFound)?;

    keys.set_active(key.id, false).await?;
    tracing::info!(api_key_id = %key.id, "deactivated API key");

    Ok(())
}
