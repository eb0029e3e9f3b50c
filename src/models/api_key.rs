//! API Key model for tenant authentication.
//!
//! Every billable tenant is represented by one API key record. Keys are stored
//! as SHA-256 hashes; the raw key is shown to its owner exactly once when it
//! is issued and never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::tier::Tier;

/// How a tenant came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Issued directly to an owner through key creation.
    Direct,
    /// Auto-provisioned for a marketplace subscriber.
    Proxy,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Direct => "direct",
            KeySource::Proxy => "proxy",
        }
    }

    /// Parse the stored column value. Anything unrecognized is a direct key.
    pub fn from_label(label: &str) -> Self {
        if label == "proxy" {
            KeySource::Proxy
        } else {
            KeySource::Direct
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents an API key (tenant) record.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID), immutable
/// - `key_hash`: SHA-256 hash of the raw key, unique across all tenants
/// - `key_prefix`: Non-secret fragment shown in listings
/// - `name`: Human-readable label (unique among proxy tenants)
/// - `owner_email`: Contact identity
/// - `tier` / `daily_quota`: Subscription level and its denormalized allowance
/// - `source`: `direct` or `proxy`
/// - `is_active`: Deactivated keys are rejected regardless of quota
/// - `created_at` / `last_used_at`: Timestamps
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the raw key (64 hex characters)
    #[serde(skip_serializing)]
    pub key_hash: String,

    /// First characters of the raw key followed by `...`
    pub key_prefix: String,

    /// Label of the tenant
    ///
    /// For proxy tenants this is `rapidapi-<subscriber>`, so repeated lookups
    /// for the same subscriber land on the same row.
    pub name: String,

    pub owner_email: String,

    pub tier: Tier,

    /// Calls allowed per calendar day (UTC)
    pub daily_quota: i64,

    pub source: KeySource,

    /// Whether this API key is currently active
    ///
    /// Deactivation is a flag flip, never a row removal, so historical usage
    /// stays attributable.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// A key about to be inserted.
///
/// Built by [`crate::services::credentials::issue`], which also returns the
/// raw key to hand to the owner.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    pub owner_email: String,
    pub tier: Tier,
    pub daily_quota: i64,
    pub source: KeySource,
}

impl NewApiKey {
    /// Materialize the stored record as it looks right after insertion.
    pub fn into_record(self, created_at: DateTime<Utc>) -> ApiKey {
        ApiKey {
            id: self.id,
            key_hash: self.key_hash,
            key_prefix: self.key_prefix,
            name: self.name,
            owner_email: self.owner_email,
            tier: self.tier,
            daily_quota: self.daily_quota,
            source: self.source,
            is_active: true,
            created_at,
            last_used_at: None,
        }
    }
}

/// Masked view of a key for listings. Never carries the hash.
#[derive(Debug, Serialize)]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub prefix: String,
    pub name: String,
    pub tier: Tier,
    pub daily_quota: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            prefix: key.key_prefix,
            name: key.name,
            tier: key.tier,
            daily_quota: key.daily_quota,
            is_active: key.is_active,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        }
    }
}
