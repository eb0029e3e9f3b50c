//! Persistence seams for the gateway.
//!
//! Two traits cover everything the request path reads and writes:
//!
//! - [`KeyStore`]: the registry of tenant credentials
//! - [`UsageLedger`]: per-day call counters plus the append-only call log
//!
//! [`postgres::PgStore`] is the production implementation. [`memory::MemoryStore`]
//! honours the same contracts inside a single process.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    api_key::{ApiKey, NewApiKey},
    tier::Tier,
    usage::{UsageEvent, UsageStats},
};

pub mod memory;
pub mod postgres;

/// Errors raised by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another tenant already owns this credential hash.
    #[error("credential hash already exists")]
    DuplicateCredential,

    /// A proxy tenant with this label already exists.
    #[error("tenant label already exists")]
    DuplicateLabel,

    /// The referenced tenant does not exist.
    #[error("tenant not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True for the uniqueness violations a concurrent provisioner can hit.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateCredential | StoreError::DuplicateLabel
        )
    }
}

/// Registry of tenant credentials.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn find_by_credential_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Look up a proxy-provisioned tenant by its label.
    ///
    /// Direct keys never match; their labels are free-form and not unique.
    async fn find_by_label(&self, label: &str) -> Result<Option<ApiKey>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError>;

    /// All keys owned by an email address, newest first.
    async fn list_by_owner(&self, owner_email: &str) -> Result<Vec<ApiKey>, StoreError>;

    /// Insert a new tenant.
    ///
    /// # Errors
    ///
    /// - `DuplicateCredential` if the hash is already taken
    /// - `DuplicateLabel` if a proxy tenant with the same label exists
    async fn create(&self, key: NewApiKey) -> Result<ApiKey, StoreError>;

    /// Change the tier (and its quota) of an existing tenant in place.
    async fn update_tier(&self, id: Uuid, tier: Tier, daily_quota: i64) -> Result<(), StoreError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError>;

    /// Cheap connectivity check for health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Daily counters and the per-call log.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Calls counted for `api_key_id` on `date`; 0 when no row exists.
    async fn today_count(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    /// Create-or-increment the day's counter unconditionally. Returns the new count.
    async fn increment_today(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    /// Create-or-increment the day's counter only while it is below `limit`.
    ///
    /// The comparison and the increment are one atomic step. Returns the new
    /// count, or `None` when the counter was already at or above `limit`.
    async fn increment_within_quota(
        &self,
        api_key_id: Uuid,
        date: NaiveDate,
        limit: i64,
    ) -> Result<Option<i64>, StoreError>;

    async fn record_event(&self, event: UsageEvent) -> Result<(), StoreError>;

    /// Aggregate the events of one tenant created at or after `since`.
    async fn stats_since(
        &self,
        api_key_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<UsageStats, StoreError>;
}
