//! PostgreSQL implementation of [`KeyStore`] and [`UsageLedger`].
//!
//! The database is the single serialization point for quota state:
//!
//! - The daily counter is advanced by one conditional upsert, so concurrent
//!   requests for the same tenant cannot both pass a stale check.
//! - Proxy provisioning races collapse onto the `api_keys_proxy_label_unique`
//!   index instead of application-level locks.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    models::{
        api_key::{ApiKey, KeySource, NewApiKey},
        tier::Tier,
        usage::{UsageEvent, UsageStats},
    },
    store::{KeyStore, StoreError, UsageLedger},
};

const KEY_COLUMNS: &str = "id, key_hash, key_prefix, name, owner_email, tier, daily_quota, \
     source, is_active, created_at, last_used_at";

const CREDENTIAL_CONSTRAINT: &str = "api_keys_key_hash_unique";
const PROXY_LABEL_CONSTRAINT: &str = "api_keys_proxy_label_unique";

/// Raw `api_keys` row. Text columns are converted into their enums on the way out.
#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    key_hash: String,
    key_prefix: String,
    name: String,
    owner_email: String,
    tier: String,
    daily_quota: i64,
    source: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            key_hash: row.key_hash,
            key_prefix: row.key_prefix,
            name: row.name,
            owner_email: row.owner_email,
            tier: Tier::from_label(&row.tier),
            daily_quota: row.daily_quota,
            source: KeySource::from_label(&row.source),
            is_active: row.is_active,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

/// Translate unique violations into the store's typed conflicts.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(PROXY_LABEL_CONSTRAINT) => StoreError::DuplicateLabel,
                Some(CREDENTIAL_CONSTRAINT) => StoreError::DuplicateCredential,
                // Primary key collision on a fresh UUID: treat as a credential clash
                _ => StoreError::DuplicateCredential,
            };
        }
    }
    StoreError::Database(err)
}

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_key(&self, filter: &str, value: &str) -> Result<Option<ApiKey>, StoreError> {
        let sql = format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE {filter}");
        let row = sqlx::query_as::<_, ApiKeyRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl KeyStore for PgStore {
    async fn find_by_credential_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        self.fetch_key("key_hash = $1", key_hash).await
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<ApiKey>, StoreError> {
        self.fetch_key("name = $1 AND source = 'proxy'", label).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError> {
        let sql = format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE id = $1");
        let row = sqlx::query_as::<_, ApiKeyRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_by_owner(&self, owner_email: &str) -> Result<Vec<ApiKey>, StoreError> {
        let sql = format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE owner_email = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, ApiKeyRow>(&sql)
            .bind(owner_email)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create(&self, key: NewApiKey) -> Result<ApiKey, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO api_keys (id, key_hash, key_prefix, name, owner_email, tier, daily_quota, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {KEY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ApiKeyRow>(&sql)
            .bind(key.id)
            .bind(&key.key_hash)
            .bind(&key.key_prefix)
            .bind(&key.name)
            .bind(&key.owner_email)
            .bind(key.tier.as_str())
            .bind(key.daily_quota)
            .bind(key.source.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(row.into())
    }

    async fn update_tier(&self, id: Uuid, tier: Tier, daily_quota: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE api_keys SET tier = $1, daily_quota = $2 WHERE id = $3")
            .bind(tier.as_str())
            .bind(daily_quota)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageLedger for PgStore {
    async fn today_count(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT call_count FROM api_usage_daily WHERE api_key_id = $1 AND usage_date = $2",
        )
        .bind(api_key_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_today(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO api_usage_daily (api_key_id, usage_date, call_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (api_key_id, usage_date)
            DO UPDATE SET call_count = api_usage_daily.call_count + 1
            RETURNING call_count
            "#,
        )
        .bind(api_key_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn increment_within_quota(
        &self,
        api_key_id: Uuid,
        date: NaiveDate,
        limit: i64,
    ) -> Result<Option<i64>, StoreError> {
        if limit <= 0 {
            return Ok(None);
        }

        // The WHERE on the conflict branch makes the check and the increment a
        // single statement; no row is returned once the counter reaches `limit`.
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO api_usage_daily (api_key_id, usage_date, call_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (api_key_id, usage_date)
            DO UPDATE SET call_count = api_usage_daily.call_count + 1
            WHERE api_usage_daily.call_count < $3
            RETURNING call_count
            "#,
        )
        .bind(api_key_id)
        .bind(date)
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    async fn record_event(&self, event: UsageEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_usage (
                id,
                api_key_id,
                endpoint,
                method,
                response_status,
                latency_ms,
                source_address,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.api_key_id)
        .bind(&event.endpoint)
        .bind(&event.method)
        .bind(i32::from(event.response_status))
        .bind(i32::try_from(event.latency_ms).unwrap_or(i32::MAX))
        .bind(&event.source_address)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stats_since(
        &self,
        api_key_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<UsageStats, StoreError> {
        let stats = sqlx::query_as::<_, UsageStats>(
            r#"
            SELECT
                COUNT(*) AS total_calls,
                AVG(latency_ms)::FLOAT8 AS avg_latency_ms,
                COUNT(*) FILTER (WHERE response_status >= 400) AS error_count
            FROM api_usage
            WHERE api_key_id = $1 AND created_at >= $2
            "#,
        )
        .bind(api_key_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}
