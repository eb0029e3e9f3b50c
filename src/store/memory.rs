//! In-process store.
//!
//! Same contracts as the PostgreSQL store, scoped to one process: the key
//! table sits behind a mutex so both uniqueness checks and the insert happen
//! under one lock, and day counters live in a `DashMap` whose entry lock
//! makes the conditional increment atomic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use crate::{
    models::{
        api_key::{ApiKey, KeySource, NewApiKey},
        tier::Tier,
        usage::{UsageEvent, UsageStats},
    },
    store::{KeyStore, StoreError, UsageLedger},
};

#[derive(Debug, Default)]
struct KeyTable {
    by_id: HashMap<Uuid, ApiKey>,
    id_by_hash: HashMap<String, Uuid>,
    id_by_proxy_label: HashMap<String, Uuid>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: Mutex<KeyTable>,
    daily: DashMap<(Uuid, NaiveDate), i64>,
    events: Mutex<Vec<UsageEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, KeyTable> {
        // Every critical section leaves the table consistent, so a poisoned
        // lock is still safe to reuse.
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn events(&self) -> MutexGuard<'_, Vec<UsageEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of every recorded usage event, oldest first.
    pub fn events_snapshot(&self) -> Vec<UsageEvent> {
        self.events().clone()
    }

    /// Number of stored tenants.
    pub fn key_count(&self) -> usize {
        self.keys().by_id.len()
    }

    /// Number of day counters that exist.
    pub fn counter_rows(&self) -> usize {
        self.daily.len()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ApiKey),
    {
        let mut table = self.keys();
        let key = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        f(key);
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn find_by_credential_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let table = self.keys();
        Ok(table
            .id_by_hash
            .get(key_hash)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<ApiKey>, StoreError> {
        let table = self.keys();
        Ok(table
            .id_by_proxy_label
            .get(label)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.keys().by_id.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_email: &str) -> Result<Vec<ApiKey>, StoreError> {
        let mut keys: Vec<ApiKey> = self
            .keys()
            .by_id
            .values()
            .filter(|k| k.owner_email == owner_email)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn create(&self, key: NewApiKey) -> Result<ApiKey, StoreError> {
        let mut table = self.keys();

        if table.id_by_hash.contains_key(&key.key_hash) || table.by_id.contains_key(&key.id) {
            return Err(StoreError::DuplicateCredential);
        }
        if key.source == KeySource::Proxy && table.id_by_proxy_label.contains_key(&key.name) {
            return Err(StoreError::DuplicateLabel);
        }

        let record = key.into_record(Utc::now());
        table.id_by_hash.insert(record.key_hash.clone(), record.id);
        if record.source == KeySource::Proxy {
            table.id_by_proxy_label.insert(record.name.clone(), record.id);
        }
        table.by_id.insert(record.id, record.clone());

        Ok(record)
    }

    async fn update_tier(&self, id: Uuid, tier: Tier, daily_quota: i64) -> Result<(), StoreError> {
        self.modify(id, |key| {
            key.tier = tier;
            key.daily_quota = daily_quota;
        })
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        self.modify(id, |key| key.is_active = active)
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        self.modify(id, |key| key.last_used_at = Some(Utc::now()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UsageLedger for MemoryStore {
    async fn today_count(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        Ok(self
            .daily
            .get(&(api_key_id, date))
            .map(|count| *count)
            .unwrap_or(0))
    }

    async fn increment_today(&self, api_key_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let mut count = self.daily.entry((api_key_id, date)).or_insert(0);
        *count += 1;
        Ok(*count)
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

        // The entry guard holds the shard lock for the whole compare-and-bump.
        let mut count = self.daily.entry((api_key_id, date)).or_insert(0);
        if *count >= limit {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn record_event(&self, event: UsageEvent) -> Result<(), StoreError> {
        self.events().push(event);
        Ok(())
    }

    async fn stats_since(
        &self,
        api_key_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<UsageStats, StoreError> {
        let events = self.events();
        let window: Vec<&UsageEvent> = events
            .iter()
            .filter(|e| e.api_key_id == api_key_id && e.created_at >= since)
            .collect();

        let total_calls = window.len() as i64;
        let avg_latency_ms = if window.is_empty() {
            None
        } else {
            let sum: f64 = window.iter().map(|e| f64::from(e.latency_ms)).sum();
            Some(sum / window.len() as f64)
        };
        let error_count = window.iter().filter(|e| e.response_status >= 400).count() as i64;

        Ok(UsageStats {
            total_calls,
            avg_latency_ms,
            error_count,
        })
    }
}
