//! Marketplace proxy resolution.
//!
//! Requests relayed by the RapidAPI gateway carry:
//!
//! - `X-RapidAPI-Proxy-Secret`: shared secret proving the request came from RapidAPI
//! - `X-RapidAPI-User`: the subscriber's marketplace username
//! - `X-RapidAPI-Subscription`: the subscriber's plan (`BASIC`, `PRO`, `ULTRA`, `MEGA`)
//!
//! Each subscriber maps to one internal tenant labelled `rapidapi-<user>`. The
//! tenant is created the first time the subscriber is seen and its tier is
//! re-synced whenever the plan changes upstream.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppError,
    middleware::auth::PresentedCredentials,
    models::{
        api_key::{ApiKey, KeySource},
        tier::Tier,
    },
    services::{credentials, gate::TenantResolver},
    store::KeyStore,
};

pub const PROXY_SECRET_HEADER: &str = "x-rapidapi-proxy-secret";
pub const SUBSCRIBER_HEADER: &str = "x-rapidapi-user";
pub const PLAN_HEADER: &str = "x-rapidapi-subscription";

const LABEL_PREFIX: &str = "rapidapi-";
const OWNER_DOMAIN: &str = "rapidapi.proxy";

/// Deterministic tenant label for a subscriber.
pub fn tenant_label(subscriber: &str) -> String {
    format!("{LABEL_PREFIX}{subscriber}")
}

/// Synthetic owner identity for a subscriber.
pub fn owner_identity(subscriber: &str) -> String {
    format!("{subscriber}@{OWNER_DOMAIN}")
}

pub struct ProxyAuthenticator {
    keys: Arc<dyn KeyStore>,
    expected_secret: Option<String>,
}

impl ProxyAuthenticator {
    /// `expected_secret` of `None` (or empty) rejects every proxy request.
    pub fn new(keys: Arc<dyn KeyStore>, expected_secret: Option<String>) -> Self {
        Self {
            keys,
            expected_secret: expected_secret.filter(|s| !s.is_empty()),
        }
    }

    fn verify_secret(&self, presented: Option<&str>) -> Result<(), AppError> {
        let presented = presented
            .filter(|s| !s.is_empty())
            .ok_or(AppError::MissingProxySecret)?;

        let Some(expected) = self.expected_secret.as_deref() else {
            tracing::warn!("proxy request received but no proxy secret is configured");
            return Err(AppError::InvalidProxySecret);
        };

        if !credentials::secrets_match(presented, expected) {
            return Err(AppError::InvalidProxySecret);
        }
        Ok(())
    }

    /// Bring a stored tenant in line with the subscriber's current plan.
    ///
    /// A failed write is not fatal: the request continues on the stored tier.
    async fn sync_tier(&self, mut tenant: ApiKey, tier: Tier) -> ApiKey {
        if tenant.tier == tier {
            return tenant;
        }

        let daily_quota = tier.daily_quota();
        match self.keys.update_tier(tenant.id, tier, daily_quota).await {
            Ok(()) => {
                tracing::info!(
                    api_key_id = %tenant.id,
                    from = %tenant.tier,
                    to = %tier,
                    "re-synced proxy tenant tier"
                );
                tenant.tier = tier;
                tenant.daily_quota = daily_quota;
            }
            Err(e) => {
                tracing::warn!(
                    api_key_id = %tenant.id,
                    error = %e,
                    "tier re-sync failed, keeping stored tier"
                );
            }
        }
        tenant
    }

    /// Create the tenant for a first-time subscriber.
    ///
    /// # Races
    ///
    /// Two first requests for the same subscriber both try to insert. The
    /// loser hits the label (or credential) uniqueness constraint and re-reads
    /// the winner's row instead of failing.
    async fn provision(&self, subscriber: &str, label: &str, tier: Tier) -> Result<ApiKey, AppError> {
        // The raw key is discarded; proxy subscribers never present it.
        let (record, _raw_key) =
            credentials::issue(label, &owner_identity(subscriber), tier, KeySource::Proxy);

        match self.keys.create(record).await {
            Ok(tenant) => {
                tracing::info!(api_key_id = %tenant.id, label, tier = %tier, "provisioned proxy tenant");
                Ok(tenant)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(label, error = %e, "lost provisioning race, re-reading tenant");
                match self.keys.find_by_label(label).await {
                    Ok(Some(existing)) => Ok(self.sync_tier(existing, tier).await),
                    Ok(None) => Err(AppError::ProvisioningFailure(e)),
                    Err(read_err) => Err(AppError::ProvisioningFailure(read_err)),
                }
            }
            Err(e) => Err(AppError::ProvisioningFailure(e)),
        }
    }
}

#[async_trait]
impl TenantResolver for ProxyAuthenticator {
    /// # Flow
    ///
    /// 1. `MissingProxySecret` if the secret header is empty
    /// 2. Constant-time compare against the configured secret; `InvalidProxySecret`
    ///    on mismatch or when no secret is configured
    /// 3. `MissingSubscriberId` without `X-RapidAPI-User`
    /// 4. Map the plan to a tier (unknown or missing plan → `free`)
    /// 5. Find the tenant by label, re-syncing its tier, or provision it
    async fn resolve(&self, credentials: &PresentedCredentials) -> Result<ApiKey, AppError> {
        self.verify_secret(credentials.proxy_secret.as_deref())?;

        let subscriber = credentials
            .subscriber
            .as_deref()
            .ok_or(AppError::MissingSubscriberId)?;

        let tier = Tier::from_marketplace_plan(credentials.plan.as_deref());
        let label = tenant_label(subscriber);

        match self.keys.find_by_label(&label).await? {
            Some(existing) => Ok(self.sync_tier(existing, tier).await),
            None => self.provision(subscriber, &label, tier).await,
        }
    }
}
