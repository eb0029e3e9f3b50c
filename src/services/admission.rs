//! Shared admit-or-reject routine.
//!
//! Both authenticators end here once they have resolved a tenant, so the
//! quota algorithm exists exactly once.
//!
//! # Process
//!
//! 1. Reject deactivated tenants
//! 2. Atomically bump today's counter if it is below the tenant's quota
//! 3. On success touch `last_used_at` (best effort) and admit
//! 4. Otherwise read the current count and reject with `QuotaExceeded`

use chrono::NaiveDate;

use crate::{
    error::AppError,
    middleware::auth::TenantContext,
    models::api_key::ApiKey,
    store::{KeyStore, UsageLedger},
};

pub async fn admit(
    keys: &dyn KeyStore,
    ledger: &dyn UsageLedger,
    tenant: ApiKey,
    today: NaiveDate,
) -> Result<TenantContext, AppError> {
    if !tenant.is_active {
        tracing::info!(api_key_id = %tenant.id, "rejected deactivated key");
        return Err(AppError::Deactivated);
    }

    let admitted = ledger
        .increment_within_quota(tenant.id, today, tenant.daily_quota)
        .await?;

    let Some(usage_count_this_call) = admitted else {
        let current_usage = ledger.today_count(tenant.id, today).await?;
        tracing::info!(
            api_key_id = %tenant.id,
            tier = %tenant.tier,
            current_usage,
            limit = tenant.daily_quota,
            "daily quota exceeded"
        );
        return Err(AppError::QuotaExceeded {
            current_usage,
            limit: tenant.daily_quota,
            tier: tenant.tier,
        });
    };

    if let Err(e) = keys.touch_last_used(tenant.id).await {
        tracing::warn!(api_key_id = %tenant.id, error = %e, "failed to update last_used_at");
    }

    Ok(TenantContext {
        tenant,
        usage_count_this_call,
    })
}
