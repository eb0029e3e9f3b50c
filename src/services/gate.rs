//! Unified gate: one entry point for every paid route.
//!
//! # Dispatch
//!
//! - `x-rapidapi-proxy-secret` header present → proxy resolution
//! - otherwise → direct API key resolution
//!
//! Exactly one path runs per request. A request carrying both a proxy secret
//! and an `x-api-key` is a proxy request; the direct key is ignored.
//!
//! # States
//!
//! `Unauthenticated → Resolving tenant → Quota check → Admitted | Rejected`

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{PresentedCredentials, TenantContext},
    models::api_key::ApiKey,
    services::{admission, direct_auth::DirectKeyAuthenticator, proxy_auth::ProxyAuthenticator},
    store::{KeyStore, UsageLedger},
};

/// A strategy that turns presented credentials into a tenant.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, credentials: &PresentedCredentials) -> Result<ApiKey, AppError>;
}

/// A rejected request.
///
/// `tenant_id` is set when the tenant was resolved before rejection, so the
/// call can still be attributed in the usage log.
#[derive(Debug)]
pub struct GateRejection {
    pub error: AppError,
    pub tenant_id: Option<Uuid>,
}

pub struct Gate {
    keys: Arc<dyn KeyStore>,
    ledger: Arc<dyn UsageLedger>,
    direct: DirectKeyAuthenticator,
    proxy: ProxyAuthenticator,
}

impl Gate {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        ledger: Arc<dyn UsageLedger>,
        proxy_secret: Option<String>,
    ) -> Self {
        Self {
            direct: DirectKeyAuthenticator::new(keys.clone()),
            proxy: ProxyAuthenticator::new(keys.clone(), proxy_secret),
            keys,
            ledger,
        }
    }

    fn resolver_for(&self, credentials: &PresentedCredentials) -> &dyn TenantResolver {
        if credentials.proxy_secret.is_some() {
            &self.proxy
        } else {
            &self.direct
        }
    }

    /// Resolve the tenant behind `credentials` and run the quota check for `today`.
    pub async fn authenticate(
        &self,
        credentials: &PresentedCredentials,
        today: NaiveDate,
    ) -> Result<TenantContext, GateRejection> {
        let tenant = self
            .resolver_for(credentials)
            .resolve(credentials)
            .await
            .map_err(|error| GateRejection {
                error,
                tenant_id: None,
            })?;

        let tenant_id = tenant.id;
        admission::admit(self.keys.as_ref(), self.ledger.as_ref(), tenant, today)
            .await
            .map_err(|error| GateRejection {
                error,
                tenant_id: Some(tenant_id),
            })
    }
}
