//! Direct API key resolution.
//!
//! Resolves the raw key from `x-api-key` (or the `api_key` query parameter)
//! to a tenant. A missing or unknown key touches no storage row.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppError,
    middleware::auth::PresentedCredentials,
    models::api_key::ApiKey,
    services::{credentials, gate::TenantResolver},
    store::KeyStore,
};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY_PARAM: &str = "api_key";

pub struct DirectKeyAuthenticator {
    keys: Arc<dyn KeyStore>,
}

impl DirectKeyAuthenticator {
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl TenantResolver for DirectKeyAuthenticator {
    /// # Flow
    ///
    /// 1. Reject with `MissingCredential` when no key was presented
    /// 2. Hash the key with SHA-256
    /// 3. Look the hash up; reject with `InvalidCredential` when unknown
    ///
    /// Deactivation and quota are checked later by the shared admission step.
    async fn resolve(&self, credentials: &PresentedCredentials) -> Result<ApiKey, AppError> {
        let raw_key = credentials
            .api_key
            .as_deref()
            .ok_or(AppError::MissingCredential)?;

        let key_hash = credentials::hash_api_key(raw_key);

        self.keys
            .find_by_credential_hash(&key_hash)
            .await?
            .ok_or(AppError::InvalidCredential)
    }
}
