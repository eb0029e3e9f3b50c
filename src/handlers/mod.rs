//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, tenant context)
//! 2. Delegates to a service
//! 3. Returns an HTTP response (JSON, status code)

/// Public API index and pricing
pub mod catalog;
/// Health check endpoint
pub mod health;
/// API key issuance and management
pub mod keys;
/// Tier-gated paid endpoints
pub mod paid;
/// Usage statistics for the calling key
pub mod usage;
