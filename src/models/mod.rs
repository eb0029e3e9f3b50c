//! Data models representing stored entities and API payloads.

/// API key (tenant) model
pub mod api_key;
/// JSON response envelope
pub mod response;
/// Subscription tiers and quota policy
pub mod tier;
/// Usage events and aggregates
pub mod usage;
