//! Business logic services.
//!
//! Services hold the gateway's logic separated from HTTP handlers: tenant
//! resolution, quota admission, key management and usage recording.

pub mod admission;
pub mod credentials;
pub mod direct_auth;
pub mod gate;
pub mod insights;
pub mod key_service;
pub mod proxy_auth;
pub mod usage_recorder;
