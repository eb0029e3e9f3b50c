//! HTTP middleware components.
//!
//! Middleware run before route handlers. They can authenticate requests,
//! attach context for handlers, and short-circuit rejected requests.

/// Unified gate (tenant authentication + quota admission)
pub mod auth;
