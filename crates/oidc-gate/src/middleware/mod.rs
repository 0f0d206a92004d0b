//! Middleware for the OIDC gate service.
//!
//! # Components
//!
//! - `oidc` - Gate middleware for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod http_metrics;
pub mod oidc;

pub use http_metrics::http_metrics_middleware;
pub use oidc::require_oidc_session;
