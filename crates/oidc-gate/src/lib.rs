//! OIDC Gate Library
//!
//! Identity federation for an API gateway: requests carrying a bearer token
//! issued by a trusted OpenID Connect provider are authenticated, mapped to a
//! gateway policy through the token's issuer and audience, and bound to a
//! deterministic gateway session.
//!
//! # Architecture
//!
//! ```text
//! middleware/oidc.rs -> gate.rs -> auth/ -> resolver.rs -> session/ -> context.rs
//!                                    |           |
//!                                  oidc/     registry.rs
//! ```
//!
//! # Modules
//!
//! - `audit` - Authentication failure reporting
//! - `auth` - Bearer extraction and the `TokenValidator` seam
//! - `claims` - Verified token claims
//! - `config` - Service configuration from environment
//! - `context` - Request context publishing
//! - `errors` - Error types with HTTP status code mapping
//! - `gate` - The per-request pipeline
//! - `handlers` - HTTP request handlers
//! - `middleware` - Gate and metrics middleware
//! - `observability` - Prometheus metrics
//! - `oidc` - Discovery/JWKS backed `TokenValidator`
//! - `policy` - Policy engine seam and static engine
//! - `registry` - Trusted providers and client→policy maps
//! - `resolver` - Issuer/audience to policy resolution
//! - `routes` - Axum router setup
//! - `session` - Session identifiers, state and stores

pub mod audit;
pub mod auth;
pub mod claims;
pub mod config;
pub mod context;
pub mod errors;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod oidc;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod session;
