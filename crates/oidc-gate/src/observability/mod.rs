//! Observability for the OIDC gate.

pub mod metrics;
