//! Bearer token authentication.
//!
//! Extracts the bearer token and hands it to the validation library together
//! with the registry's current active providers. Any failure is a halt: the
//! gate reports it and rejects the request without further processing.

use crate::auth::validator::{TokenValidator, ValidationError};
use crate::claims::VerifiedToken;
use crate::observability::metrics;
use crate::registry::ProviderRegistry;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Why authentication halted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthHalt {
    #[error("missing or malformed Authorization header")]
    MissingCredentials,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AuthHalt {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthHalt::MissingCredentials => "missing_credentials",
            AuthHalt::Validation(e) => e.kind(),
        }
    }
}

/// Extract a bearer token. The scheme is matched case-insensitively.
pub fn extract_bearer(headers: &HeaderMap) -> Result<SecretString, AuthHalt> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "oidc_gate.auth", "Missing Authorization header");
            AuthHalt::MissingCredentials
        })?;

    let (scheme, token) = value.trim().split_once(' ').ok_or_else(|| {
        tracing::debug!(target: "oidc_gate.auth", "Invalid Authorization header format");
        AuthHalt::MissingCredentials
    })?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        tracing::debug!(target: "oidc_gate.auth", "Authorization header is not a bearer token");
        return Err(AuthHalt::MissingCredentials);
    }

    Ok(SecretString::from(token.to_string()))
}

/// Authenticates requests through the validation library.
pub struct TokenAuthenticator {
    validator: Arc<dyn TokenValidator>,
    registry: Arc<ProviderRegistry>,
}

impl TokenAuthenticator {
    pub fn new(validator: Arc<dyn TokenValidator>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            validator,
            registry,
        }
    }

    /// Verify the request's bearer token.
    #[instrument(skip_all, name = "oidc_gate.auth.authenticate")]
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedToken, AuthHalt> {
        let result = self.verify(headers).await;

        match &result {
            Ok(_) => metrics::record_token_validation("success", "none"),
            Err(halt) => {
                on_validation_error(halt);
                metrics::record_token_validation("failure", halt.kind());
            }
        }

        result
    }

    async fn verify(&self, headers: &HeaderMap) -> Result<VerifiedToken, AuthHalt> {
        let token = extract_bearer(headers)?;

        // The snapshot Arc is owned here; no registry lock is held while the
        // validation library runs.
        let snapshot = self.registry.snapshot();

        let verified = self
            .validator
            .authenticate(token.expose_secret(), snapshot.active_providers())
            .await?;

        Ok(verified)
    }
}

/// Replacement for the validation library's error hook: log only, and leave
/// the response to the gate.
fn on_validation_error(halt: &AuthHalt) {
    match halt {
        AuthHalt::Validation(detail) => {
            tracing::warn!(target: "oidc_gate.auth", reason = halt.kind(), detail = ?detail, "JWT invalid");
        }
        AuthHalt::MissingCredentials => {
            tracing::warn!(target: "oidc_gate.auth", reason = halt.kind(), "JWT invalid");
        }
    }
}
