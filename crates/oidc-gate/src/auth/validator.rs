//! Validation library seam.
//!
//! Signature verification, OIDC discovery and JWKS retrieval are delegated to
//! a `TokenValidator`. The gate only registers providers with it and asks it
//! to authenticate bearer tokens against the currently active provider list.

use crate::claims::VerifiedToken;
use async_trait::async_trait;
use thiserror::Error;

/// Request to register one identity provider with the validation library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistration {
    /// Issuer identifier (matched against the token's `iss`).
    pub issuer: String,

    /// Decoded client identifiers accepted as audiences for this issuer.
    pub client_ids: Vec<String>,
}

/// A provider the validation library accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub issuer: String,
    pub client_ids: Vec<String>,

    /// JWKS endpoint discovered for the issuer, when the library uses one.
    pub jwks_uri: Option<String>,
}

/// Errors reported by the validation library.
///
/// Display strings are generic; the detail is carried for server-side logs only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Provider registration (discovery) failed.
    #[error("Provider registration failed: {0}")]
    Registration(String),

    /// Token failed structural, signature, or claim checks.
    #[error("The access token is invalid or expired")]
    InvalidToken(String),

    /// Token names an issuer that no active provider serves.
    #[error("The access token is invalid or expired")]
    UnknownIssuer,

    /// Key material could not be retrieved.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

impl ValidationError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Registration(_) => "registration",
            ValidationError::InvalidToken(_) => "invalid_token",
            ValidationError::UnknownIssuer => "unknown_issuer",
            ValidationError::Unavailable(_) => "unavailable",
        }
    }
}

/// External token validation library.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Register a provider (performing discovery if the library needs it).
    async fn register(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<ProviderHandle, ValidationError>;

    /// Verify a bearer token against the given active providers.
    async fn authenticate(
        &self,
        token: &str,
        providers: &[ProviderHandle],
    ) -> Result<VerifiedToken, ValidationError>;
}

/// Mock validation library for tests.
///
/// Tokens are opaque strings mapped to pre-built `VerifiedToken`s; issuers can
/// be marked as failing registration.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Mock validator with canned tokens.
    #[derive(Default)]
    pub struct MockTokenValidator {
        tokens: HashMap<String, VerifiedToken>,
        failing_issuers: HashSet<String>,
        registration_delay: Option<Duration>,
        /// Require the token's issuer to be among the active providers.
        enforce_active_issuer: bool,
        registrations: Mutex<Vec<ProviderRegistration>>,
        authenticate_calls: AtomicUsize,
    }

    impl MockTokenValidator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` and return `verified` for it.
        pub fn with_token(mut self, token: &str, verified: VerifiedToken) -> Self {
            self.tokens.insert(token.to_string(), verified);
            self
        }

        /// Make registration of `issuer` fail.
        pub fn failing_registration_for(mut self, issuer: &str) -> Self {
            self.failing_issuers.insert(issuer.to_string());
            self
        }

        /// Sleep inside every registration (simulates slow discovery).
        pub fn with_registration_delay(mut self, delay: Duration) -> Self {
            self.registration_delay = Some(delay);
            self
        }

        /// Reject tokens whose `iss` is not an active provider.
        pub fn enforcing_active_issuer(mut self) -> Self {
            self.enforce_active_issuer = true;
            self
        }

        /// All registrations received so far, in order.
        pub fn registrations(&self) -> Vec<ProviderRegistration> {
            self.registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn authenticate_calls(&self) -> usize {
            self.authenticate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenValidator for MockTokenValidator {
        async fn register(
            &self,
            registration: &ProviderRegistration,
        ) -> Result<ProviderHandle, ValidationError> {
            if let Some(delay) = self.registration_delay {
                tokio::time::sleep(delay).await;
            }

            self.registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(registration.clone());

            if self.failing_issuers.contains(&registration.issuer) {
                return Err(ValidationError::Registration(format!(
                    "mock discovery failure for {}",
                    registration.issuer
                )));
            }

            Ok(ProviderHandle {
                issuer: registration.issuer.clone(),
                client_ids: registration.client_ids.clone(),
                jwks_uri: None,
            })
        }

        async fn authenticate(
            &self,
            token: &str,
            providers: &[ProviderHandle],
        ) -> Result<VerifiedToken, ValidationError> {
            self.authenticate_calls.fetch_add(1, Ordering::SeqCst);

            let verified = self
                .tokens
                .get(token)
                .cloned()
                .ok_or_else(|| ValidationError::InvalidToken("unknown mock token".to_string()))?;

            if self.enforce_active_issuer {
                let issuer = verified
                    .issuer_claim()
                    .and_then(|c| c.as_str())
                    .unwrap_or_default();
                if !providers.iter().any(|p| p.issuer == issuer) {
                    return Err(ValidationError::UnknownIssuer);
                }
            }

            Ok(verified)
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages_are_generic() {
        let err = ValidationError::InvalidToken("kid not found: abc".to_string());
        assert_eq!(err.to_string(), "The access token is invalid or expired");
        assert_eq!(
            ValidationError::UnknownIssuer.to_string(),
            "The access token is invalid or expired"
        );
    }

    #[test]
    fn test_validation_error_kind_labels() {
        assert_eq!(
            ValidationError::Registration(String::new()).kind(),
            "registration"
        );
        assert_eq!(ValidationError::UnknownIssuer.kind(), "unknown_issuer");
    }
}
