//! OIDC token validator.
//!
//! # Security Checks
//!
//! 1. Size check - reject tokens > 8KB before parsing
//! 2. Header - `kid` required, symmetric algorithms rejected
//! 3. Provider - the unverified `iss` must name an active provider
//! 4. Key - fetched by `kid` from the provider's JWKS
//! 5. Signature, `exp`, `nbf`, `iss`, and `aud` against the provider's clients
//! 6. `iat` with clock skew tolerance, non-empty `sub`

use crate::auth::validator::{
    ProviderHandle, ProviderRegistration, TokenValidator, ValidationError,
};
use crate::claims::VerifiedToken;
use crate::oidc::discovery::fetch_discovery;
use crate::oidc::jwks::JwksCache;
use crate::oidc::jwt::{peek_issuer, read_header, validate_iat};
use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

type ClaimsMap = serde_json::Map<String, serde_json::Value>;

/// Tunables for [`OidcValidator`].
#[derive(Debug, Clone, Copy)]
pub struct OidcValidatorConfig {
    pub clock_skew: Duration,
    pub jwks_cache_ttl: Duration,
    pub jwks_refetch_cooldown: Duration,
    pub http_timeout: Duration,
}

impl Default for OidcValidatorConfig {
    fn default() -> Self {
        Self {
            clock_skew: crate::oidc::jwt::DEFAULT_CLOCK_SKEW,
            jwks_cache_ttl: crate::oidc::jwks::DEFAULT_CACHE_TTL,
            jwks_refetch_cooldown: crate::oidc::jwks::DEFAULT_REFETCH_COOLDOWN,
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Validation library backed by OIDC discovery and JWKS.
pub struct OidcValidator {
    http_client: reqwest::Client,
    jwks: JwksCache,
    clock_skew: Duration,
}

impl OidcValidator {
    pub fn new(config: OidcValidatorConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "oidc_gate.oidc", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks: JwksCache::new(http_client.clone(), config.jwks_cache_ttl)
                .with_refetch_cooldown(config.jwks_refetch_cooldown),
            http_client,
            clock_skew: config.clock_skew,
        }
    }

    fn invalid(detail: impl Into<String>) -> ValidationError {
        ValidationError::InvalidToken(detail.into())
    }
}

#[async_trait]
impl TokenValidator for OidcValidator {
    #[instrument(skip_all, name = "oidc_gate.oidc.register", fields(issuer = %registration.issuer))]
    async fn register(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<ProviderHandle, ValidationError> {
        let document = fetch_discovery(&self.http_client, &registration.issuer)
            .await
            .map_err(|e| ValidationError::Registration(e.to_string()))?;

        Ok(ProviderHandle {
            issuer: registration.issuer.clone(),
            client_ids: registration.client_ids.clone(),
            jwks_uri: Some(document.jwks_uri),
        })
    }

    #[instrument(skip_all, name = "oidc_gate.oidc.authenticate")]
    async fn authenticate(
        &self,
        token: &str,
        providers: &[ProviderHandle],
    ) -> Result<VerifiedToken, ValidationError> {
        let header = read_header(token).map_err(|e| {
            tracing::debug!(target: "oidc_gate.oidc", error = ?e, "Token header rejected");
            Self::invalid(format!("header: {e:?}"))
        })?;

        let issuer = peek_issuer(token).map_err(|e| {
            tracing::debug!(target: "oidc_gate.oidc", error = ?e, "Token issuer unreadable");
            Self::invalid(format!("issuer: {e:?}"))
        })?;

        let provider = providers
            .iter()
            .find(|p| p.issuer == issuer)
            .ok_or_else(|| {
                tracing::debug!(target: "oidc_gate.oidc", issuer = %issuer, "Token issuer is not an active provider");
                ValidationError::UnknownIssuer
            })?;

        let jwks_uri = provider.jwks_uri.as_deref().ok_or_else(|| {
            ValidationError::Unavailable(format!("no JWKS endpoint for {}", provider.issuer))
        })?;

        let jwk = self
            .jwks
            .get_key(jwks_uri, &header.kid)
            .await
            .map_err(|e| match e {
                crate::oidc::jwks::JwksError::KeyNotFound => Self::invalid("unknown kid"),
                crate::oidc::jwks::JwksError::Unavailable(detail) => {
                    ValidationError::Unavailable(detail)
                }
            })?;

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            tracing::warn!(target: "oidc_gate.oidc", kid = %header.kid, error = %e, "Unusable JWK");
            Self::invalid("unusable JWK")
        })?;

        let mut validation = Validation::new(header.algorithm);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[provider.issuer.as_str()]);
        validation.set_audience(&provider.client_ids);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<ClaimsMap>(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "oidc_gate.oidc", error = %e, "Token verification failed");
                Self::invalid(format!("verification: {e}"))
            })?
            .claims;

        if let Some(iat) = claims.get("iat").and_then(serde_json::Value::as_i64) {
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "oidc_gate.oidc", error = ?e, "Token iat validation failed");
                Self::invalid("iat in the future")
            })?;
        }

        let verified = VerifiedToken::from_json_claims(claims);
        if verified.subject_id().is_empty() {
            tracing::debug!(target: "oidc_gate.oidc", "Token has no usable subject");
            return Err(Self::invalid("missing sub"));
        }

        tracing::debug!(target: "oidc_gate.oidc", issuer = %provider.issuer, "Token validated successfully");
        Ok(verified)
    }
}
