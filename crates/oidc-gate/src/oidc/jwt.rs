//! Unverified JWT inspection and claim checks.
//!
//! Tokens are size-checked before any decoding. Everything read here is
//! untrusted until the signature has been verified; the header and issuer
//! are only used to pick the provider and key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Maximum accepted token size in bytes (8KB).
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound on configurable clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// JWT inspection failures. Display strings are intentionally generic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    #[error("The access token is invalid or expired")]
    MalformedToken,

    #[error("The access token is invalid or expired")]
    MissingKid,

    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm(String),

    #[error("The access token is invalid or expired")]
    MissingIssuer,

    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

/// Fields of the JOSE header needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub algorithm: Algorithm,
    pub kid: String,
}

/// Split a compact JWS into its three segments.
fn segments(token: &str) -> Result<(&str, &str, &str), JwtError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "oidc_gate.oidc.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "oidc_gate.oidc.jwt", "Token rejected: invalid JWT format");
            Err(JwtError::MalformedToken)
        }
    }
}

fn decode_segment(segment: &str) -> Result<serde_json::Value, JwtError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "oidc_gate.oidc.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "oidc_gate.oidc.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtError::MalformedToken
    })
}

/// Parse a header algorithm, rejecting symmetric (HMAC) algorithms.
///
/// A shared secret cannot come from a public JWKS, so `HS*` is never valid
/// for federated tokens.
pub fn asymmetric_algorithm(alg: &str) -> Result<Algorithm, JwtError> {
    let algorithm =
        Algorithm::from_str(alg).map_err(|_| JwtError::UnsupportedAlgorithm(alg.to_string()))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(JwtError::UnsupportedAlgorithm(alg.to_string()))
        }
        _ => Ok(algorithm),
    }
}

/// Read `alg` and `kid` from the header without verifying the signature.
pub fn read_header(token: &str) -> Result<TokenHeader, JwtError> {
    let (header, _, _) = segments(token)?;
    let header = decode_segment(header)?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or(JwtError::MalformedToken)?;
    let algorithm = asymmetric_algorithm(alg)?;

    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtError::MissingKid)?;

    Ok(TokenHeader { algorithm, kid })
}

/// Read the unverified `iss` claim, used only to select the provider.
pub fn peek_issuer(token: &str) -> Result<String, JwtError> {
    let (_, payload, _) = segments(token)?;
    let payload = decode_segment(payload)?;

    payload
        .get("iss")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtError::MissingIssuer)
}

/// Reject an `iat` more than `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

/// `validate_iat` against an explicit current time.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtError> {
    let max_iat = now.saturating_add(i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX));

    if iat > max_iat {
        tracing::debug!(
            target: "oidc_gate.oidc.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtError::IatTooFarInFuture);
    }

    Ok(())
}
