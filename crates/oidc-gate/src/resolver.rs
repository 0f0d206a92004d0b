//! Claims resolution.
//!
//! Maps a verified token's `iss`/`aud` to a gateway policy through the
//! provider registry.

use crate::claims::{Audience, ClaimValue, VerifiedToken};
use crate::registry::RegistrySnapshot;
use thiserror::Error;
use tracing::instrument;

/// Issuer, client and policy a token resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub issuer: String,
    pub effective_client_id: String,
    pub policy_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Missing issuer and audience, or an issuer the registry does not know.
    #[error("no issuer or audience")]
    NoIssuerOrAudience,

    #[error("no matching policy")]
    NoMatchingPolicy,
}

/// Resolve a verified token against a registry snapshot.
///
/// A single-string audience is looked up directly. For an audience list the
/// first entry present in the issuer's client map wins; later entries are
/// never considered.
#[instrument(skip_all, name = "oidc_gate.resolver.resolve")]
pub fn resolve(
    snapshot: &RegistrySnapshot,
    token: &VerifiedToken,
) -> Result<ResolvedIdentity, ResolveError> {
    let issuer_claim = token.issuer_claim();
    let audience_claim = token.audience_claim();

    if issuer_claim.is_none() && audience_claim.is_none() {
        tracing::debug!(target: "oidc_gate.resolver", "Token carries neither iss nor aud");
        return Err(ResolveError::NoIssuerOrAudience);
    }

    let issuer = issuer_claim
        .and_then(ClaimValue::as_str)
        .ok_or_else(|| {
            tracing::debug!(target: "oidc_gate.resolver", "Token iss missing or not a string");
            ResolveError::NoIssuerOrAudience
        })?;

    let clients = snapshot.lookup_issuer(issuer).ok_or_else(|| {
        tracing::debug!(target: "oidc_gate.resolver", issuer = %issuer, "Issuer not registered");
        ResolveError::NoIssuerOrAudience
    })?;

    let audience = audience_claim.and_then(Audience::from_claim).ok_or_else(|| {
        tracing::debug!(target: "oidc_gate.resolver", issuer = %issuer, "Token aud missing or malformed");
        ResolveError::NoMatchingPolicy
    })?;

    let (client_id, policy_id) = audience
        .candidates()
        .into_iter()
        .find_map(|candidate| {
            clients
                .get(candidate)
                .map(|policy| (candidate.to_string(), policy.clone()))
        })
        .filter(|(_, policy)| !policy.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "oidc_gate.resolver", issuer = %issuer, "No audience matched a registered client");
            ResolveError::NoMatchingPolicy
        })?;

    tracing::debug!(
        target: "oidc_gate.resolver",
        issuer = %issuer,
        client_id = %client_id,
        policy_id = %policy_id,
        "Token resolved to policy"
    );

    Ok(ResolvedIdentity {
        issuer: issuer.to_string(),
        effective_client_id: client_id,
        policy_id,
    })
}
