//! OIDC discovery.
//!
//! Fetches `{issuer}/.well-known/openid-configuration` and checks the
//! document names the same issuer.

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// OIDC discovery document (the fields the gate uses).
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("invalid issuer URL: {0}")]
    InvalidIssuer(String),

    #[error("failed to fetch discovery document: {0}")]
    Fetch(String),

    #[error("invalid discovery document: {0}")]
    InvalidDocument(String),

    #[error("issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch { expected: String, actual: String },
}

/// Validate an issuer URL.
///
/// HTTPS is required except for loopback hosts. Query strings, fragments,
/// userinfo and non-ASCII hostnames are rejected.
pub fn validate_issuer_url(issuer: &str) -> Result<(), DiscoveryError> {
    let url = url::Url::parse(issuer)
        .map_err(|e| DiscoveryError::InvalidIssuer(format!("unparseable: {e}")))?;

    let is_loopback = matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    );
    if url.scheme() != "https" && !(url.scheme() == "http" && is_loopback) {
        return Err(DiscoveryError::InvalidIssuer(
            "issuer must use HTTPS".to_string(),
        ));
    }

    if url.query().is_some() {
        return Err(DiscoveryError::InvalidIssuer(
            "issuer URL must not have a query string".to_string(),
        ));
    }

    if url.fragment().is_some() {
        return Err(DiscoveryError::InvalidIssuer(
            "issuer URL must not have a fragment".to_string(),
        ));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(DiscoveryError::InvalidIssuer(
            "issuer URL must not have userinfo".to_string(),
        ));
    }

    if url.host_str().is_some_and(|host| !host.is_ascii()) {
        return Err(DiscoveryError::InvalidIssuer(
            "issuer hostname contains non-ASCII characters".to_string(),
        ));
    }

    Ok(())
}

/// Discovery URL for an issuer.
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// Fetch and check the discovery document of an issuer.
#[instrument(skip(http), name = "oidc_gate.oidc.discovery")]
pub async fn fetch_discovery(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<DiscoveryDocument, DiscoveryError> {
    validate_issuer_url(issuer)?;

    let response = http
        .get(discovery_url(issuer))
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| {
            tracing::error!(target: "oidc_gate.oidc.discovery", issuer = %issuer, error = %e, "Discovery request failed");
            DiscoveryError::Fetch(e.to_string())
        })?;

    if !response.status().is_success() {
        tracing::error!(
            target: "oidc_gate.oidc.discovery",
            issuer = %issuer,
            status = %response.status(),
            "Discovery endpoint returned error"
        );
        return Err(DiscoveryError::Fetch(format!("HTTP {}", response.status())));
    }

    let document: DiscoveryDocument = response.json().await.map_err(|e| {
        tracing::error!(target: "oidc_gate.oidc.discovery", issuer = %issuer, error = %e, "Failed to parse discovery document");
        DiscoveryError::InvalidDocument(e.to_string())
    })?;

    if document.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(DiscoveryError::IssuerMismatch {
            expected: issuer.to_string(),
            actual: document.issuer,
        });
    }

    tracing::debug!(
        target: "oidc_gate.oidc.discovery",
        issuer = %issuer,
        jwks_uri = %document.jwks_uri,
        "Discovery document fetched"
    );

    Ok(document)
}
