//! Mock OpenID Connect provider.
//!
//! Serves `/.well-known/openid-configuration` and `/jwks` from a wiremock
//! server. The issuer is the server's base URI, so discovery's issuer check
//! passes.

use crate::crypto_fixtures::TestKeypair;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the JWKS document.
pub const JWKS_PATH: &str = "/jwks";

pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    /// Start a provider publishing the given keys.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": format!("{issuer}{JWKS_PATH}"),
                "id_token_signing_alg_values_supported": ["EdDSA", "RS256"]
            })))
            .mount(&server)
            .await;

        let jwks: Vec<serde_json::Value> = keys.iter().map(|k| k.jwk_json()).collect();
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": jwks })))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Start a server whose discovery document names a different issuer.
    pub async fn start_with_mismatched_issuer() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": "https://someone-else.example.com",
                "jwks_uri": format!("{}{JWKS_PATH}", server.uri())
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    /// Requests received so far.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
