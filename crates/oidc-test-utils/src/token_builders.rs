//! Builder for signed test ID tokens.

use crate::crypto_fixtures::TestKeypair;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Map, Value};

/// Issuer used when none is set.
pub const TEST_ISSUER: &str = "https://idp.example.com";

/// Audience (decoded client id) used when none is set.
pub const TEST_CLIENT_ID: &str = "client1";

/// Builder for test ID token claims.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .issued_by("https://idp.example.com")
///     .for_audiences(&["client-x", "client1"])
///     .for_user("user-9")
///     .sign(&keypair);
/// ```
pub struct TestTokenBuilder {
    iss: Option<String>,
    aud: Option<Value>,
    sub: String,
    exp: i64,
    iat: i64,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_CLIENT_ID)),
            sub: "test-subject".to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            extra: Map::new(),
        }
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    /// Single-string audience.
    pub fn for_audience(mut self, client_id: &str) -> Self {
        self.aud = Some(json!(client_id));
        self
    }

    /// Array audience, order preserved.
    pub fn for_audiences(mut self, client_ids: &[&str]) -> Self {
        self.aud = Some(json!(client_ids));
        self
    }

    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        Value::Object(claims)
    }

    /// Build and sign with EdDSA under the keypair's `kid`.
    pub fn sign(self, keypair: &TestKeypair) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(keypair.kid().to_string());

        encode(&header, &self.build(), &keypair.encoding_key()).expect("Failed to sign token")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::default().build();
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["aud"], TEST_CLIENT_ID);
        assert_eq!(claims["sub"], "test-subject");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_builder_omits_issuer_and_audience() {
        let claims = TestTokenBuilder::new()
            .without_issuer()
            .without_audience()
            .build();
        assert!(claims.get("iss").is_none());
        assert!(claims.get("aud").is_none());
    }

    #[test]
    fn test_builder_array_audience_and_extra_claims() {
        let claims = TestTokenBuilder::new()
            .for_audiences(&["a", "b"])
            .with_claim("email", json!("u@example.com"))
            .build();
        assert_eq!(claims["aud"], json!(["a", "b"]));
        assert_eq!(claims["email"], "u@example.com");
    }

    #[test]
    fn test_sign_sets_kid() {
        let keypair = TestKeypair::new(1, "key-01");
        let token = TestTokenBuilder::new().sign(&keypair);

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some("key-01"));
    }
}
