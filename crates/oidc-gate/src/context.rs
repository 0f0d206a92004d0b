//! Request-scoped context published for downstream stages.
//!
//! The resolved session is stored in the request extensions as
//! [`OidcSession`]. When claim publishing is enabled, claims are flattened
//! into [`ContextData`] under `jwt_claims_<name>`, with the session
//! identifier under `token`. Publishing never removes existing entries.

use crate::claims::VerifiedToken;
use crate::session::{SessionIdentifier, SessionState};
use axum::http::Extensions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix for flattened claim keys.
pub const CLAIM_KEY_PREFIX: &str = "jwt_claims_";

/// Context key holding the session identifier.
pub const TOKEN_KEY: &str = "token";

/// Which authentication stage supplies the primary identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseIdentityProvider {
    #[default]
    Unset,
    OidcUser,
    AuthToken,
    HmacKey,
    BasicAuthUser,
    JwtClaim,
    OauthKey,
}

impl BaseIdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseIdentityProvider::Unset => "unset",
            BaseIdentityProvider::OidcUser => "oidc_user",
            BaseIdentityProvider::AuthToken => "auth_token",
            BaseIdentityProvider::HmacKey => "hmac_key",
            BaseIdentityProvider::BasicAuthUser => "basic_auth_user",
            BaseIdentityProvider::JwtClaim => "jwt_claim",
            BaseIdentityProvider::OauthKey => "oauth_key",
        }
    }

    /// Whether the OIDC gate is the authoritative identity source.
    pub fn designates_oidc(&self) -> bool {
        matches!(
            self,
            BaseIdentityProvider::Unset | BaseIdentityProvider::OidcUser
        )
    }
}

impl fmt::Display for BaseIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseIdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "unset" => Ok(BaseIdentityProvider::Unset),
            "oidc_user" => Ok(BaseIdentityProvider::OidcUser),
            "auth_token" => Ok(BaseIdentityProvider::AuthToken),
            "hmac_key" => Ok(BaseIdentityProvider::HmacKey),
            "basic_auth_user" => Ok(BaseIdentityProvider::BasicAuthUser),
            "jwt_claim" => Ok(BaseIdentityProvider::JwtClaim),
            "oauth_key" => Ok(BaseIdentityProvider::OauthKey),
            other => Err(format!("unknown identity provider '{other}'")),
        }
    }
}

/// The session resolved for this request.
#[derive(Debug, Clone)]
pub struct OidcSession {
    pub session_id: SessionIdentifier,
    pub state: SessionState,
}

/// Free-form context values shared between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextData(pub BTreeMap<String, serde_json::Value>);

impl ContextData {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }
}

/// Publishes resolved sessions into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct ContextPropagator {
    base_identity_provider: BaseIdentityProvider,
    enable_context_vars: bool,
}

impl ContextPropagator {
    pub fn new(base_identity_provider: BaseIdentityProvider, enable_context_vars: bool) -> Self {
        Self {
            base_identity_provider,
            enable_context_vars,
        }
    }

    /// Publish the session, and claims if enabled.
    ///
    /// Returns whether the session was published as the primary identity.
    pub fn publish(
        &self,
        extensions: &mut Extensions,
        session_id: &SessionIdentifier,
        state: &SessionState,
        token: &VerifiedToken,
    ) -> bool {
        let designated = self.base_identity_provider.designates_oidc();

        if designated {
            extensions.insert(OidcSession {
                session_id: session_id.clone(),
                state: state.clone(),
            });
        } else {
            tracing::debug!(
                target: "oidc_gate.context",
                base_identity_provider = %self.base_identity_provider,
                "Session not published as primary identity"
            );
        }

        if self.enable_context_vars {
            let mut data = extensions.remove::<ContextData>().unwrap_or_default();
            for (name, value) in token.claims() {
                data.insert(format!("{CLAIM_KEY_PREFIX}{name}"), value.to_json());
            }
            data.insert(TOKEN_KEY, serde_json::Value::String(session_id.to_string()));
            extensions.insert(data);
        }

        designated
    }
}

/// Accessors for handlers behind the gate.
pub trait OidcSessionExt {
    /// The session published by the gate, if any.
    fn oidc_session(&self) -> Option<&OidcSession>;

    /// Context data, if any stage published some.
    fn context_data(&self) -> Option<&ContextData>;
}

impl<B> OidcSessionExt for axum::http::Request<B> {
    fn oidc_session(&self) -> Option<&OidcSession> {
        self.extensions().get::<OidcSession>()
    }

    fn context_data(&self) -> Option<&ContextData> {
        self.extensions().get::<ContextData>()
    }
}
