//! Session state materialized from a policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Metadata key carrying the session identifier.
pub const SESSION_ID_META_KEY: &str = "session_id_claim";

/// Metadata key carrying the effective client id.
pub const CLIENT_ID_META_KEY: &str = "client_id";

/// Access granted to one API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDefinition {
    pub api_name: String,
    pub api_id: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// A gateway session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub org_id: String,

    /// Policies this session was templated from.
    pub apply_policies: Vec<String>,

    /// API id → access definition.
    pub access_rights: BTreeMap<String, AccessDefinition>,

    pub rate: f64,
    pub per: f64,
    pub quota_max: i64,
    pub quota_renewal_rate: i64,

    /// Unix timestamp after which the key is expired. 0 means never.
    pub expires: i64,

    pub tags: Vec<String>,
    pub is_inactive: bool,

    /// Storage lifetime in seconds. 0 means inherit the gate default.
    pub session_lifetime: u64,

    pub meta_data: BTreeMap<String, serde_json::Value>,
    pub alias: String,

    /// Set when the session was created for an OIDC identity.
    pub oidc_user: bool,
}

impl SessionState {
    /// Storage lifetime for this session, or `None` for no expiry.
    ///
    /// The session's own lifetime takes precedence over `default_seconds`.
    pub fn lifetime(&self, default_seconds: u64) -> Option<Duration> {
        let seconds = if self.session_lifetime > 0 {
            self.session_lifetime
        } else {
            default_seconds
        };
        (seconds > 0).then(|| Duration::from_secs(seconds))
    }

    pub fn session_id_claim(&self) -> Option<&str> {
        self.meta_data
            .get(SESSION_ID_META_KEY)
            .and_then(serde_json::Value::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.meta_data
            .get(CLIENT_ID_META_KEY)
            .and_then(serde_json::Value::as_str)
    }
}
