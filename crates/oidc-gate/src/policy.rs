//! Policy engine seam and the configuration-backed engine.

use crate::session::state::{AccessDefinition, SessionState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A named access template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefinition {
    pub id: String,

    /// Owning organisation. Empty means the policy is usable by any org.
    pub org_id: String,

    pub access_rights: BTreeMap<String, AccessDefinition>,
    pub rate: f64,
    pub per: f64,
    pub quota_max: i64,
    pub quota_renewal_rate: i64,
    pub tags: Vec<String>,
    pub is_inactive: bool,

    /// Seconds until a session created from this policy expires. 0 = never.
    pub key_expires_in: i64,

    /// Storage lifetime of sessions created from this policy. 0 = gate default.
    pub session_lifetime: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy not found: {0}")]
    NotFound(String),

    #[error("policy {policy_id} does not belong to org {org_id}")]
    OrgMismatch { policy_id: String, org_id: String },

    #[error("policy is inactive: {0}")]
    Inactive(String),

    #[error("policy {0} key expiry is out of range")]
    ExpiryOutOfRange(String),
}

/// External policy engine.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Template a fresh session from a policy.
    async fn expand(
        &self,
        policy_id: &str,
        org_id: &str,
        is_oidc: bool,
    ) -> Result<SessionState, PolicyError>;
}

/// Policy engine over a fixed set of definitions.
#[derive(Debug, Default, Clone)]
pub struct StaticPolicyEngine {
    policies: HashMap<String, PolicyDefinition>,
}

impl StaticPolicyEngine {
    /// Build from definitions. A later duplicate id replaces an earlier one.
    pub fn new(policies: impl IntoIterator<Item = PolicyDefinition>) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[async_trait]
impl PolicyEngine for StaticPolicyEngine {
    async fn expand(
        &self,
        policy_id: &str,
        org_id: &str,
        is_oidc: bool,
    ) -> Result<SessionState, PolicyError> {
        let policy = self
            .policies
            .get(policy_id)
            .ok_or_else(|| PolicyError::NotFound(policy_id.to_string()))?;

        if !policy.org_id.is_empty() && policy.org_id != org_id {
            return Err(PolicyError::OrgMismatch {
                policy_id: policy_id.to_string(),
                org_id: org_id.to_string(),
            });
        }

        if policy.is_inactive {
            return Err(PolicyError::Inactive(policy_id.to_string()));
        }

        let expires = if policy.key_expires_in > 0 {
            chrono::Utc::now()
                .timestamp()
                .checked_add(policy.key_expires_in)
                .ok_or_else(|| PolicyError::ExpiryOutOfRange(policy_id.to_string()))?
        } else {
            0
        };

        Ok(SessionState {
            org_id: org_id.to_string(),
            apply_policies: vec![policy.id.clone()],
            access_rights: policy.access_rights.clone(),
            rate: policy.rate,
            per: policy.per,
            quota_max: policy.quota_max,
            quota_renewal_rate: policy.quota_renewal_rate,
            expires,
            tags: policy.tags.clone(),
            is_inactive: false,
            session_lifetime: policy.session_lifetime,
            oidc_user: is_oidc,
            ..Default::default()
        })
    }
}

/// Call-counting policy engine for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a `StaticPolicyEngine` and counts `expand` calls.
    #[derive(Default)]
    pub struct CountingPolicyEngine {
        inner: StaticPolicyEngine,
        calls: AtomicUsize,
    }

    impl CountingPolicyEngine {
        pub fn new(inner: StaticPolicyEngine) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn expand_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PolicyEngine for CountingPolicyEngine {
        async fn expand(
            &self,
            policy_id: &str,
            org_id: &str,
            is_oidc: bool,
        ) -> Result<SessionState, PolicyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.expand(policy_id, org_id, is_oidc).await
        }
    }
}
