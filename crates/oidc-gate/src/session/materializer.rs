//! Session materialization.
//!
//! Derives the session identifier for a resolved identity and either reuses
//! the session already stored under it or creates one from the resolved
//! policy. An existing session is never re-expanded or overwritten.

use crate::claims::VerifiedToken;
use crate::observability::metrics;
use crate::policy::{PolicyEngine, PolicyError};
use crate::resolver::ResolvedIdentity;
use crate::session::identifier::SessionIdentifier;
use crate::session::state::{SessionState, CLIENT_ID_META_KEY, SESSION_ID_META_KEY};
use crate::session::store::{SessionManager, SessionStoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Whether the session was created by this call or found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Created,
    Reused,
}

impl MaterializeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterializeOutcome::Created => "created",
            MaterializeOutcome::Reused => "reused",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Materialized {
    pub session_id: SessionIdentifier,
    pub state: SessionState,
    pub outcome: MaterializeOutcome,
}

/// Materialization failures. Both carry the identifier for auditing.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("no matching policy")]
    NoMatchingPolicy {
        session_id: SessionIdentifier,
        #[source]
        source: PolicyError,
    },

    #[error("session store failure")]
    Store {
        session_id: SessionIdentifier,
        #[source]
        source: SessionStoreError,
    },
}

impl MaterializeError {
    pub fn session_id(&self) -> &SessionIdentifier {
        match self {
            MaterializeError::NoMatchingPolicy { session_id, .. }
            | MaterializeError::Store { session_id, .. } => session_id,
        }
    }
}

/// Creates or reuses sessions for resolved identities.
pub struct SessionMaterializer {
    sessions: Arc<dyn SessionManager>,
    policies: Arc<dyn PolicyEngine>,
    segregate_by_client: bool,
    default_lifetime_seconds: u64,
}

impl SessionMaterializer {
    pub fn new(
        sessions: Arc<dyn SessionManager>,
        policies: Arc<dyn PolicyEngine>,
        segregate_by_client: bool,
        default_lifetime_seconds: u64,
    ) -> Self {
        Self {
            sessions,
            policies,
            segregate_by_client,
            default_lifetime_seconds,
        }
    }

    /// Identifier the session for this identity is stored under.
    pub fn session_id_for(
        &self,
        org_id: &str,
        identity: &VerifiedToken,
        resolved: &ResolvedIdentity,
    ) -> SessionIdentifier {
        let client = self
            .segregate_by_client
            .then_some(resolved.effective_client_id.as_str());
        SessionIdentifier::derive(org_id, identity.subject_id(), client)
    }

    /// Reuse or create the session for a resolved identity.
    ///
    /// # Errors
    ///
    /// - `NoMatchingPolicy` if the policy engine cannot template the policy.
    ///   No session is written.
    /// - `Store` if the session manager fails to read or persist.
    #[instrument(skip_all, name = "oidc_gate.session.materialize", fields(policy_id = %resolved.policy_id))]
    pub async fn materialize(
        &self,
        org_id: &str,
        identity: &VerifiedToken,
        resolved: &ResolvedIdentity,
    ) -> Result<Materialized, MaterializeError> {
        let session_id = self.session_id_for(org_id, identity, resolved);

        let existing = match self.sessions.get(&session_id).await {
            Ok(existing) => existing,
            Err(source) => {
                metrics::record_session_outcome("store_error");
                return Err(MaterializeError::Store { session_id, source });
            }
        };

        if let Some(state) = existing {
            tracing::debug!(target: "oidc_gate.session", "Reusing existing session");
            metrics::record_session_outcome(MaterializeOutcome::Reused.as_str());
            return Ok(Materialized {
                session_id,
                state,
                outcome: MaterializeOutcome::Reused,
            });
        }

        let mut state = match self
            .policies
            .expand(&resolved.policy_id, org_id, true)
            .await
        {
            Ok(state) => state,
            Err(source) => {
                tracing::warn!(
                    target: "oidc_gate.session",
                    policy_id = %resolved.policy_id,
                    error = %source,
                    "Could not create session from policy"
                );
                metrics::record_session_outcome("policy_error");
                return Err(MaterializeError::NoMatchingPolicy { session_id, source });
            }
        };

        state.meta_data.insert(
            SESSION_ID_META_KEY.to_string(),
            serde_json::Value::String(session_id.to_string()),
        );
        state.meta_data.insert(
            CLIENT_ID_META_KEY.to_string(),
            serde_json::Value::String(resolved.effective_client_id.clone()),
        );
        state.alias = format!("{}:{}", resolved.effective_client_id, identity.subject_id());

        let lifetime = state.lifetime(self.default_lifetime_seconds);
        if let Err(source) = self.sessions.upsert(&session_id, &state, lifetime).await {
            metrics::record_session_outcome("store_error");
            return Err(MaterializeError::Store { session_id, source });
        }

        tracing::info!(
            target: "oidc_gate.session",
            client_id = %resolved.effective_client_id,
            lifetime_seconds = lifetime.map(|l| l.as_secs()),
            "Session created"
        );
        metrics::record_session_outcome(MaterializeOutcome::Created.as_str());

        Ok(Materialized {
            session_id,
            state,
            outcome: MaterializeOutcome::Created,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::mock::CountingPolicyEngine;
    use crate::policy::{PolicyDefinition, StaticPolicyEngine};
    use crate::session::identifier::digest_hex;
    use crate::session::store::mock::FailingSessionStore;
    use crate::session::store::InMemorySessionStore;
    use std::collections::BTreeMap;

    fn identity(subject: &str) -> VerifiedToken {
        VerifiedToken::new(subject, BTreeMap::new())
    }

    fn resolved(client: &str, policy: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            issuer: "https://idp.example.com".to_string(),
            effective_client_id: client.to_string(),
            policy_id: policy.to_string(),
        }
    }

    fn engine() -> Arc<CountingPolicyEngine> {
        Arc::new(CountingPolicyEngine::new(StaticPolicyEngine::new([
            PolicyDefinition {
                id: "pol-42".to_string(),
                org_id: "org1".to_string(),
                ..Default::default()
            },
        ])))
    }

    #[tokio::test]
    async fn test_first_call_creates_second_reuses() {
        let store = Arc::new(InMemorySessionStore::new());
        let policies = engine();
        let materializer = SessionMaterializer::new(store.clone(), policies.clone(), false, 3600);

        let first = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap();
        let second = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap();

        assert_eq!(first.outcome, MaterializeOutcome::Created);
        assert_eq!(second.outcome, MaterializeOutcome::Reused);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.state, second.state);
        assert_eq!(policies.expand_calls(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_created_session_metadata_and_alias() {
        let materializer =
            SessionMaterializer::new(Arc::new(InMemorySessionStore::new()), engine(), false, 0);

        let created = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap();

        let expected_id = format!("org1{}", digest_hex("user-9"));
        assert_eq!(created.session_id.as_str(), expected_id);
        assert_eq!(created.state.session_id_claim(), Some(expected_id.as_str()));
        assert_eq!(created.state.client_id(), Some("client1"));
        assert_eq!(created.state.alias, "client1:user-9");
        assert!(created.state.oidc_user);
    }

    #[tokio::test]
    async fn test_segregation_creates_per_client_sessions() {
        let policies = engine();
        let materializer = SessionMaterializer::new(
            Arc::new(InMemorySessionStore::new()),
            policies.clone(),
            true,
            3600,
        );

        let a = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap();
        let b = materializer
            .materialize("org1", &identity("user-9"), &resolved("client2", "pol-42"))
            .await
            .unwrap();

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(b.outcome, MaterializeOutcome::Created);
        assert_eq!(policies.expand_calls(), 2);
    }

    #[tokio::test]
    async fn test_policy_failure_creates_no_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let materializer = SessionMaterializer::new(store.clone(), engine(), false, 3600);

        let err = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, MaterializeError::NoMatchingPolicy { .. }));
        assert_eq!(
            err.session_id().as_str(),
            format!("org1{}", digest_hex("user-9"))
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_surfaced() {
        let store = Arc::new(FailingSessionStore::failing_writes());
        let materializer = SessionMaterializer::new(store.clone(), engine(), false, 3600);

        let err = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap_err();

        assert!(matches!(err, MaterializeError::Store { .. }));
        assert_eq!(store.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_policy_expansion() {
        let policies = engine();
        let materializer = SessionMaterializer::new(
            Arc::new(FailingSessionStore::failing_reads()),
            policies.clone(),
            false,
            3600,
        );

        let err = materializer
            .materialize("org1", &identity("user-9"), &resolved("client1", "pol-42"))
            .await
            .unwrap_err();

        assert!(matches!(err, MaterializeError::Store { .. }));
        assert_eq!(policies.expand_calls(), 0);
    }
}
