//! The OIDC gate.
//!
//! Per request: authenticate the bearer token, resolve its issuer/audience to
//! a policy, create or reuse the session, and publish it to the request
//! context. Every rejection is reported exactly once.
//!
//! ```text
//! TokenAuthenticator -> resolver::resolve -> SessionMaterializer -> ContextPropagator
//!         |                    |                    |
//!       "[JWT]"        "[NOT GENERATED]"     session identifier   (audit identifier)
//! ```

use crate::audit::{
    AuditSink, FailureReporter, HealthReporter, RequestInfo, JWT_FAILURE_IDENTIFIER,
    NOT_GENERATED_IDENTIFIER,
};
use crate::auth::{ProviderHandle, TokenAuthenticator, TokenValidator};
use crate::context::{BaseIdentityProvider, ContextPropagator};
use crate::errors::GateError;
use crate::observability::metrics;
use crate::policy::PolicyEngine;
use crate::registry::{ProviderDescriptor, ProviderRegistry, RegistryError};
use crate::resolver::{self, ResolveError};
use crate::session::{MaterializeError, SessionManager, SessionMaterializer};
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Gate behaviour switches.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Organisation prefix of every session identifier.
    pub org_id: String,
    /// Derive separate sessions per (subject, client) pair.
    pub segregate_by_client: bool,
    /// Flatten claims into `ContextData`.
    pub enable_context_vars: bool,
    pub base_identity_provider: BaseIdentityProvider,
    /// Storage lifetime for sessions whose policy sets none. 0 = no expiry.
    pub default_session_lifetime_seconds: u64,
}

/// External collaborators of the gate.
#[derive(Clone)]
pub struct GateCollaborators {
    pub validator: Arc<dyn TokenValidator>,
    pub sessions: Arc<dyn SessionManager>,
    pub policies: Arc<dyn PolicyEngine>,
    pub audit: Arc<dyn AuditSink>,
    pub health: Arc<dyn HealthReporter>,
}

/// OIDC identity-federation gate.
pub struct OidcGate {
    org_id: String,
    registry: Arc<ProviderRegistry>,
    authenticator: TokenAuthenticator,
    materializer: SessionMaterializer,
    propagator: ContextPropagator,
    reporter: FailureReporter,
}

impl OidcGate {
    pub fn new(settings: GateSettings, collaborators: GateCollaborators) -> Self {
        let registry = Arc::new(ProviderRegistry::new(collaborators.validator.clone()));

        Self {
            authenticator: TokenAuthenticator::new(collaborators.validator, registry.clone()),
            materializer: SessionMaterializer::new(
                collaborators.sessions,
                collaborators.policies,
                settings.segregate_by_client,
                settings.default_session_lifetime_seconds,
            ),
            propagator: ContextPropagator::new(
                settings.base_identity_provider,
                settings.enable_context_vars,
            ),
            reporter: FailureReporter::new(collaborators.audit, collaborators.health),
            org_id: settings.org_id,
            registry,
        }
    }

    /// (Re)load the trusted providers. See [`ProviderRegistry::configure`].
    pub async fn configure(
        &self,
        descriptors: &[ProviderDescriptor],
    ) -> Result<Vec<ProviderHandle>, RegistryError> {
        self.registry.configure(descriptors).await
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Authenticate and authorize one request.
    ///
    /// On success the session is published into the request extensions and
    /// `200 OK` is returned.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` (403) for invalid tokens and unresolvable claims
    /// - `NoMatchingPolicy` (403) when the policy cannot be applied
    /// - `SessionStore` (503) when the session manager fails
    #[instrument(skip_all, name = "oidc_gate.process_request")]
    pub async fn process_request<B>(&self, req: &mut Request<B>) -> Result<StatusCode, GateError> {
        let start = Instant::now();
        let result = self.decide(req).await;

        let outcome = match &result {
            Ok(_) => "allowed",
            Err(e) => e.reason_label(),
        };
        metrics::record_gate_request(outcome, start.elapsed());

        result
    }

    async fn decide<B>(&self, req: &mut Request<B>) -> Result<StatusCode, GateError> {
        let info = RequestInfo::from_request(req);

        let token = match self.authenticator.authenticate(req.headers()).await {
            Ok(token) => token,
            Err(_) => {
                self.reporter
                    .report_login_failure(JWT_FAILURE_IDENTIFIER, &info)
                    .await;
                return Err(GateError::not_authorised());
            }
        };

        let snapshot = self.registry.snapshot();
        let resolved = match resolver::resolve(&snapshot, &token) {
            Ok(resolved) => resolved,
            Err(e) => {
                match e {
                    ResolveError::NoIssuerOrAudience => {
                        tracing::error!(target: "oidc_gate.resolver", "No issuer or audiences found");
                    }
                    ResolveError::NoMatchingPolicy => {
                        tracing::error!(target: "oidc_gate.resolver", "No matching policy found");
                    }
                }
                self.reporter
                    .report_login_failure(NOT_GENERATED_IDENTIFIER, &info)
                    .await;
                return Err(GateError::not_authorised());
            }
        };
        drop(snapshot);

        let materialized = match self
            .materializer
            .materialize(&self.org_id, &token, &resolved)
            .await
        {
            Ok(materialized) => materialized,
            Err(e) => {
                self.reporter
                    .report_login_failure(e.session_id().as_str(), &info)
                    .await;
                return Err(match e {
                    MaterializeError::NoMatchingPolicy { .. } => GateError::NoMatchingPolicy,
                    MaterializeError::Store { source, .. } => {
                        GateError::SessionStore(source.to_string())
                    }
                });
            }
        };

        self.propagator.publish(
            req.extensions_mut(),
            &materialized.session_id,
            &materialized.state,
            &token,
        );

        tracing::debug!(
            target: "oidc_gate.auth",
            outcome = materialized.outcome.as_str(),
            client_id = %resolved.effective_client_id,
            "Request authorized"
        );

        Ok(StatusCode::OK)
    }
}
