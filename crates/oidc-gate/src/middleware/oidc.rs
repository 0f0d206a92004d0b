//! Gate middleware for protected routes.
//!
//! Runs [`OidcGate::process_request`] and either forwards the request, with
//! the session in its extensions, or returns the gate's rejection.

use crate::errors::GateError;
use crate::gate::OidcGate;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Require an OIDC session for the wrapped routes.
///
/// # Response
///
/// - 403 Forbidden for authentication and authorization failures
/// - 503 Service Unavailable when the session store fails
/// - Otherwise continues with `OidcSession` (and optionally `ContextData`)
///   in the request extensions
#[instrument(skip_all, name = "oidc_gate.middleware.require_session")]
pub async fn require_oidc_session(
    State(gate): State<Arc<OidcGate>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GateError> {
    gate.process_request(&mut req).await?;

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::audit::mock::{RecordingAuditSink, RecordingHealthReporter};
    use crate::auth::validator::mock::MockTokenValidator;
    use crate::claims::VerifiedToken;
    use crate::context::{BaseIdentityProvider, OidcSessionExt};
    use crate::gate::{GateCollaborators, GateSettings};
    use crate::policy::{PolicyDefinition, StaticPolicyEngine};
    use crate::registry::ProviderDescriptor;
    use crate::session::InMemorySessionStore;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    async fn gate() -> Arc<OidcGate> {
        let token = VerifiedToken::from_json_claims(
            json!({"iss": "https://idp.example.com", "aud": "client1", "sub": "user-9"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let gate = OidcGate::new(
            GateSettings {
                org_id: "org1".to_string(),
                segregate_by_client: false,
                enable_context_vars: false,
                base_identity_provider: BaseIdentityProvider::Unset,
                default_session_lifetime_seconds: 0,
            },
            GateCollaborators {
                validator: Arc::new(MockTokenValidator::new().with_token("good", token)),
                sessions: Arc::new(InMemorySessionStore::new()),
                policies: Arc::new(StaticPolicyEngine::new([PolicyDefinition {
                    id: "pol-42".to_string(),
                    ..Default::default()
                }])),
                audit: Arc::new(RecordingAuditSink::new()),
                health: Arc::new(RecordingHealthReporter::new()),
            },
        );
        gate.configure(&[ProviderDescriptor {
            issuer: "https://idp.example.com".to_string(),
            client_ids: BTreeMap::from([("Y2xpZW50MQ==".to_string(), "pol-42".to_string())]),
        }])
        .await
        .unwrap();
        Arc::new(gate)
    }

    async fn whoami(req: Request) -> String {
        req.oidc_session()
            .map(|s| s.session_id.to_string())
            .unwrap_or_default()
    }

    fn app(gate: Arc<OidcGate>) -> Router {
        Router::new()
            .route("/api/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(gate, require_oidc_session))
    }

    #[tokio::test]
    async fn test_forwards_with_session() {
        let response = app(gate().await)
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/whoami")
                    .header("authorization", "Bearer good")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8(body.to_vec()).unwrap().starts_with("org1"));
    }

    #[tokio::test]
    async fn test_rejects_with_json_error() {
        let response = app(gate().await)
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/whoami")
                    .header("authorization", "Bearer forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "KEY_NOT_AUTHORISED");
        assert_eq!(json["error"]["message"], "Key not authorised");
    }
}
