//! Current session handler.
//!
//! Reads the session the gate published for this request and returns a
//! summary. Subject-derived values (alias, claim values) are not echoed.

use crate::context::{ContextData, OidcSession};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/v1/session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub org_id: String,
    pub apply_policies: Vec<String>,
    /// Unix seconds; 0 means the session never expires.
    pub expires: i64,
    pub tags: Vec<String>,
    pub oidc_user: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Keys published into the request context, if claim publishing is on.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_keys: Vec<String>,
}

impl SessionSummary {
    pub fn new(session: &OidcSession, context: Option<&ContextData>) -> Self {
        Self {
            session_id: session.session_id.to_string(),
            org_id: session.state.org_id.clone(),
            apply_policies: session.state.apply_policies.clone(),
            expires: session.state.expires,
            tags: session.state.tags.clone(),
            oidc_user: session.state.oidc_user,
            client_id: session.state.client_id().map(str::to_string),
            context_keys: context
                .map(|data| data.0.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Handler for GET /api/v1/session
///
/// Returns 204 when the gate authorized the request but another stage owns
/// the primary identity.
#[instrument(skip_all, name = "oidc_gate.handlers.session")]
pub async fn get_session(
    session: Option<Extension<OidcSession>>,
    context: Option<Extension<ContextData>>,
) -> Response {
    let Some(Extension(session)) = session else {
        tracing::debug!(target: "oidc_gate.handlers.session", "No OIDC session published");
        return StatusCode::NO_CONTENT.into_response();
    };

    let context = context.map(|Extension(data)| data);
    Json(SessionSummary::new(&session, context.as_ref())).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::{SessionIdentifier, SessionState};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn session() -> OidcSession {
        let mut state = SessionState {
            org_id: "org1".to_string(),
            apply_policies: vec!["pol-42".to_string()],
            alias: "user-9".to_string(),
            oidc_user: true,
            ..Default::default()
        };
        state
            .meta_data
            .insert("client_id".to_string(), json!("client1"));
        OidcSession {
            session_id: SessionIdentifier::derive("org1", "user-9", None),
            state,
        }
    }

    #[test]
    fn test_summary_omits_alias() {
        let summary = SessionSummary::new(&session(), None);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["client_id"], "client1");
        assert_eq!(json["apply_policies"], json!(["pol-42"]));
        assert!(json.get("alias").is_none());
        assert!(json.get("context_keys").is_none());
        assert!(!json.to_string().contains("user-9"));
    }

    #[test]
    fn test_summary_lists_context_keys_only() {
        let data = ContextData(BTreeMap::from([(
            "jwt_claims_email".to_string(),
            json!("u@example.com"),
        )]));
        let summary = SessionSummary::new(&session(), Some(&data));

        assert_eq!(summary.context_keys, vec!["jwt_claims_email".to_string()]);
        assert!(!serde_json::to_string(&summary)
            .unwrap()
            .contains("u@example.com"));
    }

    #[tokio::test]
    async fn test_missing_session_is_no_content() {
        let response = get_session(None, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
