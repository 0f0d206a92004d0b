//! Health check handlers.
//!
//! - `/health`: Liveness probe, returns OK if the process is running
//! - `/ready`: Readiness probe, requires at least one active provider

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness response body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub active_providers: usize,
}

/// Liveness probe handler. Checks no dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 503 until a configuration load has registered at least one
/// provider; without one every protected request would be rejected.
#[tracing::instrument(skip_all, name = "oidc_gate.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_providers = state.gate.registry().snapshot().active_providers().len();

    if active_providers == 0 {
        tracing::warn!(target: "oidc_gate.health", "Readiness check failed: no active providers");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                active_providers,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            active_providers,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        assert_eq!(health_check().await, "OK");
    }
}
