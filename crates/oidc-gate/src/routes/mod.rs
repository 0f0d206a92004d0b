//! HTTP routes for the OIDC gate service.
//!
//! Defines the Axum router and application state.

use crate::gate::OidcGate;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_oidc_session};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<OidcGate>,
}

/// Build the application routes.
///
/// - `/health` - Liveness probe, public
/// - `/ready` - Readiness probe (at least one active provider), public
/// - `/metrics` - Prometheus metrics, public
/// - `/api/v1/session` - Current session summary, behind the gate
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    protected_routes(state.gate.clone())
        .merge(public_routes(state))
        .merge(
            Router::new()
                .route("/metrics", get(handlers::metrics_handler))
                .with_state(metrics_handle),
        )
        // Layer order (bottom-to-top execution):
        // 1. TimeoutLayer (innermost)
        // 2. TraceLayer
        // 3. http_metrics_middleware (outermost, sees every response)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

fn public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state)
}

/// Routes that require an OIDC session.
pub fn protected_routes(gate: Arc<OidcGate>) -> Router {
    Router::new()
        .route("/api/v1/session", get(handlers::get_session))
        .route_layer(middleware::from_fn_with_state(gate, require_oidc_session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
