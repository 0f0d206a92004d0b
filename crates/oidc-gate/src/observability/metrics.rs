//! Metrics definitions for the OIDC gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `oidc_gate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status` / `outcome`: small fixed sets defined in code
//! - `reason`: bounded by error variants
//! - `endpoint`: known paths, everything else is `/other`
//!
//! Issuers, client ids and subjects are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Gate decisions include up to three collaborator round trips
        .set_buckets_for_metric(
            Matcher::Prefix("oidc_gate_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set gate request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("oidc_gate_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record one provider registration attempt.
///
/// Metric: `oidc_gate_provider_registrations_total`
/// Labels: `status` (registered, failed, invalid)
pub fn record_provider_registration(status: &str) {
    counter!("oidc_gate_provider_registrations_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set the number of active providers after a (re)load.
///
/// Metric: `oidc_gate_active_providers`
pub fn set_active_providers(count: usize) {
    gauge!("oidc_gate_active_providers").set(count as f64);
}

// ============================================================================
// Request Path Metrics
// ============================================================================

/// Record a token validation result.
///
/// Metric: `oidc_gate_token_validations_total`
/// Labels: `status` (success, failure), `reason`
pub fn record_token_validation(status: &str, reason: &str) {
    counter!("oidc_gate_token_validations_total",
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a session materialization outcome.
///
/// Metric: `oidc_gate_sessions_total`
/// Labels: `outcome` (created, reused, policy_error, store_error)
pub fn record_session_outcome(outcome: &str) {
    counter!("oidc_gate_sessions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a key failure (the health signal for rejected credentials).
///
/// Metric: `oidc_gate_key_failures_total`
pub fn record_key_failure() {
    counter!("oidc_gate_key_failures_total").increment(1);
}

/// Record one gate decision.
///
/// Metric: `oidc_gate_requests_total`, `oidc_gate_request_duration_seconds`
/// Labels: `outcome` (allowed, or the rejection reason)
pub fn record_gate_request(outcome: &str, duration: Duration) {
    histogram!("oidc_gate_request_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("oidc_gate_requests_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `oidc_gate_http_requests_total`, `oidc_gate_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("oidc_gate_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("oidc_gate_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/session" => "/api/v1/session",
        p if p.starts_with("/api/") => "/api/other",
        _ => "/other",
    }
}
