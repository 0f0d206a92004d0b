//! OIDC gate error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are generic; the underlying cause is logged where the
//! failure is detected.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Client-facing message for every authentication/authorization failure.
pub const KEY_NOT_AUTHORISED: &str = "Key not authorised";

/// Client-facing message when a policy could not be applied.
pub const NO_MATCHING_POLICY: &str = "Key not authorised: no matching policy";

/// Gate error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized, NoMatchingPolicy: 403 Forbidden
/// - SessionStore: 503 Service Unavailable
/// - Configuration, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GateError {
    /// Token validation failed or the token could not be mapped to a provider.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The token resolved, but no usable policy could be applied.
    #[error("No matching policy")]
    NoMatchingPolicy,

    /// The session manager could not read or persist the session.
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Provider configuration could not be applied.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal,
}

impl GateError {
    /// Shorthand for the generic authentication failure.
    pub fn not_authorised() -> Self {
        GateError::Unauthorized(KEY_NOT_AUTHORISED.to_string())
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::Unauthorized(_) | GateError::NoMatchingPolicy => 403,
            GateError::SessionStore(_) => 503,
            GateError::Configuration(_) | GateError::Internal => 500,
        }
    }

    /// Bounded label for the `reason` metric dimension.
    pub fn reason_label(&self) -> &'static str {
        match self {
            GateError::Unauthorized(_) => "unauthorized",
            GateError::NoMatchingPolicy => "no_matching_policy",
            GateError::SessionStore(_) => "session_store",
            GateError::Configuration(_) => "configuration",
            GateError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GateError::Unauthorized(reason) => {
                (StatusCode::FORBIDDEN, "KEY_NOT_AUTHORISED", reason.clone())
            }
            GateError::NoMatchingPolicy => (
                StatusCode::FORBIDDEN,
                "NO_MATCHING_POLICY",
                NO_MATCHING_POLICY.to_string(),
            ),
            GateError::SessionStore(reason) => {
                tracing::warn!(target: "oidc_gate.availability", reason = %reason, "Session store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SESSION_STORE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            GateError::Configuration(reason) => {
                tracing::error!(target: "oidc_gate.config", reason = %reason, "Gate misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            GateError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
