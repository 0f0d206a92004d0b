//! Login-failure reporting.
//!
//! Every rejected request produces one audit event and one key-failure
//! health sample. Reporting is fire-and-forget: a failing sink is logged and
//! never changes the response the client gets.

use crate::observability::metrics;
use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Identifier reported when the token itself failed validation.
pub const JWT_FAILURE_IDENTIFIER: &str = "[JWT]";

/// Identifier reported before a session identifier could be computed.
pub const NOT_GENERATED_IDENTIFIER: &str = "[NOT GENERATED]";

/// Authentication failure audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFailureEvent {
    /// Best available identifier: a session identifier or a placeholder.
    pub identifier: String,
    pub method: String,
    pub path: String,
    /// Client address from forwarding headers or the connection.
    pub origin: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request attributes captured for auditing.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub origin: Option<String>,
}

impl RequestInfo {
    /// Capture method, path and origin from a request.
    pub fn from_request<B>(req: &axum::http::Request<B>) -> Self {
        let connect_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            origin: request_origin(req.headers()).or(connect_addr),
        }
    }
}

/// Client address from `X-Forwarded-For` (first hop) or `X-Real-IP`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded.or_else(real_ip).map(ToString::to_string)
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for authentication failure events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_auth_failure(&self, event: &AuthFailureEvent) -> Result<(), AuditError>;
}

/// Health signal destination.
pub trait HealthReporter: Send + Sync {
    /// One key (credential) failure occurred.
    fn record_key_failure(&self);
}

/// Writes audit events to the `oidc_gate.audit` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record_auth_failure(&self, event: &AuthFailureEvent) -> Result<(), AuditError> {
        tracing::warn!(
            target: "oidc_gate.audit",
            identifier = %event.identifier,
            method = %event.method,
            path = %event.path,
            origin = event.origin.as_deref().unwrap_or("unknown"),
            timestamp = %event.timestamp.to_rfc3339(),
            "Authentication failed"
        );
        Ok(())
    }
}

/// Reports key failures through the metrics facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHealthReporter;

impl HealthReporter for MetricsHealthReporter {
    fn record_key_failure(&self) {
        metrics::record_key_failure();
    }
}

/// Emits login failures to the audit sink and health reporter.
#[derive(Clone)]
pub struct FailureReporter {
    audit: Arc<dyn AuditSink>,
    health: Arc<dyn HealthReporter>,
}

impl FailureReporter {
    pub fn new(audit: Arc<dyn AuditSink>, health: Arc<dyn HealthReporter>) -> Self {
        Self { audit, health }
    }

    /// Report one login failure.
    pub async fn report_login_failure(&self, identifier: &str, request: &RequestInfo) {
        tracing::warn!(
            target: "oidc_gate.auth",
            identifier = %identifier,
            path = %request.path,
            origin = request.origin.as_deref().unwrap_or("unknown"),
            "Attempted access with invalid key"
        );

        let event = AuthFailureEvent {
            identifier: identifier.to_string(),
            method: request.method.to_string(),
            path: request.path.clone(),
            origin: request.origin.clone(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self.audit.record_auth_failure(&event).await {
            tracing::error!(target: "oidc_gate.audit", error = %e, "Failed to record audit event");
        }

        self.health.record_key_failure();
    }
}

/// Recording sinks for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Keeps every event in memory. Can be made to fail.
    #[derive(Default)]
    pub struct RecordingAuditSink {
        events: Mutex<Vec<AuthFailureEvent>>,
        failing: bool,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink that records the event and then reports failure.
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }

        pub fn events(&self) -> Vec<AuthFailureEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record_auth_failure(&self, event: &AuthFailureEvent) -> Result<(), AuditError> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
            if self.failing {
                return Err(AuditError::Unavailable("mock sink failure".to_string()));
            }
            Ok(())
        }
    }

    /// Counts key failures.
    #[derive(Default)]
    pub struct RecordingHealthReporter {
        key_failures: AtomicUsize,
    }

    impl RecordingHealthReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn key_failures(&self) -> usize {
            self.key_failures.load(Ordering::SeqCst)
        }
    }

    impl HealthReporter for RecordingHealthReporter {
        fn record_key_failure(&self) {
            self.key_failures.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::{RecordingAuditSink, RecordingHealthReporter};
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn request_info() -> RequestInfo {
        RequestInfo {
            method: Method::GET,
            path: "/api/v1/orders".to_string(),
            origin: Some("203.0.113.7".to_string()),
        }
    }

    #[test]
    fn test_request_origin_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());

        assert_eq!(request_origin(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_request_origin_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());

        assert_eq!(request_origin(&headers).as_deref(), Some("10.0.0.2"));
        assert!(request_origin(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_request_info_uses_connect_info_without_headers() {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/v1/orders?x=1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242))));

        let info = RequestInfo::from_request(&req);
        assert_eq!(info.method, Method::POST);
        assert_eq!(info.path, "/api/v1/orders");
        assert_eq!(info.origin.as_deref(), Some("192.0.2.1"));
    }

    #[tokio::test]
    async fn test_report_emits_one_event_and_one_key_failure() {
        let audit = Arc::new(RecordingAuditSink::new());
        let health = Arc::new(RecordingHealthReporter::new());
        let reporter = FailureReporter::new(audit.clone(), health.clone());

        reporter
            .report_login_failure(NOT_GENERATED_IDENTIFIER, &request_info())
            .await;

        let events = audit.events();
        assert_eq!(events.len(), 1);
        let event = events.first().unwrap();
        assert_eq!(event.identifier, "[NOT GENERATED]");
        assert_eq!(event.method, "GET");
        assert_eq!(event.origin.as_deref(), Some("203.0.113.7"));
        assert_eq!(health.key_failures(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_health_report() {
        let audit = Arc::new(RecordingAuditSink::failing());
        let health = Arc::new(RecordingHealthReporter::new());
        let reporter = FailureReporter::new(audit.clone(), health.clone());

        reporter
            .report_login_failure(JWT_FAILURE_IDENTIFIER, &request_info())
            .await;

        assert_eq!(audit.events().len(), 1);
        assert_eq!(health.key_failures(), 1);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let event = AuthFailureEvent {
            identifier: JWT_FAILURE_IDENTIFIER.to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            origin: None,
            timestamp: Utc::now(),
        };
        assert!(TracingAuditSink.record_auth_failure(&event).await.is_ok());
    }
}
