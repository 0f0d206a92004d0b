//! OIDC Gate
//!
//! Serves `/api/` behind the OIDC gate. SIGHUP reloads the provider
//! configuration; SIGINT/SIGTERM shut down gracefully.

use oidc_gate::audit::{MetricsHealthReporter, TracingAuditSink};
use oidc_gate::config::{Config, ProviderSource};
use oidc_gate::gate::{GateCollaborators, GateSettings, OidcGate};
use oidc_gate::observability::metrics::init_metrics_recorder;
use oidc_gate::oidc::{OidcValidator, OidcValidatorConfig};
use oidc_gate::policy::StaticPolicyEngine;
use oidc_gate::routes::{self, AppState};
use oidc_gate::session::{InMemorySessionStore, RedisSessionStore, SessionManager};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_gate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OIDC gate");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        org_id = %config.org_id,
        segregate_by_client = config.segregate_by_client,
        enable_context_vars = config.enable_context_vars,
        base_identity_provider = %config.base_identity_provider,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let document = config.provider_source.load().map_err(|e| {
        error!("Failed to load provider configuration: {}", e);
        e
    })?;

    let sessions: Arc<dyn SessionManager> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis session store...");
            Arc::new(RedisSessionStore::connect(url.expose_secret()).await?)
        }
        None => {
            warn!("REDIS_URL not set, sessions are kept in memory");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let policies = StaticPolicyEngine::new(document.policies);
    info!(policies = policies.len(), "Policies loaded");

    let validator = OidcValidator::new(OidcValidatorConfig {
        clock_skew: Duration::from_secs(config.jwt_clock_skew_seconds),
        jwks_cache_ttl: Duration::from_secs(config.jwks_cache_ttl_seconds),
        jwks_refetch_cooldown: Duration::from_secs(config.jwks_refetch_cooldown_seconds),
        http_timeout: Duration::from_secs(config.http_timeout_seconds),
    });

    let gate = Arc::new(OidcGate::new(
        GateSettings {
            org_id: config.org_id.clone(),
            segregate_by_client: config.segregate_by_client,
            enable_context_vars: config.enable_context_vars,
            base_identity_provider: config.base_identity_provider,
            default_session_lifetime_seconds: config.session_lifetime_seconds,
        },
        GateCollaborators {
            validator: Arc::new(validator),
            sessions,
            policies: Arc::new(policies),
            audit: Arc::new(TracingAuditSink),
            health: Arc::new(MetricsHealthReporter),
        },
    ));

    // Registration failures are logged by the registry; the service still
    // starts and reports not-ready until a reload succeeds.
    if let Err(e) = gate.configure(&document.providers).await {
        warn!("Initial provider configuration failed: {}", e);
    }

    let reload_task = tokio::spawn(reload_on_hangup(
        gate.clone(),
        config.provider_source.clone(),
    ));

    let app = routes::build_routes(Arc::new(AppState { gate }), metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("OIDC gate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.drain_seconds))
    .await?;

    reload_task.abort();
    info!("OIDC gate shutdown complete");

    Ok(())
}

/// Re-read the provider configuration on every SIGHUP.
///
/// Policies are fixed at startup; only providers and client maps reload.
#[cfg(unix)]
async fn reload_on_hangup(gate: Arc<OidcGate>, source: ProviderSource) {
    let mut hangups = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to listen for SIGHUP: {}", e);
            return;
        }
    };

    while hangups.recv().await.is_some() {
        info!("Received SIGHUP, reloading provider configuration...");

        let document = match source.load() {
            Ok(document) => document,
            Err(e) => {
                error!("Reload aborted, keeping current providers: {}", e);
                continue;
            }
        };

        match gate.configure(&document.providers).await {
            Ok(handles) => info!(active_providers = handles.len(), "Provider configuration reloaded"),
            Err(e) => warn!("Provider reload failed: {}", e),
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_gate: Arc<OidcGate>, _source: ProviderSource) {}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATE_DRAIN_SECONDS=0)");
    }
}
