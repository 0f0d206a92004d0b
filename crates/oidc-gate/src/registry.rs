//! Provider registry.
//!
//! Holds the trusted issuers and, per issuer, the client → policy map used by
//! the claims resolver. The registry is the only mutable shared state in the
//! gate.
//!
//! # Concurrency
//!
//! Readers take a cheap `Arc` clone of an immutable [`RegistrySnapshot`]
//! under a read lock that is released before the clone is used. A reload
//! builds the next snapshot off-lock (provider registration performs network
//! I/O) and installs it with a single write-lock swap, so a concurrent reader
//! sees either the whole old table or the whole new one. Reloads are
//! serialized by a separate async mutex.

use crate::auth::validator::{ProviderHandle, ProviderRegistration, TokenValidator};
use crate::observability::metrics;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::instrument;

/// Decoded client id → policy id.
pub type ClientPolicyMap = HashMap<String, String>;

/// One configured identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Issuer identifier, as it appears in the `iss` claim.
    pub issuer: String,

    /// Base64 (standard alphabet) client id → policy id.
    #[serde(default)]
    pub client_ids: BTreeMap<String, String>,
}

/// Per-client configuration problem. Never aborts the provider it belongs to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientConfigError {
    #[error("client id is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("client id is not valid UTF-8 after decoding")]
    InvalidUtf8,
}

/// Errors from a `configure` call.
///
/// The snapshot has already been swapped when these are returned; they tell
/// the caller the resulting provider set is degraded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("none of the {attempted} configured providers could be registered")]
    NoProvidersRegistered { attempted: usize },
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    issuers: HashMap<String, ClientPolicyMap>,
    active: Vec<ProviderHandle>,
}

impl RegistrySnapshot {
    /// Client → policy map for a registered issuer.
    pub fn lookup_issuer(&self, issuer: &str) -> Option<&ClientPolicyMap> {
        self.issuers.get(issuer)
    }

    /// Policy mapped to `(issuer, client_id)`, if any.
    pub fn policy_for(&self, issuer: &str, client_id: &str) -> Option<&str> {
        self.issuers
            .get(issuer)
            .and_then(|clients| clients.get(client_id))
            .map(String::as_str)
    }

    /// Providers currently handed to the validation library.
    pub fn active_providers(&self) -> &[ProviderHandle] {
        &self.active
    }

    pub fn issuer_count(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

/// Registry of trusted identity providers.
pub struct ProviderRegistry {
    validator: Arc<dyn TokenValidator>,
    current: RwLock<Arc<RegistrySnapshot>>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl ProviderRegistry {
    /// Create an empty registry bound to a validation library.
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator,
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot. The lock is held only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shorthand for `snapshot().policy_for(..)`.
    pub fn policy_for(&self, issuer: &str, client_id: &str) -> Option<String> {
        self.snapshot()
            .policy_for(issuer, client_id)
            .map(ToString::to_string)
    }

    pub fn active_providers(&self) -> Vec<ProviderHandle> {
        self.snapshot().active_providers().to_vec()
    }

    /// Register providers and install the resulting table.
    ///
    /// For every provider the validation library accepts, the previous client
    /// map of that issuer is kept and the new entries overwrite it per client
    /// (last write wins). Issuers the library did not accept this time are
    /// dropped, and the active provider list is replaced wholesale.
    ///
    /// Bad client encodings and failed registrations are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoProvidersRegistered` when providers were
    /// configured but none registered. The (empty) table is still installed.
    #[instrument(skip_all, name = "oidc_gate.registry.configure", fields(providers = descriptors.len()))]
    pub async fn configure(
        &self,
        descriptors: &[ProviderDescriptor],
    ) -> Result<Vec<ProviderHandle>, RegistryError> {
        let _reload = self.reload_lock.lock().await;
        let previous = self.snapshot();

        let mut issuers: HashMap<String, ClientPolicyMap> = HashMap::new();
        let mut active: Vec<ProviderHandle> = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if descriptor.issuer.trim().is_empty() {
                tracing::error!(
                    target: "oidc_gate.registry",
                    "Provider configured with an empty issuer, skipping"
                );
                metrics::record_provider_registration("invalid");
                continue;
            }

            let clients = decode_clients(descriptor);
            let registration = ProviderRegistration {
                issuer: descriptor.issuer.clone(),
                client_ids: clients.keys().cloned().collect(),
            };

            let handle = match self.validator.register(&registration).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(
                        target: "oidc_gate.registry",
                        issuer = %descriptor.issuer,
                        error = %e,
                        "Failed to register provider, excluding it from the active set"
                    );
                    metrics::record_provider_registration("failed");
                    continue;
                }
            };

            metrics::record_provider_registration("registered");
            tracing::info!(
                target: "oidc_gate.registry",
                issuer = %descriptor.issuer,
                clients = clients.len(),
                "Provider registered"
            );

            let entry = issuers.entry(descriptor.issuer.clone()).or_insert_with(|| {
                previous
                    .lookup_issuer(&descriptor.issuer)
                    .cloned()
                    .unwrap_or_default()
            });
            entry.extend(clients);

            // A repeated issuer replaces its earlier handle
            active.retain(|h| h.issuer != handle.issuer);
            active.push(handle);
        }

        let next = Arc::new(RegistrySnapshot {
            issuers,
            active: active.clone(),
        });
        let issuer_count = next.issuer_count();

        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = next;
        }

        metrics::set_active_providers(issuer_count);
        tracing::info!(
            target: "oidc_gate.registry",
            active = issuer_count,
            configured = descriptors.len(),
            "Provider registry reloaded"
        );

        if active.is_empty() && !descriptors.is_empty() {
            return Err(RegistryError::NoProvidersRegistered {
                attempted: descriptors.len(),
            });
        }

        Ok(active)
    }
}

/// Decode a provider's client ids, dropping (and logging) the ones that fail.
fn decode_clients(descriptor: &ProviderDescriptor) -> ClientPolicyMap {
    let mut clients = ClientPolicyMap::with_capacity(descriptor.client_ids.len());

    for (encoded, policy_id) in &descriptor.client_ids {
        match decode_client_id(encoded) {
            Ok(client_id) => {
                clients.insert(client_id, policy_id.clone());
            }
            Err(e) => {
                tracing::error!(
                    target: "oidc_gate.registry",
                    issuer = %descriptor.issuer,
                    error = %e,
                    "Invalid client id in provider configuration, skipping client"
                );
            }
        }
    }

    clients
}

/// Decode one base64 (standard alphabet) client id.
pub fn decode_client_id(encoded: &str) -> Result<String, ClientConfigError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ClientConfigError::InvalidEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| ClientConfigError::InvalidUtf8)
}
