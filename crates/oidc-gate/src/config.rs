//! OIDC gate configuration.
//!
//! Configuration is loaded from environment variables. Providers and policies
//! come either from a JSON file (`OIDC_CONFIG_PATH`), which is re-read on
//! reload, or inline from `OIDC_PROVIDERS` / `OIDC_POLICIES`. The Redis URL is
//! redacted in Debug output.

use crate::context::BaseIdentityProvider;
use crate::oidc::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use crate::policy::PolicyDefinition;
use crate::registry::ProviderDescriptor;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default storage lifetime for sessions whose policy sets none.
pub const DEFAULT_SESSION_LIFETIME_SECONDS: u64 = 3600;

/// Default JWKS cache TTL.
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default minimum interval between unknown-`kid` JWKS refetches.
pub const DEFAULT_JWKS_REFETCH_COOLDOWN_SECONDS: u64 = 10;

/// Default timeout for discovery and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default graceful shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Providers and policies, as stored in the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateDocument {
    pub providers: Vec<ProviderDescriptor>,
    pub policies: Vec<PolicyDefinition>,
}

/// Where provider and policy definitions are read from.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSource {
    File(PathBuf),
    Inline(GateDocument),
}

impl ProviderSource {
    /// Load the current document. Files are read on every call.
    pub fn load(&self) -> Result<GateDocument, ConfigError> {
        match self {
            ProviderSource::Inline(document) => Ok(document.clone()),
            ProviderSource::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ConfigError::ProviderFile(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    ConfigError::ProviderFile(format!("invalid JSON in {}: {}", path.display(), e))
                })
            }
        }
    }
}

/// OIDC gate configuration.
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Organisation id, the prefix of every session identifier.
    pub org_id: String,

    pub provider_source: ProviderSource,

    pub segregate_by_client: bool,

    pub enable_context_vars: bool,

    pub base_identity_provider: BaseIdentityProvider,

    /// 0 disables expiry for sessions whose policy sets no lifetime.
    pub session_lifetime_seconds: u64,

    pub jwt_clock_skew_seconds: u64,

    pub jwks_cache_ttl_seconds: u64,

    /// 0 refetches the key set on every unknown `kid`.
    pub jwks_refetch_cooldown_seconds: u64,

    pub http_timeout_seconds: u64,

    /// Redis session store. In-memory store when absent.
    pub redis_url: Option<SecretString>,

    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider_source = match &self.provider_source {
            ProviderSource::File(path) => format!("file:{}", path.display()),
            ProviderSource::Inline(document) => format!(
                "inline({} providers, {} policies)",
                document.providers.len(),
                document.policies.len()
            ),
        };

        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("org_id", &self.org_id)
            .field("provider_source", &provider_source)
            .field("segregate_by_client", &self.segregate_by_client)
            .field("enable_context_vars", &self.enable_context_vars)
            .field("base_identity_provider", &self.base_identity_provider)
            .field("session_lifetime_seconds", &self.session_lifetime_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field(
                "jwks_refetch_cooldown_seconds",
                &self.jwks_refetch_cooldown_seconds,
            )
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid identity provider configuration: {0}")]
    InvalidIdentityProvider(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidProviders(String),

    #[error("Provider file error: {0}")]
    ProviderFile(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let org_id = vars
            .get("GATE_ORG_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GATE_ORG_ID".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let provider_source = match vars.get("OIDC_CONFIG_PATH").filter(|v| !v.is_empty()) {
            Some(path) => ProviderSource::File(PathBuf::from(path)),
            None => ProviderSource::Inline(GateDocument {
                providers: parse_json_list(vars, "OIDC_PROVIDERS")?,
                policies: parse_json_list(vars, "OIDC_POLICIES")?,
            }),
        };

        let segregate_by_client = parse_bool(vars, "OIDC_SEGREGATE_BY_CLIENT")?;
        let enable_context_vars = parse_bool(vars, "OIDC_ENABLE_CONTEXT_VARS")?;

        let base_identity_provider = match vars.get("OIDC_BASE_IDENTITY_PROVIDER") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidIdentityProvider(format!(
                    "OIDC_BASE_IDENTITY_PROVIDER: {}",
                    e
                ))
            })?,
            None => BaseIdentityProvider::Unset,
        };

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let session_lifetime_seconds = parse_seconds(
            vars,
            "SESSION_LIFETIME_SECONDS",
            DEFAULT_SESSION_LIFETIME_SECONDS,
            true,
        )?;
        let jwks_cache_ttl_seconds = parse_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            false,
        )?;
        let jwks_refetch_cooldown_seconds = parse_seconds(
            vars,
            "JWKS_REFETCH_COOLDOWN_SECONDS",
            DEFAULT_JWKS_REFETCH_COOLDOWN_SECONDS,
            true,
        )?;
        let http_timeout_seconds = parse_seconds(
            vars,
            "OIDC_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
            false,
        )?;
        let drain_seconds = parse_seconds(vars, "GATE_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS, true)?;

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        Ok(Config {
            bind_address,
            org_id,
            provider_source,
            segregate_by_client,
            enable_context_vars,
            base_identity_provider,
            session_lifetime_seconds,
            jwt_clock_skew_seconds,
            jwks_cache_ttl_seconds,
            jwks_refetch_cooldown_seconds,
            http_timeout_seconds,
            redis_url,
            drain_seconds,
        })
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "false" | "0" | "no" => Ok(false),
            "true" | "1" | "yes" => Ok(true),
            other => Err(ConfigError::InvalidBool(format!(
                "{} must be true or false, got '{}'",
                name, other
            ))),
        },
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    allow_zero: bool,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 && !allow_zero {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

fn parse_json_list<T: for<'de> Deserialize<'de>>(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Vec<T>, ConfigError> {
    match vars.get(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ConfigError::InvalidProviders(format!("{} is not valid JSON: {}", name, e))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("GATE_ORG_ID".to_string(), "org1".to_string())])
    }

    fn with(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars = base_vars();
        for (k, v) in pairs {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        vars
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.org_id, "org1");
        assert!(!config.segregate_by_client);
        assert!(!config.enable_context_vars);
        assert_eq!(config.base_identity_provider, BaseIdentityProvider::Unset);
        assert_eq!(config.session_lifetime_seconds, 3600);
        assert_eq!(config.jwt_clock_skew_seconds, 300);
        assert_eq!(config.jwks_cache_ttl_seconds, 300);
        assert_eq!(config.jwks_refetch_cooldown_seconds, 10);
        assert_eq!(config.http_timeout_seconds, 10);
        assert_eq!(config.drain_seconds, 30);
        assert!(config.redis_url.is_none());
        assert_eq!(
            config.provider_source,
            ProviderSource::Inline(GateDocument::default())
        );
    }

    #[test]
    fn test_from_vars_missing_org_id() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(name)) if name == "GATE_ORG_ID"));

        let result = Config::from_vars(&HashMap::from([(
            "GATE_ORG_ID".to_string(),
            "  ".to_string(),
        )]));
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_from_vars_flags_and_identity_provider() {
        let config = Config::from_vars(&with(&[
            ("OIDC_SEGREGATE_BY_CLIENT", "true"),
            ("OIDC_ENABLE_CONTEXT_VARS", "1"),
            ("OIDC_BASE_IDENTITY_PROVIDER", "auth_token"),
        ]))
        .unwrap();

        assert!(config.segregate_by_client);
        assert!(config.enable_context_vars);
        assert_eq!(
            config.base_identity_provider,
            BaseIdentityProvider::AuthToken
        );
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        assert!(matches!(
            Config::from_vars(&with(&[("OIDC_SEGREGATE_BY_CLIENT", "maybe")])),
            Err(ConfigError::InvalidBool(_))
        ));
        assert!(matches!(
            Config::from_vars(&with(&[("OIDC_BASE_IDENTITY_PROVIDER", "ldap")])),
            Err(ConfigError::InvalidIdentityProvider(_))
        ));
        assert!(matches!(
            Config::from_vars(&with(&[("JWKS_CACHE_TTL_SECONDS", "0")])),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            Config::from_vars(&with(&[("OIDC_HTTP_TIMEOUT_SECONDS", "-1")])),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_jwks_refetch_cooldown_zero_allowed() {
        let config =
            Config::from_vars(&with(&[("JWKS_REFETCH_COOLDOWN_SECONDS", "0")])).unwrap();
        assert_eq!(config.jwks_refetch_cooldown_seconds, 0);
    }

    #[test]
    fn test_session_lifetime_zero_allowed() {
        let config = Config::from_vars(&with(&[("SESSION_LIFETIME_SECONDS", "0")])).unwrap();
        assert_eq!(config.session_lifetime_seconds, 0);
    }

    #[test]
    fn test_jwt_clock_skew_bounds() {
        let config = Config::from_vars(&with(&[("JWT_CLOCK_SKEW_SECONDS", "600")])).unwrap();
        assert_eq!(config.jwt_clock_skew_seconds, 600);

        assert!(matches!(
            Config::from_vars(&with(&[("JWT_CLOCK_SKEW_SECONDS", "601")])),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));
        assert!(matches!(
            Config::from_vars(&with(&[("JWT_CLOCK_SKEW_SECONDS", "0")])),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));
        assert!(matches!(
            Config::from_vars(&with(&[("JWT_CLOCK_SKEW_SECONDS", "abc")])),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));
    }

    #[test]
    fn test_inline_providers_and_policies() {
        let config = Config::from_vars(&with(&[
            (
                "OIDC_PROVIDERS",
                r#"[{"issuer":"https://idp.example.com","client_ids":{"Y2xpZW50MQ==":"pol-42"}}]"#,
            ),
            ("OIDC_POLICIES", r#"[{"id":"pol-42","org_id":"org1","rate":10}]"#),
        ]))
        .unwrap();

        let document = config.provider_source.load().unwrap();
        assert_eq!(document.providers.len(), 1);
        assert_eq!(
            document
                .providers
                .first()
                .unwrap()
                .client_ids
                .get("Y2xpZW50MQ=="),
            Some(&"pol-42".to_string())
        );
        assert_eq!(document.policies.first().unwrap().rate, 10.0);
    }

    #[test]
    fn test_inline_providers_invalid_json() {
        assert!(matches!(
            Config::from_vars(&with(&[("OIDC_PROVIDERS", "{not json")])),
            Err(ConfigError::InvalidProviders(_))
        ));
    }

    #[test]
    fn test_provider_file_is_reread() {
        let path = std::env::temp_dir().join(format!("oidc-gate-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"providers":[{"issuer":"https://a"}]}"#).unwrap();

        let config = Config::from_vars(&with(&[(
            "OIDC_CONFIG_PATH",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        let first = config.provider_source.load().unwrap();
        assert_eq!(first.providers.first().unwrap().issuer, "https://a");
        assert!(first.policies.is_empty());

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"providers":[{"issuer":"https://b"}],"policies":[]}"#)
            .unwrap();
        drop(file);

        let second = config.provider_source.load().unwrap();
        assert_eq!(second.providers.first().unwrap().issuer, "https://b");

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            config.provider_source.load(),
            Err(ConfigError::ProviderFile(_))
        ));
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let config = Config::from_vars(&with(&[(
            "REDIS_URL",
            "redis://:hunter2@cache:6379",
        )]))
        .unwrap();

        assert_eq!(
            config.redis_url.as_ref().unwrap().expose_secret(),
            "redis://:hunter2@cache:6379"
        );
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
