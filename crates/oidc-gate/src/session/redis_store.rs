//! Redis-backed session manager.
//!
//! # Key Patterns
//!
//! - `oidc-session:{session_id}` - Session state (JSON)
//!
//! Sessions with a lifetime are written with `SET .. EX`; sessions without
//! one are written with a plain `SET` and live until removed.
//!
//! The multiplexed connection is cheap to clone and safe to use concurrently,
//! so each operation clones it instead of locking.

use crate::session::identifier::SessionIdentifier;
use crate::session::state::SessionState;
use crate::session::store::{SessionManager, SessionStoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Key prefix for stored sessions.
pub const SESSION_KEY_PREFIX: &str = "oidc-session:";

/// Redis key for a session.
pub fn session_key(id: &SessionIdentifier) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

/// Session manager storing JSON session state in Redis.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: MultiplexedConnection,
}

impl RedisSessionStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Unavailable` if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, SessionStoreError> {
        // The URL may embed credentials; never log it
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "oidc_gate.session.redis", error = %e, "Failed to open Redis client");
            SessionStoreError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "oidc_gate.session.redis", error = %e, "Failed to connect to Redis");
                SessionStoreError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl SessionManager for RedisSessionStore {
    #[instrument(skip_all, name = "oidc_gate.session.redis.get")]
    async fn get(&self, id: &SessionIdentifier) -> Result<Option<SessionState>, SessionStoreError> {
        let mut conn = self.connection.clone();
        let key = session_key(id);

        let raw: Option<String> = conn.get(&key).await.map_err(|e| {
            warn!(target: "oidc_gate.session.redis", error = %e, "Failed to read session");
            SessionStoreError::Unavailable(format!("Failed to read session: {e}"))
        })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let state = serde_json::from_str(&raw).map_err(|e| {
            warn!(target: "oidc_gate.session.redis", error = %e, "Stored session is not valid JSON");
            SessionStoreError::Corrupt(e.to_string())
        })?;

        Ok(Some(state))
    }

    #[instrument(skip_all, name = "oidc_gate.session.redis.upsert")]
    async fn upsert(
        &self,
        id: &SessionIdentifier,
        state: &SessionState,
        lifetime: Option<Duration>,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.connection.clone();
        let key = session_key(id);

        let value = serde_json::to_string(state).map_err(|e| {
            error!(target: "oidc_gate.session.redis", error = %e, "Failed to encode session");
            SessionStoreError::Corrupt(e.to_string())
        })?;

        let result: redis::RedisResult<()> = match lifetime {
            Some(lifetime) => conn.set_ex(&key, value, lifetime.as_secs().max(1)).await,
            None => conn.set(&key, value).await,
        };

        result.map_err(|e| {
            warn!(target: "oidc_gate.session.redis", error = %e, "Failed to write session");
            SessionStoreError::Unavailable(format!("Failed to write session: {e}"))
        })?;

        debug!(
            target: "oidc_gate.session.redis",
            ttl_seconds = lifetime.map(|l| l.as_secs()),
            "Session stored"
        );

        Ok(())
    }
}
