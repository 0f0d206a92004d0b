//! Session manager seam and the in-memory store.

use crate::session::identifier::SessionIdentifier;
use crate::session::state::SessionState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored session could not be decoded: {0}")]
    Corrupt(String),
}

/// External session manager.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Fetch a live session.
    async fn get(&self, id: &SessionIdentifier) -> Result<Option<SessionState>, SessionStoreError>;

    /// Insert or replace a session. `lifetime` of `None` keeps it until removed.
    async fn upsert(
        &self,
        id: &SessionIdentifier,
        state: &SessionState,
        lifetime: Option<Duration>,
    ) -> Result<(), SessionStoreError>;
}

struct StoredSession {
    state: SessionState,
    expires_at: Option<Instant>,
}

impl StoredSession {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local session store. Expired entries read as absent.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionManager for InMemorySessionStore {
    async fn get(&self, id: &SessionIdentifier) -> Result<Option<SessionState>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id.as_str())
            .filter(|s| s.is_live(Instant::now()))
            .map(|s| s.state.clone()))
    }

    async fn upsert(
        &self,
        id: &SessionIdentifier,
        state: &SessionState,
        lifetime: Option<Duration>,
    ) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;

        // Drop anything that expired since the last write
        let now = Instant::now();
        sessions.retain(|_, s| s.is_live(now));

        sessions.insert(
            id.as_str().to_string(),
            StoredSession {
                state: state.clone(),
                expires_at: lifetime.and_then(|l| now.checked_add(l)),
            },
        );
        Ok(())
    }
}

/// Failing session manager for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Session manager whose reads and/or writes fail.
    #[derive(Default)]
    pub struct FailingSessionStore {
        fail_get: bool,
        fail_upsert: bool,
        inner: InMemorySessionStore,
        upsert_calls: AtomicUsize,
    }

    impl FailingSessionStore {
        /// Reads fail.
        pub fn failing_reads() -> Self {
            Self {
                fail_get: true,
                ..Default::default()
            }
        }

        /// Reads succeed (always empty), writes fail.
        pub fn failing_writes() -> Self {
            Self {
                fail_upsert: true,
                ..Default::default()
            }
        }

        pub fn upsert_calls(&self) -> usize {
            self.upsert_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionManager for FailingSessionStore {
        async fn get(
            &self,
            id: &SessionIdentifier,
        ) -> Result<Option<SessionState>, SessionStoreError> {
            if self.fail_get {
                return Err(SessionStoreError::Unavailable(
                    "mock read failure".to_string(),
                ));
            }
            self.inner.get(id).await
        }

        async fn upsert(
            &self,
            id: &SessionIdentifier,
            state: &SessionState,
            lifetime: Option<Duration>,
        ) -> Result<(), SessionStoreError> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_upsert {
                return Err(SessionStoreError::Unavailable(
                    "mock write failure".to_string(),
                ));
            }
            self.inner.upsert(id, state, lifetime).await
        }
    }
}
