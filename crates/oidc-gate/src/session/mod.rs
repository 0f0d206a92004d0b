//! Session identity, state and storage.
//!
//! # Components
//!
//! - `identifier` - Deterministic session identifiers
//! - `state` - Session state templated from a policy
//! - `store` - `SessionManager` trait and the in-memory store
//! - `redis_store` - Redis-backed `SessionManager`
//! - `materializer` - Create-or-reuse logic

pub mod identifier;
pub mod materializer;
pub mod redis_store;
pub mod state;
pub mod store;

pub use identifier::SessionIdentifier;
pub use materializer::{MaterializeError, MaterializeOutcome, Materialized, SessionMaterializer};
pub use redis_store::RedisSessionStore;
pub use state::{AccessDefinition, SessionState};
pub use store::{InMemorySessionStore, SessionManager, SessionStoreError};
