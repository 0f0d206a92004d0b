//! # OIDC Test Utilities
//!
//! Shared test utilities for the OIDC gate.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs with JWK rendering
//! - A token builder that signs EdDSA JWTs
//! - A wiremock identity provider serving discovery and JWKS
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "key-01");
//!     let idp = MockIdentityProvider::start(&[&keypair]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .issued_by(&idp.issuer())
//!         .for_audience("client1")
//!         .for_user("user-9")
//!         .sign(&keypair);
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use token_builders::*;
