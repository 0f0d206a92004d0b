//! OIDC-backed validation library.
//!
//! # Components
//!
//! - `discovery` - Discovery document fetch and issuer URL checks
//! - `jwks` - TTL-cached JSON Web Key Sets
//! - `jwt` - Unverified header/issuer inspection and `iat` checks
//! - `validator` - `TokenValidator` implementation

pub mod discovery;
pub mod jwks;
pub mod jwt;
pub mod validator;

pub use validator::{OidcValidator, OidcValidatorConfig};
