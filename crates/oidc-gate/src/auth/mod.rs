//! Token authentication.
//!
//! # Components
//!
//! - `validator` - Validation library seam (`TokenValidator`) and its mock
//! - `authenticator` - Bearer extraction and halt handling

pub mod authenticator;
pub mod validator;

pub use authenticator::{extract_bearer, AuthHalt, TokenAuthenticator};
pub use validator::{ProviderHandle, ProviderRegistration, TokenValidator, ValidationError};
