//! Deterministic session identifiers.
//!
//! ```text
//! token_id   = hex(sha256(subject_id))
//! session_id = org_id ∥ token_id                            (default)
//! session_id = org_id ∥ hex(sha256(client_id)) ∥ token_id   (segregated by client)
//! ```

use ring::digest::{digest, SHA256};
use std::fmt;

/// Lowercase hex SHA-256 of `input`.
pub fn digest_hex(input: &str) -> String {
    hex::encode(digest(&SHA256, input.as_bytes()).as_ref())
}

/// Session identifier derived from org, subject and (optionally) client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentifier(String);

impl SessionIdentifier {
    /// Derive the identifier for a subject.
    ///
    /// `segregate_client` is the effective client id when sessions are
    /// segregated per client, `None` otherwise.
    pub fn derive(org_id: &str, subject_id: &str, segregate_client: Option<&str>) -> Self {
        let token_id = digest_hex(subject_id);
        match segregate_client {
            Some(client_id) => Self(format!("{org_id}{}{token_id}", digest_hex(client_id))),
            None => Self(format!("{org_id}{token_id}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SessionIdentifier> for String {
    fn from(id: SessionIdentifier) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_known_vector() {
        assert_eq!(
            digest_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_derive_without_segregation() {
        let id = SessionIdentifier::derive("org1", "user-9", None);

        assert_eq!(id.as_str(), format!("org1{}", digest_hex("user-9")));
        assert_eq!(id.as_str().len(), "org1".len() + 64);
    }

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(
            SessionIdentifier::derive("org1", "user-9", Some("client1")),
            SessionIdentifier::derive("org1", "user-9", Some("client1"))
        );
    }

    #[test]
    fn test_segregation_separates_clients() {
        let a = SessionIdentifier::derive("org1", "user-9", Some("client1"));
        let b = SessionIdentifier::derive("org1", "user-9", Some("client2"));
        let shared = SessionIdentifier::derive("org1", "user-9", None);

        assert_ne!(a, b);
        assert_ne!(a, shared);
        assert_eq!(
            a.as_str(),
            format!("org1{}{}", digest_hex("client1"), digest_hex("user-9"))
        );
    }

    #[test]
    fn test_org_scoping() {
        assert_ne!(
            SessionIdentifier::derive("org1", "user-9", None),
            SessionIdentifier::derive("org2", "user-9", None)
        );
    }
}
