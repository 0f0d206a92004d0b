//! Verified token and claim types.
//!
//! A `VerifiedToken` is what the validation library hands back once a bearer
//! token passed signature and temporal checks. Claim values are heterogeneous
//! in OIDC (`aud` alone may be a string or a list), so they are carried as a
//! tagged `ClaimValue` and resolved by explicit case analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Issuer claim name.
pub const ISSUER_CLAIM: &str = "iss";

/// Audience claim name.
pub const AUDIENCE_CLAIM: &str = "aud";

/// Subject claim name.
pub const SUBJECT_CLAIM: &str = "sub";

/// A single claim value.
///
/// Variant order matters for untagged deserialization: a homogeneous string
/// array becomes `StringArray`, anything not covered by the typed variants
/// (objects, null, mixed arrays) lands in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    StringArray(Vec<String>),
    Other(serde_json::Value),
}

impl ClaimValue {
    /// Returns the string value, if this claim is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert back into a JSON value (for context publishing).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ClaimValue::String(s) => serde_json::Value::String(s.clone()),
            ClaimValue::Number(n) => serde_json::Value::Number(n.clone()),
            ClaimValue::Bool(b) => serde_json::Value::Bool(*b),
            ClaimValue::StringArray(items) => serde_json::Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
            ClaimValue::Other(value) => value.clone(),
        }
    }
}

impl From<serde_json::Value> for ClaimValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => ClaimValue::String(s),
            serde_json::Value::Number(n) => ClaimValue::Number(n),
            serde_json::Value::Bool(b) => ClaimValue::Bool(b),
            serde_json::Value::Array(items)
                if items.iter().all(serde_json::Value::is_string) =>
            {
                ClaimValue::StringArray(
                    items
                        .into_iter()
                        .filter_map(|v| match v {
                            serde_json::Value::String(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => ClaimValue::Other(other),
        }
    }
}

/// The audience claim, resolved to one of its two legal shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Interpret a raw `aud` claim.
    ///
    /// Returns `None` when the claim has neither audience shape. Non-string
    /// entries of a mixed array are skipped.
    pub fn from_claim(value: &ClaimValue) -> Option<Self> {
        match value {
            ClaimValue::String(s) => Some(Audience::Single(s.clone())),
            ClaimValue::StringArray(items) => Some(Audience::Multiple(items.clone())),
            ClaimValue::Other(serde_json::Value::Array(items)) => Some(Audience::Multiple(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Candidate client ids in claim order.
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            Audience::Single(s) => vec![s.as_str()],
            Audience::Multiple(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Identity and claims of a token that passed validation.
///
/// Immutable once produced. The subject is redacted in Debug output.
#[derive(Clone)]
pub struct VerifiedToken {
    subject_id: String,
    claims: BTreeMap<String, ClaimValue>,
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("subject_id", &"[REDACTED]")
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VerifiedToken {
    /// Build a verified token from an explicit subject and claim set.
    pub fn new(subject_id: impl Into<String>, claims: BTreeMap<String, ClaimValue>) -> Self {
        Self {
            subject_id: subject_id.into(),
            claims,
        }
    }

    /// Build a verified token from a decoded JWT payload.
    ///
    /// The subject is taken from `sub`; a missing or non-string `sub` yields
    /// an empty subject, which the validator is expected to have rejected.
    pub fn from_json_claims(payload: serde_json::Map<String, serde_json::Value>) -> Self {
        let claims: BTreeMap<String, ClaimValue> = payload
            .into_iter()
            .map(|(name, value)| (name, ClaimValue::from(value)))
            .collect();

        let subject_id = claims
            .get(SUBJECT_CLAIM)
            .and_then(ClaimValue::as_str)
            .unwrap_or_default()
            .to_string();

        Self { subject_id, claims }
    }

    /// Verified subject identifier.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// All claims, ordered by name.
    pub fn claims(&self) -> &BTreeMap<String, ClaimValue> {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }

    /// The raw `iss` claim, if present.
    pub fn issuer_claim(&self) -> Option<&ClaimValue> {
        self.claims.get(ISSUER_CLAIM)
    }

    /// The raw `aud` claim, if present.
    pub fn audience_claim(&self) -> Option<&ClaimValue> {
        self.claims.get(AUDIENCE_CLAIM)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_claim_value_from_json_variants() {
        assert_eq!(
            ClaimValue::from(json!("a")),
            ClaimValue::String("a".to_string())
        );
        assert!(matches!(ClaimValue::from(json!(42)), ClaimValue::Number(_)));
        assert_eq!(ClaimValue::from(json!(true)), ClaimValue::Bool(true));
        assert_eq!(
            ClaimValue::from(json!(["a", "b"])),
            ClaimValue::StringArray(vec!["a".to_string(), "b".to_string()])
        );
        assert!(matches!(
            ClaimValue::from(json!(["a", 1])),
            ClaimValue::Other(_)
        ));
        assert!(matches!(
            ClaimValue::from(json!({"k": "v"})),
            ClaimValue::Other(_)
        ));
    }

    #[test]
    fn test_claim_value_untagged_deserialization_matches_from() {
        let parsed: ClaimValue = serde_json::from_str(r#"["x","y"]"#).unwrap();
        assert_eq!(parsed, ClaimValue::from(json!(["x", "y"])));

        let parsed: ClaimValue = serde_json::from_str(r#""x""#).unwrap();
        assert_eq!(parsed, ClaimValue::String("x".to_string()));
    }

    #[test]
    fn test_claim_value_to_json_round_trips_shape() {
        let original = json!(["one", "two"]);
        assert_eq!(ClaimValue::from(original.clone()).to_json(), original);

        let nested = json!({"groups": ["admin"]});
        assert_eq!(ClaimValue::from(nested.clone()).to_json(), nested);
    }

    #[test]
    fn test_audience_single() {
        let aud = Audience::from_claim(&ClaimValue::String("client1".to_string())).unwrap();
        assert_eq!(aud, Audience::Single("client1".to_string()));
        assert_eq!(aud.candidates(), vec!["client1"]);
    }

    #[test]
    fn test_audience_multiple_preserves_order() {
        let aud = Audience::from_claim(&ClaimValue::from(json!(["b", "a", "c"]))).unwrap();
        assert_eq!(aud.candidates(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_audience_mixed_array_skips_non_strings() {
        let aud = Audience::from_claim(&ClaimValue::from(json!([1, "client1", null]))).unwrap();
        assert_eq!(aud, Audience::Multiple(vec!["client1".to_string()]));
    }

    #[test]
    fn test_audience_rejects_other_shapes() {
        assert!(Audience::from_claim(&ClaimValue::from(json!(12))).is_none());
        assert!(Audience::from_claim(&ClaimValue::from(json!({"a": 1}))).is_none());
    }

    #[test]
    fn test_verified_token_from_json_claims() {
        let token = VerifiedToken::from_json_claims(payload(json!({
            "sub": "user-9",
            "iss": "https://idp.example.com",
            "aud": "client1"
        })));

        assert_eq!(token.subject_id(), "user-9");
        assert_eq!(
            token.issuer_claim().and_then(ClaimValue::as_str),
            Some("https://idp.example.com")
        );
        assert_eq!(
            token.audience_claim().and_then(ClaimValue::as_str),
            Some("client1")
        );
        assert_eq!(token.claims().len(), 3);
    }

    #[test]
    fn test_verified_token_debug_redacts_subject() {
        let token = VerifiedToken::from_json_claims(payload(json!({"sub": "secret-user"})));
        let debug_str = format!("{:?}", token);

        assert!(!debug_str.contains("secret-user"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
