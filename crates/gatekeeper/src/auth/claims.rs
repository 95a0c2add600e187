//! JWT claims structure.
//!
//! Claims issued by an OIDC provider vary per tenant and per provider, so
//! they are kept as a name → [`ClaimValue`] map rather than a fixed struct.
//! Claim values are omitted from Debug output to keep them out of logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Subject claim, projected into the `user` context key by default.
pub const CLAIM_USER_KEY: &str = "sub";

/// A single claim value.
///
/// JWT claims are mostly strings, numbers, booleans or arrays of strings
/// (`aud`, `roles`, `groups`). Anything else (objects, mixed arrays, null)
/// is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    String(String),
    Bool(bool),
    Number(serde_json::Number),
    StringArray(Vec<String>),
    Other(Value),
}

impl ClaimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClaimValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClaimValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            ClaimValue::StringArray(values) => Some(values),
            _ => None,
        }
    }

    /// Convert back into a plain JSON value (for response bodies).
    pub fn to_json(&self) -> Value {
        match self {
            ClaimValue::String(s) => Value::String(s.clone()),
            ClaimValue::Bool(b) => Value::Bool(*b),
            ClaimValue::Number(n) => Value::Number(n.clone()),
            ClaimValue::StringArray(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
            ClaimValue::Other(v) => v.clone(),
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<Value> for ClaimValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ClaimValue::String(s),
            Value::Bool(b) => ClaimValue::Bool(b),
            Value::Number(n) => ClaimValue::Number(n),
            Value::Array(items) if items.iter().all(Value::is_string) => ClaimValue::StringArray(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => ClaimValue::Other(other),
        }
    }
}

/// Claims of a token, keyed by claim name.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(BTreeMap<String, ClaimValue>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `sub` claim, if it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.get(CLAIM_USER_KEY).and_then(ClaimValue::as_str)
    }

    /// The `iss` claim, if it is a string.
    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(ClaimValue::as_str)
    }

    /// The `aud` claim as a list; a single-string audience yields one entry.
    pub fn audiences(&self) -> Vec<&str> {
        match self.get("aud") {
            Some(ClaimValue::String(aud)) => vec![aud.as_str()],
            Some(ClaimValue::StringArray(auds)) => auds.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The `iat` claim, if present and integral.
    pub fn issued_at(&self) -> Option<i64> {
        self.get("iat").and_then(ClaimValue::as_i64)
    }
}

impl FromIterator<(String, ClaimValue)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, ClaimValue)>>(iter: I) -> Self {
        Claims(iter.into_iter().collect())
    }
}

/// Only claim names are printed; values may carry personal data.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of a successful signature + claim validation.
///
/// Owned by the request that presented the token; never shared across
/// requests.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    kid: String,
    claims: Claims,
}

impl VerifiedToken {
    pub fn new(kid: String, claims: Claims) -> Self {
        Self { kid, claims }
    }

    /// Key ID of the JWKS entry that verified the signature.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }
}
