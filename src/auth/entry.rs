// src/auth/entry.rs

//! Stored form of a cached credential.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage shape picked by the caller for a given controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheShape {
    /// A bare token string.
    Token,
    /// An arbitrary JSON object of fields (cookies, CSRF token, ...).
    Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    Token(String),
    Fields(Map<String, Value>),
}

impl Credential {
    pub fn shape(&self) -> CacheShape {
        match self {
            Credential::Token(_) => CacheShape::Token,
            Credential::Fields(_) => CacheShape::Fields,
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            Credential::Token(t) => Some(t),
            Credential::Fields(_) => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Credential::Fields(f) => Some(f),
            Credential::Token(_) => None,
        }
    }
}

/// What an auth function returns: the credential and its real lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCredential {
    pub credential: Credential,
    pub expires_in: Duration,
}

impl IssuedCredential {
    pub fn token(token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            credential: Credential::Token(token.into()),
            expires_in,
        }
    }

    pub fn fields(fields: Map<String, Value>, expires_in: Duration) -> Self {
        Self {
            credential: Credential::Fields(fields),
            expires_in,
        }
    }
}

/// On-disk JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
    /// Seconds since the epoch, safety margin already subtracted.
    pub expires_at: f64,
}

impl CacheEntry {
    pub fn new(credential: &Credential, expires_at: f64) -> Self {
        let (token, fields) = match credential {
            Credential::Token(t) => (Some(t.clone()), None),
            Credential::Fields(f) => (None, Some(f.clone())),
        };
        Self {
            token,
            fields,
            expires_at,
        }
    }

    /// Fresh strictly before `expires_at`.
    pub fn is_fresh(&self, now: f64) -> bool {
        now < self.expires_at
    }

    /// The stored credential, if it has the requested shape.
    pub fn credential(&self, shape: CacheShape) -> Option<Credential> {
        match (shape, &self.token, &self.fields) {
            (CacheShape::Token, Some(token), None) => Some(Credential::Token(token.clone())),
            (CacheShape::Fields, None, Some(fields)) => Some(Credential::Fields(fields.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_is_fresh_until_the_expiry_instant() {
        let entry = CacheEntry::new(&Credential::Token("t".into()), 100.0);
        assert!(entry.is_fresh(99.999));
        assert!(!entry.is_fresh(100.0));
        assert!(!entry.is_fresh(150.0));
    }

    #[test]
    fn shape_mismatch_yields_nothing() {
        let entry = CacheEntry::new(&Credential::Token("t".into()), 100.0);
        assert_eq!(
            entry.credential(CacheShape::Token),
            Some(Credential::Token("t".into()))
        );
        assert_eq!(entry.credential(CacheShape::Fields), None);

        let fields = json!({"cookie": "abc", "xsrf": "def"})
            .as_object()
            .cloned()
            .unwrap();
        let entry = CacheEntry::new(&Credential::Fields(fields.clone()), 100.0);
        assert_eq!(
            entry.credential(CacheShape::Fields),
            Some(Credential::Fields(fields))
        );
        assert_eq!(entry.credential(CacheShape::Token), None);
    }
}
