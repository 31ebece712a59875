//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers Harvest deals with.
//! Each type ensures type safety and normalizes its input on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscriber key newtype wrapper
///
/// The unit of work for an extraction: an email address, trimmed and
/// lowercased so that `" Alice@Example.com"` and `"alice@example.com"`
/// are the same key.
///
/// # Examples
///
/// ```
/// use harvest::domain::ids::SubscriberKey;
/// use std::str::FromStr;
///
/// let key = SubscriberKey::from_str("  Alice@Example.COM ").unwrap();
/// assert_eq!(key.as_str(), "alice@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriberKey(String);

impl SubscriberKey {
    /// Creates a new SubscriberKey, normalizing whitespace and case
    ///
    /// # Returns
    ///
    /// Returns `Ok(SubscriberKey)` if the key is non-empty after trimming,
    /// `Err` otherwise
    pub fn new(key: impl AsRef<str>) -> Result<Self, String> {
        let normalized = key.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err("Subscriber key cannot be empty".to_string());
        }
        Ok(Self(normalized))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SubscriberKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubscriberKey> for String {
    fn from(key: SubscriberKey) -> Self {
        key.0
    }
}

impl AsRef<str> for SubscriberKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remote subscriber identifier
///
/// The identity the messaging platform assigned to a subscriber. The API
/// returns it either as a string or as a number; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(String);

impl RemoteId {
    /// Creates a new RemoteId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Remote ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Builds a RemoteId from a JSON value (string or integer)
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::new(s.clone()).ok(),
            serde_json::Value::Number(n) => Self::new(n.to_string()).ok(),
            _ => None,
        }
    }

    /// Returns the remote ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
