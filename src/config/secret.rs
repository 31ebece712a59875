//! Secure credential handling using the secrecy crate
//!
//! The API token is held in a `Secret` so it is zeroed on drop, redacted in
//! `Debug` output, and only readable through `expose_secret()`.
//!
//! ```rust
//! use harvest::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let token = secret_string("my-token".to_string());
//! assert_eq!(token.expose_secret().as_ref(), "my-token");
//! assert!(!format!("{token:?}").contains("my-token"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Check if the secret value is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// A string that must not leak into logs
pub type SecretString = Secret<SecretValue>;

/// Wrap a String as a SecretString
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sensitive-token".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive-token"));
    }

    #[test]
    fn test_whitespace_only_secret_is_empty() {
        assert!(secret_string("  ".to_string()).expose_secret().is_empty());
        assert!(!secret_string("t".to_string()).expose_secret().is_empty());
    }

    #[test]
    fn test_secret_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Section {
            api_token: SecretString,
        }

        let section: Section = toml::from_str("api_token = \"abc\"").unwrap();
        assert_eq!(section.api_token.expose_secret().as_ref(), "abc");
    }
}
