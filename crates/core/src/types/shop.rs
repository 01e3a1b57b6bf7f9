//! Shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// The input string is empty.
    #[error("shop domain cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("shop domain must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input is not a bare host name.
    #[error("shop domain must be a host name, got '{0}'")]
    InvalidHost(String),
}

/// A shop's primary domain, e.g. `my-store.myshopify.com`.
///
/// Accepts values the way merchants paste them (with a scheme, a trailing
/// slash or mixed case) and normalizes them to a lowercase bare host.
///
/// ## Examples
///
/// ```
/// use visual_search_core::ShopDomain;
///
/// let shop = ShopDomain::parse("https://My-Store.myshopify.com/").unwrap();
/// assert_eq!(shop.as_str(), "my-store.myshopify.com");
///
/// assert!(ShopDomain::parse("").is_err());
/// assert!(ShopDomain::parse("localhost").is_err());
/// assert!(ShopDomain::parse("bad host.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Maximum length of a DNS host name.
    pub const MAX_LENGTH: usize = 253;

    /// Parse a `ShopDomain` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, has no dot, or
    /// contains characters that are not valid in a host name.
    pub fn parse(s: &str) -> Result<Self, ShopDomainError> {
        let trimmed = s.trim();
        let host = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        if host.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        if host.len() > Self::MAX_LENGTH {
            return Err(ShopDomainError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let valid_chars = host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        let has_empty_label = host.split('.').any(str::is_empty);
        if !valid_chars || !host.contains('.') || has_empty_label {
            return Err(ShopDomainError::InvalidHost(s.to_string()));
        }

        Ok(Self(host.to_ascii_lowercase()))
    }

    /// Returns the normalized host name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = ShopDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(shop: ShopDomain) -> Self {
        shop.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_domain() {
        let shop = ShopDomain::parse("store.myshopify.com").unwrap();
        assert_eq!(shop.as_str(), "store.myshopify.com");
    }

    #[test]
    fn test_parse_strips_scheme_and_slash() {
        let shop = ShopDomain::parse("  http://Store.Example.com/ ").unwrap();
        assert_eq!(shop.to_string(), "store.example.com");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ShopDomain::parse("https://"), Err(ShopDomainError::Empty));
    }

    #[test]
    fn test_parse_rejects_paths_and_spaces() {
        assert!(ShopDomain::parse("store.com/collections").is_err());
        assert!(ShopDomain::parse("my store.com").is_err());
        assert!(ShopDomain::parse("store..com").is_err());
    }

    #[test]
    fn test_parse_rejects_too_long() {
        let long = format!("{}.com", "a".repeat(260));
        assert!(matches!(
            ShopDomain::parse(&long),
            Err(ShopDomainError::TooLong { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<ShopDomain, _> = serde_json::from_str("\"shop.example.com\"");
        assert!(ok.is_ok());
        let bad: Result<ShopDomain, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
