//! Ledger account address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger account address, always `0x`-prefixed and stored lowercase.
///
/// Ledger events report addresses with mixed-case checksums; normalising on
/// construction lets addresses from different sources compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// The prefix carried by every address.
    pub const PREFIX: &'static str = "0x";

    /// Create an address from a raw string.
    ///
    /// # Panics
    /// Panics if the string does not start with `0x`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into().to_ascii_lowercase();
        assert!(s.starts_with(Self::PREFIX), "address must start with 0x");
        Self(s)
    }

    /// Parse an address, returning `None` instead of panicking.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.to_ascii_lowercase();
        if s.starts_with(Self::PREFIX) && s.len() > Self::PREFIX.len() {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that this address is well-formed.
    pub fn is_valid(&self) -> bool {
        self.0.len() > Self::PREFIX.len()
            && self.0[Self::PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_case_addresses_compare_equal() {
        let a = Address::new("0xAbCd01");
        let b = Address::new("0xabcd01");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcd01");
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(Address::parse("abcd").is_none());
        assert!(Address::parse("0x").is_none());
        assert!(Address::parse("0x12").is_some());
    }

    #[test]
    fn is_valid_checks_hex_body() {
        assert!(Address::new("0xdeadbeef").is_valid());
        assert!(!Address::new("0xnothex").is_valid());
    }
}
