//! Validated stock ticker symbols: exactly four uppercase letters A-Z.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl Into<String>) -> Result<Self, ApiError> {
        let raw = raw.into();
        if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(raw))
        } else {
            Err(ApiError::InvalidSymbol(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ApiError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_four_uppercase_letters() {
        assert!(Symbol::new("AAAA").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(Symbol::new("AAA"), Err(ApiError::InvalidSymbol(_))));
        assert!(matches!(Symbol::new("AAAAA"), Err(ApiError::InvalidSymbol(_))));
    }

    #[test]
    fn rejects_lowercase_or_digits() {
        assert!(Symbol::new("aaaa").is_err());
        assert!(Symbol::new("AA12").is_err());
    }
}
