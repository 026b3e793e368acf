//! Identifier types for replicated markets and their consumers
//!
//! Symbols are normalized to upper case so lookups are insensitive to the
//! casing a caller happens to use. Consumer ids are opaque; generated ids
//! use UUID v7 so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Exchange instrument symbol (e.g., "BTCUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing to upper case.
    ///
    /// Accepts ASCII letters, digits, `-` and `_`.
    pub fn new(symbol: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = symbol.as_ref().trim();
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ValidationError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Opaque identifier of a book consumer
///
/// Two subscriptions with the same consumer id on the same topic count once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Wrap a caller-supplied id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyConsumerId);
        }
        Ok(Self(id))
    }

    /// Generate a fresh time-sortable id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConsumerId> for String {
    fn from(id: ConsumerId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalized_to_upper_case() {
        let symbol = Symbol::new("btcusdt").unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
        assert_eq!(symbol, Symbol::new("BTCUSDT").unwrap());
    }

    #[test]
    fn test_symbol_rejects_invalid() {
        assert_eq!(
            Symbol::new(""),
            Err(ValidationError::InvalidSymbol(String::new()))
        );
        assert!(Symbol::new("BTC/USDT").is_err());
        assert!(Symbol::new("BTC USDT").is_err());
        assert!(Symbol::new("BTC-26DEC25").is_ok());
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("ETHUSDT").unwrap();
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"ETHUSDT\"");

        let deserialized: Symbol = serde_json::from_str("\"ethusdt\"").unwrap();
        assert_eq!(symbol, deserialized);

        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }

    #[test]
    fn test_consumer_id_generation() {
        let id1 = ConsumerId::generate();
        let id2 = ConsumerId::generate();
        assert_ne!(id1, id2, "Generated consumer ids should be unique");
    }

    #[test]
    fn test_consumer_id_rejects_empty() {
        assert_eq!(ConsumerId::new("  "), Err(ValidationError::EmptyConsumerId));
        assert_eq!(ConsumerId::new("desk-1").unwrap().as_str(), "desk-1");
    }
}
