//! Book side

use serde::{Deserialize, Serialize};

/// Side of an order book ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy interest, best (highest) price first
    Bid,
    /// Sell interest, best (lowest) price first
    Ask,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str() {
        assert_eq!(Side::Bid.as_str(), "bid");
        assert_eq!(Side::Ask.as_str(), "ask");
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&Side::Bid).unwrap(), "\"bid\"");
    }
}
