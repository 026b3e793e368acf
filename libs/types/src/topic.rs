//! Subscription units
//!
//! A topic pairs a symbol with one of the depth levels the exchange
//! publishes. On the wire it is rendered as `orderbook.{depth}.{symbol}`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;
use crate::ids::Symbol;

/// Number of levels per side published for a depth feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Depth {
    L1,
    L50,
    L200,
    L500,
}

impl Depth {
    /// Every supported depth, shallowest first.
    pub const ALL: [Depth; 4] = [Depth::L1, Depth::L50, Depth::L200, Depth::L500];

    pub fn levels(&self) -> u32 {
        match self {
            Depth::L1 => 1,
            Depth::L50 => 50,
            Depth::L200 => 200,
            Depth::L500 => 500,
        }
    }
}

impl TryFrom<u32> for Depth {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Depth::ALL
            .into_iter()
            .find(|depth| depth.levels() == value)
            .ok_or(ValidationError::InvalidDepth(value))
    }
}

impl From<Depth> for u32 {
    fn from(depth: Depth) -> Self {
        depth.levels()
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.levels())
    }
}

/// The (symbol, depth) unit of subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub symbol: Symbol,
    pub depth: Depth,
}

impl Topic {
    pub fn new(symbol: Symbol, depth: Depth) -> Self {
        Self { symbol, depth }
    }

    /// Validate raw caller input into a topic.
    pub fn validate(symbol: &str, depth: u32) -> Result<Self, ValidationError> {
        let depth = Depth::try_from(depth)?;
        let symbol = Symbol::new(symbol)?;
        Ok(Self { symbol, depth })
    }

    /// Parse the wire form `orderbook.{depth}.{symbol}`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidTopic(s.to_string());
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("orderbook"), Some(depth), Some(symbol)) => {
                let depth: u32 = depth.parse().map_err(|_| invalid())?;
                Topic::validate(symbol, depth)
            }
            _ => Err(invalid()),
        }
    }

    /// Serialize as the wire topic string.
    pub fn to_channel_string(&self) -> String {
        format!("orderbook.{}.{}", self.depth, self.symbol)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "orderbook.{}.{}", self.depth, self.symbol)
    }
}
