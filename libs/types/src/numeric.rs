//! Fixed-point decimal types for prices and sizes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Exchange feeds carry both values as decimal strings; they are parsed once
//! on ingestion and compared numerically, so `"100.0"` and `"100"` denote
//! the same price level.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Strictly positive price of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Parse a price from its wire representation.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Decimal::from_str(raw.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| ProtocolError::InvalidPrice(raw.to_string()))
    }

    /// Wrap a decimal, returning None unless it is strictly positive.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = ProtocolError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| ProtocolError::InvalidPrice(value.to_string()))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

/// Non-negative size resting at a level. Zero marks a deletion in deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Size(Decimal);

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);

    /// Wrap a decimal, returning None if it is negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn from_str(raw: &str) -> Result<Self, ProtocolError> {
        Decimal::from_str(raw.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| ProtocolError::InvalidSize(raw.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Size {
    type Error = ProtocolError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| ProtocolError::InvalidSize(value.to_string()))
    }
}

impl From<Size> for Decimal {
    fn from(size: Size) -> Self {
        size.0
    }
}

/// Parse one `[price, size]` pair from the wire.
///
/// A negative size is reported separately from an unparsable one so the
/// anomaly log says what the exchange actually sent.
pub fn parse_level(price: &str, size: &str) -> Result<(Price, Size), ProtocolError> {
    let price = Price::parse(price)?;
    let raw_size = Decimal::from_str(size.trim())
        .map_err(|_| ProtocolError::InvalidSize(size.to_string()))?;
    let size = Size::try_new(raw_size).ok_or_else(|| ProtocolError::NegativeSize {
        price: price.to_string(),
        size: size.to_string(),
    })?;
    Ok((price, size))
}
