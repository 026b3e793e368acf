//! Error types for the replication engine
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Rejections raised synchronously at the subscribe/unsubscribe boundary.
///
/// A validation error never reaches the connection layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid depth: {0} (expected one of 1, 50, 200, 500)")]
    InvalidDepth(u32),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid topic: {0:?}")]
    InvalidTopic(String),

    #[error("Consumer id must not be empty")]
    EmptyConsumerId,
}

/// Anomalies in data received from the exchange.
///
/// The offending message is dropped and logged; the book it targets is
/// left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Invalid price: {0:?}")]
    InvalidPrice(String),

    #[error("Invalid size: {0:?}")]
    InvalidSize(String),

    #[error("Negative size {size} at price {price}")]
    NegativeSize { price: String, size: String },

    #[error("Delta received before snapshot for {topic}")]
    DeltaBeforeSnapshot { topic: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_depth_display() {
        let err = ValidationError::InvalidDepth(25);
        assert_eq!(
            err.to_string(),
            "Invalid depth: 25 (expected one of 1, 50, 200, 500)"
        );
    }

    #[test]
    fn test_negative_size_display() {
        let err = ProtocolError::NegativeSize {
            price: "100.5".to_string(),
            size: "-1".to_string(),
        };
        assert!(err.to_string().contains("100.5"));
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_delta_before_snapshot_display() {
        let err = ProtocolError::DeltaBeforeSnapshot {
            topic: "orderbook.50.BTCUSDT".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Delta received before snapshot for orderbook.50.BTCUSDT"
        );
    }
}
