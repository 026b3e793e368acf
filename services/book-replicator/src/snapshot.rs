//! Point-in-time book copies handed to consumers
//!
//! A `BookSnapshot` owns its ladders, so later deltas cannot change data a
//! caller already holds. Each copy carries a SHA-256 checksum over its
//! levels and update id, letting consumers compare copies cheaply.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::Symbol;
use types::topic::Depth;

use crate::order_book::{OrderBook, PriceLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub depth: Depth,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    pub last_update_id: u64,
    pub sequence: u64,
    /// Exchange timestamp of the last applied message (Unix millis).
    pub timestamp: i64,
    pub checksum: String,
}

impl BookSnapshot {
    pub fn from_book(book: &OrderBook) -> Self {
        let bids = book.bids().levels();
        let asks = book.asks().levels();
        let checksum = compute_checksum(&bids, &asks, book.last_update_id());
        Self {
            symbol: book.symbol.clone(),
            depth: book.depth,
            bids,
            asks,
            last_update_id: book.last_update_id(),
            sequence: book.sequence(),
            timestamp: book.server_timestamp(),
            checksum,
        }
    }

    /// Keep only the best `levels` entries per side.
    pub fn top(mut self, levels: usize) -> Self {
        if self.bids.len() > levels || self.asks.len() > levels {
            self.bids.truncate(levels);
            self.asks.truncate(levels);
            self.checksum = compute_checksum(&self.bids, &self.asks, self.last_update_id);
        }
        self
    }
}

/// SHA-256 over normalized levels and the update id.
///
/// Decimals are normalized first so `100.0` and `100` hash alike.
fn compute_checksum(bids: &[PriceLevel], asks: &[PriceLevel], update_id: u64) -> String {
    let mut hasher = Sha256::new();

    for side in [bids, asks] {
        for level in side {
            hasher.update(level.price.as_decimal().normalize().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(level.size.as_decimal().normalize().to_string().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(b"---");
    }

    hasher.update(update_id.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Verify that a snapshot's checksum matches its content.
pub fn verify_snapshot_integrity(snapshot: &BookSnapshot) -> bool {
    snapshot.checksum == compute_checksum(&snapshot.bids, &snapshot.asks, snapshot.last_update_id)
}
