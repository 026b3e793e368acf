//! In-memory order book state
//!
//! Each side is a `BTreeMap` keyed by `Price`, so ordering and price
//! uniqueness hold structurally after every mutation. Bids iterate in
//! reverse (best bid first), asks in natural order (best ask first).
//! Zero-size levels are never stored.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::numeric::{Price, Size};
use types::side::Side;
use types::topic::{Depth, Topic};

use crate::events::{BookUpdate, LevelUpdate};

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub size: Size,
}

/// One ladder of the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, Size>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Insert, replace or (for size zero) delete the level at `price`.
    ///
    /// Deleting an absent level is a no-op.
    pub fn apply(&mut self, price: Price, size: Size) {
        if size.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    /// Replace the whole ladder.
    pub fn replace(&mut self, levels: &[LevelUpdate]) {
        self.levels.clear();
        for level in levels {
            self.apply(level.price, level.size);
        }
    }

    /// Best level: highest bid or lowest ask.
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        entry.map(|(price, size)| PriceLevel {
            price: *price,
            size: *size,
        })
    }

    pub fn size_at(&self, price: &Price) -> Option<Size> {
        self.levels.get(price).copied()
    }

    /// Levels in best-first order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let to_level = |(price, size): (&Price, &Size)| PriceLevel {
            price: *price,
            size: *size,
        };
        match self.side {
            Side::Bid => Box::new(self.levels.iter().rev().map(to_level)),
            Side::Ask => Box::new(self.levels.iter().map(to_level)),
        }
    }

    pub fn levels(&self) -> Vec<PriceLevel> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Replicated book for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub depth: Depth,
    bids: BookSide,
    asks: BookSide,
    last_update_id: u64,
    sequence: u64,
    /// Exchange timestamp of the last applied message (Unix millis).
    server_timestamp: i64,
}

impl OrderBook {
    /// Build a book from a snapshot payload.
    pub fn from_snapshot(update: &BookUpdate) -> Self {
        let mut book = Self {
            symbol: update.topic.symbol.clone(),
            depth: update.topic.depth,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            last_update_id: 0,
            sequence: 0,
            server_timestamp: 0,
        };
        book.bids.replace(&update.bids);
        book.asks.replace(&update.asks);
        book.stamp(update);
        book
    }

    /// Fold a delta's level changes into the ladders and advance metadata.
    pub fn apply_changes(&mut self, update: &BookUpdate) {
        for level in &update.bids {
            self.bids.apply(level.price, level.size);
        }
        for level in &update.asks {
            self.asks.apply(level.price, level.size);
        }
        self.stamp(update);
    }

    fn stamp(&mut self, update: &BookUpdate) {
        self.last_update_id = update.update_id;
        self.sequence = update.sequence;
        self.server_timestamp = update.timestamp;
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.symbol.clone(), self.depth)
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn server_timestamp(&self) -> i64 {
        self.server_timestamp
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best().map(|level| level.price)
    }

    /// Mid-market price, if both sides are populated.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some((bid.as_decimal() + ask.as_decimal()) / Decimal::from(2))
            }
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.as_decimal() - bid.as_decimal()),
            _ => None,
        }
    }

    /// Check the ladder invariants: strict ordering per side, no zero sizes.
    pub fn check_invariants(&self) -> Result<(), String> {
        check_side(&self.bids, |prev, next| prev > next)?;
        check_side(&self.asks, |prev, next| prev < next)
    }
}

fn check_side(side: &BookSide, ordered: impl Fn(&Price, &Price) -> bool) -> Result<(), String> {
    let levels = side.levels();
    if let Some(level) = levels.iter().find(|level| level.size.is_zero()) {
        return Err(format!("{} level at {} has zero size", side.side().as_str(), level.price));
    }
    for pair in levels.windows(2) {
        if !ordered(&pair[0].price, &pair[1].price) {
            return Err(format!(
                "{} ladder out of order at {} -> {}",
                side.side().as_str(),
                pair[0].price,
                pair[1].price
            ));
        }
    }
    Ok(())
}
