//! Read-only query facade
//!
//! Never touches the network and never waits on anything but the store's
//! read lock. Books are looked up by symbol; when a symbol is tracked at
//! several depths, the deepest book answers.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::topic::Topic;

use crate::order_book::OrderBook;
use crate::snapshot::BookSnapshot;
use crate::store::BookStore;

/// Top-of-book summary.
///
/// A missing side reports zero for its best price. `spread_pct` is zero
/// whenever `mid` is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub symbol: Symbol,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid: Decimal,
    pub spread: Decimal,
    pub spread_pct: Decimal,
    /// Exchange timestamp of the last applied message (Unix millis).
    pub timestamp: i64,
}

impl BookSummary {
    pub fn from_book(book: &OrderBook) -> Self {
        let best_bid = book.best_bid().map_or(Decimal::ZERO, |p| p.as_decimal());
        let best_ask = book.best_ask().map_or(Decimal::ZERO, |p| p.as_decimal());
        let mid = (best_bid + best_ask) / Decimal::from(2);
        let spread = best_ask - best_bid;
        let spread_pct = if mid.is_zero() {
            Decimal::ZERO
        } else {
            spread / mid * Decimal::ONE_HUNDRED
        };

        Self {
            symbol: book.symbol.clone(),
            best_bid,
            best_ask,
            mid,
            spread,
            spread_pct,
            timestamp: book.server_timestamp(),
        }
    }
}

#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<BookStore>,
    liveness_window: Duration,
}

impl QueryFacade {
    pub fn new(store: Arc<BookStore>, liveness_window: Duration) -> Self {
        Self {
            store,
            liveness_window,
        }
    }

    /// Copy of the deepest book tracked for `symbol`.
    pub fn get_book(&self, symbol: &Symbol) -> Option<BookSnapshot> {
        let topic = self.store.deepest(symbol)?;
        self.get_book_at(&topic)
    }

    /// Copy of the book for one specific topic.
    pub fn get_book_at(&self, topic: &Topic) -> Option<BookSnapshot> {
        self.store.with_book(topic, BookSnapshot::from_book)
    }

    pub fn get_summary(&self, symbol: &Symbol) -> Option<BookSummary> {
        let topic = self.store.deepest(symbol)?;
        self.store.with_book(&topic, BookSummary::from_book)
    }

    /// Whether `topic`'s book is absent or silent for longer than the
    /// liveness window.
    pub fn is_stale(&self, topic: &Topic) -> bool {
        self.store.is_stale(topic, self.liveness_window)
    }

    pub fn stale_topics(&self) -> Vec<Topic> {
        self.store.stale_topics(self.liveness_window)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.store.topics()
    }
}
