//! Snapshot and delta application
//!
//! `apply_message` is the pure merge step: it folds one message into the
//! slot holding a topic's book and reports what happened. `DeltaApplier`
//! wires it to the shared store, metrics and logs.
//!
//! Merge rules:
//! 1. A snapshot always replaces the slot.
//! 2. A delta with no prior snapshot is discarded.
//! 3. Under `Strict`, a delta whose update id is not newer than the stored
//!    one is discarded as stale, and one that skips ahead drops the book so
//!    the caller can force a fresh snapshot.
//! 4. Otherwise each level change is applied in order: size zero deletes,
//!    anything else inserts or replaces.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use types::errors::ProtocolError;

use crate::config::SequencePolicy;
use crate::events::BookMessage;
use crate::metrics::ReplicatorMetrics;
use crate::order_book::OrderBook;
use crate::store::BookStore;

/// Why a delta was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No snapshot has been stored for the topic.
    NoSnapshot,
    /// The update id is not newer than the stored one.
    Stale { stored: u64, received: u64 },
}

/// Result of folding one message into a book slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    SnapshotApplied,
    DeltaApplied,
    Discarded(DiscardReason),
    /// The delta skipped ahead; the stored book was dropped.
    GapDetected { expected: u64, received: u64 },
}

impl ApplyOutcome {
    /// Whether the caller must resubscribe to obtain a fresh snapshot.
    pub fn needs_resync(&self) -> bool {
        matches!(self, ApplyOutcome::GapDetected { .. })
    }
}

/// Fold `message` into `slot`.
pub fn apply_message(
    slot: &mut Option<OrderBook>,
    message: &BookMessage,
    policy: SequencePolicy,
) -> ApplyOutcome {
    match message {
        BookMessage::Snapshot(update) => {
            *slot = Some(OrderBook::from_snapshot(update));
            ApplyOutcome::SnapshotApplied
        }
        BookMessage::Delta(update) => {
            let Some(book) = slot.as_mut() else {
                return ApplyOutcome::Discarded(DiscardReason::NoSnapshot);
            };

            if policy == SequencePolicy::Strict {
                let stored = book.last_update_id();
                if update.update_id <= stored {
                    return ApplyOutcome::Discarded(DiscardReason::Stale {
                        stored,
                        received: update.update_id,
                    });
                }
                let expected = stored.saturating_add(1);
                if update.update_id > expected {
                    *slot = None;
                    return ApplyOutcome::GapDetected {
                        expected,
                        received: update.update_id,
                    };
                }
            }

            book.apply_changes(update);
            ApplyOutcome::DeltaApplied
        }
    }
}

/// Applies decoded messages to the shared book store.
pub struct DeltaApplier {
    store: Arc<BookStore>,
    metrics: Arc<ReplicatorMetrics>,
    policy: SequencePolicy,
}

impl DeltaApplier {
    pub fn new(store: Arc<BookStore>, metrics: Arc<ReplicatorMetrics>, policy: SequencePolicy) -> Self {
        Self {
            store,
            metrics,
            policy,
        }
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<BookStore> {
        &self.store
    }

    /// Apply one message. Each call holds the store's write lock for the
    /// whole merge, so readers never observe a half-applied delta.
    pub fn apply(&self, message: &BookMessage) -> ApplyOutcome {
        let topic = message.topic();
        let started = Instant::now();
        let outcome = self
            .store
            .modify(topic, |slot| apply_message(slot, message, self.policy));
        let elapsed_ns = started.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        let update = message.update();

        match outcome {
            ApplyOutcome::SnapshotApplied => {
                self.metrics.record_snapshot(elapsed_ns);
                debug!(
                    topic = %topic,
                    update_id = update.update_id,
                    bids = update.bids.len(),
                    asks = update.asks.len(),
                    "Snapshot applied"
                );
            }
            ApplyOutcome::DeltaApplied => {
                self.metrics.record_delta(elapsed_ns);
                debug!(topic = %topic, update_id = update.update_id, "Delta applied");
            }
            ApplyOutcome::Discarded(DiscardReason::NoSnapshot) => {
                self.metrics.record_discard();
                self.metrics.record_anomaly();
                let anomaly = ProtocolError::DeltaBeforeSnapshot {
                    topic: topic.to_string(),
                };
                warn!(topic = %topic, update_id = update.update_id, error = %anomaly, "Protocol anomaly");
            }
            ApplyOutcome::Discarded(DiscardReason::Stale { stored, received }) => {
                self.metrics.record_discard();
                debug!(topic = %topic, stored, received, "Stale delta discarded");
            }
            ApplyOutcome::GapDetected { expected, received } => {
                self.metrics.record_gap();
                warn!(
                    topic = %topic,
                    expected,
                    received,
                    "Sequence gap detected, book dropped pending fresh snapshot"
                );
            }
        }

        outcome
    }
}
