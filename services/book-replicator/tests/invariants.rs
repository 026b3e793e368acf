//! Property tests for the ladder invariants and merge semantics.

use std::collections::BTreeMap;

use book_replicator::config::SequencePolicy;
use book_replicator::delta::{apply_message, ApplyOutcome};
use book_replicator::events::{BookMessage, BookUpdate, LevelUpdate};
use book_replicator::order_book::OrderBook;
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::numeric::{Price, Size};
use types::topic::Topic;

fn level_strategy() -> impl Strategy<Value = LevelUpdate> {
    // Prices on a 0.5 tick with mixed scales, sizes including deletions.
    (1u64..400, 0u64..4, prop::bool::ANY).prop_map(|(ticks, lots, padded)| {
        let price = Decimal::new(ticks as i64 * 5, 1);
        let price = if padded { price.round_dp(1) * Decimal::new(100, 2) } else { price };
        LevelUpdate {
            price: Price::try_new(price).unwrap(),
            size: Size::try_new(Decimal::from(lots)).unwrap(),
        }
    })
}

fn update_strategy() -> impl Strategy<Value = (Vec<LevelUpdate>, Vec<LevelUpdate>)> {
    (
        prop::collection::vec(level_strategy(), 0..20),
        prop::collection::vec(level_strategy(), 0..20),
    )
}

fn make_update(bids: Vec<LevelUpdate>, asks: Vec<LevelUpdate>, update_id: u64) -> BookUpdate {
    BookUpdate {
        topic: Topic::validate("BTCUSDT", 200).unwrap(),
        bids,
        asks,
        update_id,
        sequence: update_id,
        timestamp: update_id as i64,
    }
}

/// Last-write-wins model of one side.
fn model_apply(model: &mut BTreeMap<Decimal, Decimal>, changes: &[LevelUpdate]) {
    for change in changes {
        let price = change.price.as_decimal().normalize();
        if change.size.is_zero() {
            model.remove(&price);
        } else {
            model.insert(price, change.size.as_decimal());
        }
    }
}

fn side_as_model(levels: impl Iterator<Item = (Price, Size)>) -> BTreeMap<Decimal, Decimal> {
    levels
        .map(|(p, s)| (p.as_decimal().normalize(), s.as_decimal()))
        .collect()
}

proptest! {
    #[test]
    fn ladders_stay_sorted_unique_and_nonzero(
        snapshot in update_strategy(),
        deltas in prop::collection::vec(update_strategy(), 0..30),
    ) {
        let mut book = OrderBook::from_snapshot(&make_update(snapshot.0, snapshot.1, 1));
        prop_assert!(book.check_invariants().is_ok());

        for (i, (bids, asks)) in deltas.into_iter().enumerate() {
            book.apply_changes(&make_update(bids, asks, i as u64 + 2));
            prop_assert!(book.check_invariants().is_ok(), "{:?}", book.check_invariants());
        }
    }

    #[test]
    fn merge_matches_last_write_wins_model(
        snapshot in update_strategy(),
        deltas in prop::collection::vec(update_strategy(), 0..30),
    ) {
        let mut bid_model = BTreeMap::new();
        let mut ask_model = BTreeMap::new();
        model_apply(&mut bid_model, &snapshot.0);
        model_apply(&mut ask_model, &snapshot.1);

        let mut slot = None;
        let first = BookMessage::Snapshot(make_update(snapshot.0, snapshot.1, 1));
        prop_assert_eq!(apply_message(&mut slot, &first, SequencePolicy::Strict), ApplyOutcome::SnapshotApplied);

        for (i, (bids, asks)) in deltas.into_iter().enumerate() {
            model_apply(&mut bid_model, &bids);
            model_apply(&mut ask_model, &asks);
            let delta = BookMessage::Delta(make_update(bids, asks, i as u64 + 2));
            prop_assert_eq!(apply_message(&mut slot, &delta, SequencePolicy::Strict), ApplyOutcome::DeltaApplied);
        }

        let book = slot.unwrap();
        prop_assert_eq!(side_as_model(book.bids().iter().map(|l| (l.price, l.size))), bid_model);
        prop_assert_eq!(side_as_model(book.asks().iter().map(|l| (l.price, l.size))), ask_model);
    }

    #[test]
    fn reapplying_a_delta_changes_nothing(
        snapshot in update_strategy(),
        delta in update_strategy(),
        policy in prop_oneof![Just(SequencePolicy::Strict), Just(SequencePolicy::BestEffort)],
    ) {
        let mut slot = None;
        apply_message(&mut slot, &BookMessage::Snapshot(make_update(snapshot.0, snapshot.1, 1)), policy);

        let delta = BookMessage::Delta(make_update(delta.0, delta.1, 2));
        apply_message(&mut slot, &delta, policy);
        let once = slot.clone().unwrap();
        apply_message(&mut slot, &delta, policy);
        let twice = slot.unwrap();

        prop_assert_eq!(once.bids().levels(), twice.bids().levels());
        prop_assert_eq!(once.asks().levels(), twice.asks().levels());
    }

    #[test]
    fn echoed_snapshot_is_a_noop(snapshot in update_strategy()) {
        let book = OrderBook::from_snapshot(&make_update(snapshot.0, snapshot.1, 1));
        let echo = make_update(
            book.bids().iter().map(|l| LevelUpdate { price: l.price, size: l.size }).collect(),
            book.asks().iter().map(|l| LevelUpdate { price: l.price, size: l.size }).collect(),
            1,
        );
        let again = OrderBook::from_snapshot(&echo);
        prop_assert_eq!(again.bids().levels(), book.bids().levels());
        prop_assert_eq!(again.asks().levels(), book.asks().levels());
    }
}
