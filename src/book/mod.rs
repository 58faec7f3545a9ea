//! Order-book reconstructor (spec §4.2): converts bounded-depth feeds —
//! either snapshot-plus-diff or snapshot-replace — into a coherent full book
//! per instrument and emits the normalized `MarketEvent` stream.
//!
//! Grounded in `backtest_v2/book.rs` (`OrderBook`, `BTreeMap`-ordered
//! levels, crossed-book detection) and `backtest_v2/l2_delta.rs`
//! (`DeterministicBook`'s snapshot/delta application and gap handling).
//! `OrderedPrice`'s `f64`-wrapping `Ord` shim is dropped entirely: `Price` is
//! already a totally-ordered integer, so bids use `Reverse<Price>` and asks
//! use `Price` directly as `BTreeMap` keys.

pub mod diff;
pub mod reconstructor;
pub mod snapshot;

pub use diff::{DepthDiff, DiffBuffer};
pub use reconstructor::{synthetic_order_id, Reconstructor, SyncAction, VenueDecimalFormat};
pub use snapshot::{diff_side, BoundedDepthTick, DepthSnapshot, LevelChange, TradePrint};

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::types::{InstrumentId, Price, PriceLevel, Qty, Side};

/// Per-instrument book state (spec §3 `VenueOrderBook`). Owned exclusively
/// by the market-data thread; strategies never touch this directly, only
/// the normalized events it emits.
#[derive(Debug, Clone)]
pub struct VenueOrderBook {
    pub instrument: InstrumentId,
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    pub last_update_id: u64,
    pub initialized: bool,
}

impl VenueOrderBook {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            initialized: false,
        }
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.values().next()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    /// spec §3 invariant: "if both sides non-empty then best_bid <
    /// best_ask".
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Every resting bid as `(price, qty)`, highest price first.
    pub fn bids(&self) -> Vec<(Price, Qty)> {
        self.bids.values().map(|l| (l.price, l.qty)).collect()
    }

    /// Every resting ask as `(price, qty)`, lowest price first.
    pub fn asks(&self) -> Vec<(Price, Qty)> {
        self.asks.values().map(|l| (l.price, l.qty)).collect()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.initialized = false;
    }

    /// Insert/update/remove one level. Zero quantity removes the level
    /// (spec §3: "a zero-quantity update removes the level"). Returns the
    /// classification the caller uses to pick a `MarketEventKind`, or
    /// `None` if this was a cancel-of-absent-level no-op.
    fn apply_level(
        &mut self,
        side: Side,
        price: Price,
        qty: Qty,
        order_count: u32,
        now: u64,
    ) -> Option<LevelChange> {
        match side {
            Side::Bid => Self::apply_to_map(&mut self.bids, Reverse(price), price, qty, order_count, now),
            Side::Ask => Self::apply_to_map(&mut self.asks, price, price, qty, order_count, now),
            Side::Invalid => None,
        }
    }

    fn apply_to_map<K: Ord + Copy>(
        map: &mut BTreeMap<K, PriceLevel>,
        key: K,
        price: Price,
        qty: Qty,
        order_count: u32,
        now: u64,
    ) -> Option<LevelChange> {
        if qty.is_zero() {
            return if map.remove(&key).is_some() {
                Some(LevelChange::Cancel)
            } else {
                None
            };
        }
        let level = PriceLevel::new(price, qty, order_count, now);
        if map.insert(key, level).is_some() {
            Some(LevelChange::Modify)
        } else {
            Some(LevelChange::Add)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_cancel_roundtrips() {
        let mut book = VenueOrderBook::new(InstrumentId(0));
        assert_eq!(
            book.apply_level(Side::Bid, Price(100), Qty(5), 1, 0),
            Some(LevelChange::Add)
        );
        assert_eq!(book.best_bid().unwrap().qty, Qty(5));
        assert_eq!(
            book.apply_level(Side::Bid, Price(100), Qty::ZERO, 0, 0),
            Some(LevelChange::Cancel)
        );
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn crossed_book_detected() {
        let mut book = VenueOrderBook::new(InstrumentId(0));
        book.apply_level(Side::Bid, Price(101), Qty(5), 1, 0);
        book.apply_level(Side::Ask, Price(100), Qty(5), 1, 0);
        assert!(book.is_crossed());
    }

    #[test]
    fn bids_ordered_high_to_low_asks_low_to_high() {
        let mut book = VenueOrderBook::new(InstrumentId(0));
        book.apply_level(Side::Bid, Price(100), Qty(1), 1, 0);
        book.apply_level(Side::Bid, Price(105), Qty(1), 1, 0);
        assert_eq!(book.best_bid().unwrap().price, Price(105));
        book.apply_level(Side::Ask, Price(110), Qty(1), 1, 0);
        book.apply_level(Side::Ask, Price(108), Qty(1), 1, 0);
        assert_eq!(book.best_ask().unwrap().price, Price(108));
    }
}
