//! Snapshot-replace mode primitives (spec §4.2.2, bounded-depth broker
//! feeds): every tick is a full N-level picture, diffed against the last
//! picture on each side to synthesize ADD/MODIFY/CANCEL events.
//!
//! Grounded in `backtest_v2/book.rs::OrderBook::apply_snapshot`'s
//! clear-and-reinsert shape, generalized to diff-against-previous instead of
//! unconditional replace, since spec §4.2.2 requires per-level change
//! classification rather than a bulk CLEAR on every tick.

use crate::types::{Price, Qty, Side};

/// One REST/WS depth snapshot, diff-mode flavor (spec §6: ordered
/// `bids`/`asks` arrays, `last_update_id`).
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
}

/// One full-depth tick from a bounded-depth broker feed. `trade` carries an
/// optional last-trade print to emit as a TRADE event alongside the level
/// changes.
#[derive(Debug, Clone)]
pub struct BoundedDepthTick {
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
    pub trade: Option<TradePrint>,
}

#[derive(Debug, Clone, Copy)]
pub struct TradePrint {
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
}

/// A single level-level change produced by diffing two snapshot pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Add,
    Modify,
    Cancel,
}

/// Diff `new` against `old` on one side and report one `LevelChange` per
/// price that actually changed. Prices absent from both produce nothing;
/// unchanged quantities produce nothing (spec §4.2.2's "all other levels
/// produce no event").
pub fn diff_side(old: &[(Price, Qty)], new: &[(Price, Qty)]) -> Vec<(Price, Qty, LevelChange)> {
    use std::collections::HashMap;
    let old_map: HashMap<Price, Qty> = old.iter().copied().collect();
    let new_map: HashMap<Price, Qty> = new.iter().copied().collect();

    let mut changes = Vec::new();
    for (&price, &qty) in &new_map {
        match old_map.get(&price) {
            None => changes.push((price, qty, LevelChange::Add)),
            Some(&old_qty) if old_qty != qty => changes.push((price, qty, LevelChange::Modify)),
            Some(_) => {}
        }
    }
    for &price in old_map.keys() {
        if !new_map.contains_key(&price) {
            changes.push((price, Qty::ZERO, LevelChange::Cancel));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s3_diff_classification() {
        let old = vec![(Price(100), Qty(5)), (Price(99), Qty(3))];
        let new = vec![(Price(100), Qty(4)), (Price(98), Qty(2))];
        let mut changes = diff_side(&old, &new);
        changes.sort_by_key(|(p, _, _)| p.0);
        assert_eq!(
            changes,
            vec![
                (Price(98), Qty(2), LevelChange::Add),
                (Price(99), Qty::ZERO, LevelChange::Cancel),
                (Price(100), Qty(4), LevelChange::Modify),
            ]
        );
    }

    #[test]
    fn unchanged_level_produces_no_event() {
        let old = vec![(Price(101), Qty(7))];
        let new = vec![(Price(101), Qty(7))];
        assert!(diff_side(&old, &new).is_empty());
    }
}
