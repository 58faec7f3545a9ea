//! Bracket orders (spec §4.4.5): an entry order paired with a stop-loss and
//! a target exit, OCO-linked so that a fill on one exit cancels the other,
//! and flagged for manual flattening if an exit leg fails to place after
//! the entry is already filled.
//!
//! Grounded in `backtest_v2/oms.rs`'s terminal-state bookkeeping, extended
//! with the OCO pairing `scrapers/binance_hft_ingest.rs` uses for its
//! paired maker-quote cancel-replace (cancel one side once the other
//! executes). There is no dedicated bracket type in the teacher; this is
//! new state built in its idiom from the two closest shapes available.

use std::collections::HashMap;

use crate::events::ClientResponseKind;
use crate::types::{InstrumentId, OrderId, Price, Qty, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Stop,
    Target,
}

/// The stop-loss/target pair to attach once the entry order fills.
#[derive(Debug, Clone, Copy)]
pub struct BracketParams {
    pub quantity: Qty,
    pub stop_loss_price: Price,
    pub target_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketState {
    AwaitingEntry,
    EntryLive,
    ExitsWorking,
    Closed,
    /// An exit leg failed to place after the entry already filled: the
    /// position is unprotected until the gateway's market-close order
    /// (spec §4.4.5) fills.
    NeedsFlatten,
}

struct Bracket {
    instrument: InstrumentId,
    side: Side,
    quantity: Qty,
    stop_loss_price: Price,
    target_price: Price,
    stop_order_id: Option<OrderId>,
    target_order_id: Option<OrderId>,
    state: BracketState,
}

/// Emitted once an entry fills, carrying everything needed to place the
/// two exit legs.
#[derive(Debug, Clone, Copy)]
pub struct FilledEntry {
    pub instrument: InstrumentId,
    pub side: Side,
    pub quantity: Qty,
    pub stop_loss_price: Price,
    pub target_price: Price,
    pub stop_order_id: OrderId,
    pub target_order_id: OrderId,
}

/// Derive the two exit order ids from the entry id. Mirrors
/// `book::synthetic_order_id`'s bit-packing approach (deterministic,
/// collision-free within one entry) rather than drawing from a shared
/// counter, so exit ids never need to round-trip through the strategy.
fn exit_order_ids(entry_id: OrderId) -> (OrderId, OrderId) {
    (OrderId(entry_id.0 << 2 | 0b01), OrderId(entry_id.0 << 2 | 0b10))
}

/// Tracks every in-flight bracket, keyed by entry `OrderId`, plus a
/// reverse index from each exit leg's `OrderId` back to its entry. Owned by
/// a single `BinanceGateway`; never touched from the market-data hot path.
#[derive(Default)]
pub struct BracketManager {
    by_entry: HashMap<OrderId, Bracket>,
    leg_to_entry: HashMap<OrderId, (OrderId, Leg)>,
    fill_triggers: Vec<FilledEntry>,
    cancel_requests: Vec<OrderId>,
    flatten_requests: Vec<(OrderId, InstrumentId, Side, Qty)>,
}

impl BracketManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a bracket at the moment its entry order is submitted.
    pub fn track(&mut self, entry_order_id: OrderId, instrument: InstrumentId, side: Side, params: BracketParams) {
        self.by_entry.insert(
            entry_order_id,
            Bracket {
                instrument,
                side,
                quantity: params.quantity,
                stop_loss_price: params.stop_loss_price,
                target_price: params.target_price,
                stop_order_id: None,
                target_order_id: None,
                state: BracketState::AwaitingEntry,
            },
        );
    }

    pub fn state_of(&self, order_id: OrderId) -> Option<BracketState> {
        self.by_entry.get(&order_id).map(|b| b.state)
    }

    /// Feed every response the gateway emits through here; brackets ignore
    /// responses for orders they aren't tracking.
    pub fn on_response(&mut self, order_id: OrderId, kind: ClientResponseKind) {
        if self.by_entry.contains_key(&order_id) {
            self.on_entry_response(order_id, kind);
        } else if let Some((entry_id, leg)) = self.leg_to_entry.get(&order_id).copied() {
            self.on_leg_response(entry_id, leg, kind);
        }
    }

    fn on_entry_response(&mut self, entry_id: OrderId, kind: ClientResponseKind) {
        let Some(bracket) = self.by_entry.get_mut(&entry_id) else { return };
        match kind {
            ClientResponseKind::Accepted => bracket.state = BracketState::EntryLive,
            ClientResponseKind::Filled => {
                let (stop_id, target_id) = exit_order_ids(entry_id);
                bracket.stop_order_id = Some(stop_id);
                bracket.target_order_id = Some(target_id);
                bracket.state = BracketState::ExitsWorking;
                self.leg_to_entry.insert(stop_id, (entry_id, Leg::Stop));
                self.leg_to_entry.insert(target_id, (entry_id, Leg::Target));
                self.fill_triggers.push(FilledEntry {
                    instrument: bracket.instrument,
                    side: bracket.side,
                    quantity: bracket.quantity,
                    stop_loss_price: bracket.stop_loss_price,
                    target_price: bracket.target_price,
                    stop_order_id: stop_id,
                    target_order_id: target_id,
                });
            }
            ClientResponseKind::Rejected | ClientResponseKind::Canceled => {
                bracket.state = BracketState::Closed;
            }
            ClientResponseKind::PartiallyFilled | ClientResponseKind::CancelRejected => {}
        }
    }

    fn on_leg_response(&mut self, entry_id: OrderId, leg: Leg, kind: ClientResponseKind) {
        let Some(bracket) = self.by_entry.get_mut(&entry_id) else { return };
        match kind {
            ClientResponseKind::Filled => {
                // OCO: the leg that didn't fill is now stale and must go.
                let other = match leg {
                    Leg::Stop => bracket.target_order_id,
                    Leg::Target => bracket.stop_order_id,
                };
                if let Some(other_id) = other {
                    self.cancel_requests.push(other_id);
                }
                bracket.state = BracketState::Closed;
            }
            ClientResponseKind::Rejected => {
                // The entry already filled and opened a position; this exit
                // never made it onto the book, so the position is naked.
                // `entry_id` carries through so the gateway can derive a
                // deterministic market-close order id (spec §4.4.5).
                self.flatten_requests.push((entry_id, bracket.instrument, bracket.side.opposite(), bracket.quantity));
                bracket.state = BracketState::NeedsFlatten;
            }
            ClientResponseKind::Canceled | ClientResponseKind::CancelRejected | ClientResponseKind::Accepted | ClientResponseKind::PartiallyFilled => {}
        }
    }

    /// Drain entries whose exits need placing.
    pub fn drain_fill_triggers(&mut self) -> Vec<FilledEntry> {
        std::mem::take(&mut self.fill_triggers)
    }

    /// Drain OCO cancels that must be sent for the sibling of a filled leg.
    pub fn drain_cancel_requests(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.cancel_requests)
    }

    /// Drain (entry_order_id, instrument, close_side, quantity) tuples the
    /// gateway must close with a market order (spec §4.4.5).
    pub fn drain_flatten_requests(&mut self) -> Vec<(OrderId, InstrumentId, Side, Qty)> {
        std::mem::take(&mut self.flatten_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BracketParams {
        BracketParams {
            quantity: Qty(10),
            stop_loss_price: Price(90),
            target_price: Price(110),
        }
    }

    #[test]
    fn entry_fill_emits_exit_legs_with_distinct_ids() {
        let mut mgr = BracketManager::new();
        let entry = OrderId(7);
        mgr.track(entry, InstrumentId(0), Side::Bid, params());
        mgr.on_response(entry, ClientResponseKind::Accepted);
        assert_eq!(mgr.state_of(entry), Some(BracketState::EntryLive));

        mgr.on_response(entry, ClientResponseKind::Filled);
        assert_eq!(mgr.state_of(entry), Some(BracketState::ExitsWorking));
        let triggers = mgr.drain_fill_triggers();
        assert_eq!(triggers.len(), 1);
        assert_ne!(triggers[0].stop_order_id, triggers[0].target_order_id);
        assert_eq!(triggers[0].side, Side::Bid);
    }

    #[test]
    fn exit_fill_cancels_sibling_leg_oco() {
        let mut mgr = BracketManager::new();
        let entry = OrderId(3);
        mgr.track(entry, InstrumentId(0), Side::Ask, params());
        mgr.on_response(entry, ClientResponseKind::Filled);
        let triggers = mgr.drain_fill_triggers();
        let stop_id = triggers[0].stop_order_id;
        let target_id = triggers[0].target_order_id;

        mgr.on_response(stop_id, ClientResponseKind::Filled);
        let cancels = mgr.drain_cancel_requests();
        assert_eq!(cancels, vec![target_id]);
        assert_eq!(mgr.state_of(entry), Some(BracketState::Closed));
    }

    #[test]
    fn exit_reject_after_entry_fill_flags_needs_flatten() {
        let mut mgr = BracketManager::new();
        let entry = OrderId(9);
        mgr.track(entry, InstrumentId(2), Side::Bid, params());
        mgr.on_response(entry, ClientResponseKind::Filled);
        let triggers = mgr.drain_fill_triggers();
        mgr.on_response(triggers[0].stop_order_id, ClientResponseKind::Rejected);

        assert_eq!(mgr.state_of(entry), Some(BracketState::NeedsFlatten));
        let flattens = mgr.drain_flatten_requests();
        assert_eq!(flattens, vec![(entry, InstrumentId(2), Side::Ask, Qty(10))]);
    }

    #[test]
    fn entry_rejected_closes_bracket_without_exits() {
        let mut mgr = BracketManager::new();
        let entry = OrderId(1);
        mgr.track(entry, InstrumentId(0), Side::Bid, params());
        mgr.on_response(entry, ClientResponseKind::Rejected);
        assert_eq!(mgr.state_of(entry), Some(BracketState::Closed));
        assert!(mgr.drain_fill_triggers().is_empty());
    }
}
