//! Active-order table (spec §3 "mapping internal_order_id → venue_order_id"
//! lifecycle; spec §4.4.2 "state of an order is implicit in the last
//! emitted response and the mapping table's membership").
//!
//! Grounded in `backtest_v2/oms.rs`'s `OmsOrder`/`OrderState` bookkeeping,
//! generalized from the backtester's single-process book to a table shared
//! between the gateway's request thread and its status-poller thread —
//! hence the `parking_lot::Mutex` guard, matching the teacher's off-hot-path
//! locking discipline (`edge/client.rs`, `scrapers/binance_hardened_ingest.rs`).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{ClientId, InstrumentId, OrderId, Price, Qty, Side};

/// spec §4.4.2: `PENDING_NEW → LIVE → {FILLED | CANCELED | REJECTED}`, with
/// `PARTIALLY_FILLED` a self-loop on `LIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    PendingNew,
    Live,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Canceled | OrderState::Rejected)
    }
}

/// One row of the active-order table. `venue_order_id` is `None` until the
/// venue ACKs a NEW (spec §3 mapping lifecycle: "created when the venue
/// ACKs a NEW").
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub original_quantity: Qty,
    pub venue_order_id: Option<u64>,
    pub state: OrderState,
    /// Cumulative executed quantity; `(state, executed_quantity)` is what
    /// the idempotency check in the status poller compares against (spec
    /// §4.4.3 "a status that produces the same (state, executed_qty) as the
    /// last emission is suppressed").
    pub executed_quantity: Qty,
}

impl OrderRecord {
    pub fn leaves_quantity(&self) -> Qty {
        self.original_quantity.saturating_sub(self.executed_quantity)
    }
}

/// Shared between the gateway's request thread (inserts on NEW, updates on
/// ACK) and its status-poller thread (reads/updates on status change);
/// never touched on the market-data hot path.
#[derive(Default)]
pub struct ActiveOrderTable {
    by_internal: Mutex<HashMap<OrderId, OrderRecord>>,
}

impl ActiveOrderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `PENDING_NEW` row. Spec §3: "ClientRequest: created by
    /// strategy, owned by gateway from the moment it is read off the
    /// request ring."
    pub fn insert_pending(
        &self,
        order_id: OrderId,
        client_id: ClientId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        quantity: Qty,
    ) {
        self.by_internal.lock().insert(
            order_id,
            OrderRecord {
                order_id,
                client_id,
                instrument,
                side,
                price,
                original_quantity: quantity,
                venue_order_id: None,
                state: OrderState::PendingNew,
                executed_quantity: Qty::ZERO,
            },
        );
    }

    /// Record the venue ACK (spec §3: mapping "created when the venue ACKs
    /// a NEW").
    pub fn mark_acked(&self, order_id: OrderId, venue_order_id: u64) {
        if let Some(rec) = self.by_internal.lock().get_mut(&order_id) {
            rec.venue_order_id = Some(venue_order_id);
            rec.state = OrderState::Live;
        }
    }

    pub fn venue_id_for(&self, order_id: OrderId) -> Option<u64> {
        self.by_internal.lock().get(&order_id).and_then(|r| r.venue_order_id)
    }

    pub fn get(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.by_internal.lock().get(&order_id).cloned()
    }

    /// Update `(state, executed_quantity)` for an order still in the table.
    /// Returns `false` if the order is unknown (already removed, or never
    /// tracked) so the caller can skip emitting a response for it.
    pub fn update_progress(&self, order_id: OrderId, state: OrderState, executed_quantity: Qty) -> bool {
        if let Some(rec) = self.by_internal.lock().get_mut(&order_id) {
            rec.state = state;
            rec.executed_quantity = executed_quantity;
            true
        } else {
            false
        }
    }

    /// spec §4.4.2: "Terminal states release the internal↔venue id
    /// mapping." Removes the row entirely.
    pub fn remove(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.by_internal.lock().remove(&order_id)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.by_internal.lock().contains_key(&order_id)
    }

    /// Every non-terminal order, for the status poller to iterate (spec
    /// §4.4.3: "iterates active orders at a configured interval").
    pub fn active_orders(&self) -> Vec<OrderRecord> {
        self.by_internal
            .lock()
            .values()
            .filter(|r| !r.state.is_terminal())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_internal.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
