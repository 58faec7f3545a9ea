//! The reconstructor itself (spec §4.2.2–§4.2.5): owns one `VenueOrderBook`
//! plus one `DiffBuffer` per instrument, applies the diff-mode
//! synchronization protocol or the snapshot-replace diffing, and emits
//! normalized `MarketEvent`s onto a value-carrying ring.
//!
//! Grounded in `backtest_v2/l2_delta.rs::DeterministicBook::apply_snapshot`/
//! `apply_delta` for the gap-detection and crossed-book rejection shape,
//! adapted to integer `Price`/`Qty` and to spec's exact buffer-then-
//! reconcile protocol (§4.2.2 steps 1–5) rather than Polymarket's
//! single-sequence model.

use crate::book::diff::DepthDiff;
use crate::book::snapshot::{diff_side, BoundedDepthTick, DepthSnapshot, LevelChange};
use crate::book::{DiffBuffer, VenueOrderBook};
use crate::events::{MarketEvent, MarketEventKind};
use crate::fabric::Ring;
use crate::types::{InstrumentId, Price, Qty, Side, MAX_INSTRUMENTS};

/// Power-of-ten fixed-point scale for a venue's wire strings (spec §3:
/// "conversions to/from venue strings happen only at adapter boundaries").
/// `"123.45"` at `price_scale = 2` becomes `Price(12345)`.
#[derive(Debug, Clone, Copy)]
pub struct VenueDecimalFormat {
    pub price_scale: u32,
    pub qty_scale: u32,
}

impl VenueDecimalFormat {
    pub fn parse_price(&self, s: &str) -> Option<Price> {
        Self::parse_fixed(s, self.price_scale).map(Price)
    }

    pub fn parse_qty(&self, s: &str) -> Option<Qty> {
        Self::parse_fixed(s, self.qty_scale).map(|v| Qty(v.max(0) as u64))
    }

    fn parse_fixed(s: &str, scale: u32) -> Option<i64> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        let sign: i64 = if int_part.starts_with('-') { -1 } else { 1 };
        let int_part = int_part.trim_start_matches('-');
        let int_val: i64 = int_part.parse().ok()?;
        let mut frac = frac_part.to_string();
        while (frac.len() as u32) < scale {
            frac.push('0');
        }
        frac.truncate(scale as usize);
        let frac_val: i64 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
        let scale_mul = 10i64.checked_pow(scale)?;
        Some(sign * (int_val * scale_mul + frac_val))
    }
}

/// Synthetic order id (spec §4.2.3): deterministic per `(instrument, price,
/// side)` so repeated events at the same level key to the same id. Layout:
/// top 12 bits instrument (`MAX_INSTRUMENTS == 4096`), next 51 bits a
/// truncated price, low bit the side.
const PRICE_BITS: u32 = 51;
const INSTRUMENT_SHIFT: u32 = PRICE_BITS + 1;
const PRICE_MASK: u64 = (1u64 << PRICE_BITS) - 1;

pub fn synthetic_order_id(instrument: InstrumentId, price: Price, side: Side) -> crate::types::OrderId {
    debug_assert!((instrument.0 as usize) < MAX_INSTRUMENTS);
    let price_bits = (price.0 as u64) & PRICE_MASK;
    let id = ((instrument.0 as u64) << INSTRUMENT_SHIFT) | (price_bits << 1) | side.as_bit();
    crate::types::OrderId(id)
}

/// What the caller (the ingestor) must do after feeding the reconstructor
/// an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// The event was applied (or buffered); no REST call is needed.
    Continue,
    /// A fresh REST snapshot must be fetched before more diffs can apply.
    RequestSnapshot,
}

struct PerInstrument {
    book: VenueOrderBook,
    buffer: DiffBuffer,
    sequence: u64,
}

impl PerInstrument {
    fn new(instrument: InstrumentId, buffer_cap: usize) -> Self {
        Self {
            book: VenueOrderBook::new(instrument),
            buffer: DiffBuffer::new(buffer_cap),
            sequence: 0,
        }
    }
}

/// One reconstructor instance drives every subscribed instrument for a
/// single venue connection. `CAP` is the capacity of the `MarketEvent` ring
/// it publishes to (spec §9: "the slot *is* the event").
pub struct Reconstructor<'a, const CAP: usize> {
    ring: &'a Ring<MarketEvent, CAP>,
    states: Vec<Option<PerInstrument>>,
    diff_buffer_cap: usize,
}

impl<'a, const CAP: usize> Reconstructor<'a, CAP> {
    pub fn new(ring: &'a Ring<MarketEvent, CAP>, diff_buffer_cap: usize) -> Self {
        let mut states = Vec::with_capacity(MAX_INSTRUMENTS);
        states.resize_with(MAX_INSTRUMENTS, || None);
        Self {
            ring,
            states,
            diff_buffer_cap,
        }
    }

    /// Allocate book/buffer state for an instrument (idempotent). Called at
    /// subscription time (spec §3 `VenueOrderBook` lifecycle).
    pub fn subscribe(&mut self, instrument: InstrumentId) {
        let slot = &mut self.states[instrument.index()];
        if slot.is_none() {
            *slot = Some(PerInstrument::new(instrument, self.diff_buffer_cap));
        }
    }

    pub fn is_initialized(&self, instrument: InstrumentId) -> bool {
        self.states[instrument.index()]
            .as_ref()
            .map(|s| s.book.initialized)
            .unwrap_or(false)
    }

    fn next_sequence(state: &mut PerInstrument) -> u64 {
        state.sequence += 1;
        state.sequence
    }

    /// Publish one event; on a full ring, apply the §5 backpressure policy:
    /// drop the update, emit a synthetic CLEAR instead, mark the book
    /// uninitialized so the next consumable event is a fresh rebuild.
    fn emit(&self, state: &mut PerInstrument, event: MarketEvent) {
        if self.ring.try_push(event) {
            return;
        }
        state.book.clear();
        state.buffer.clear();
        let seq = Self::next_sequence(state);
        let _ = self.ring.try_push(MarketEvent::clear(state.book.instrument, seq));
    }

    fn emit_level_change(&self, state: &mut PerInstrument, side: Side, price: Price, qty: Qty, change: LevelChange) {
        let instrument = state.book.instrument;
        let kind = match change {
            LevelChange::Add => MarketEventKind::Add,
            LevelChange::Modify => MarketEventKind::Modify,
            LevelChange::Cancel => MarketEventKind::Cancel,
        };
        let seq = Self::next_sequence(state);
        let event = MarketEvent {
            kind,
            instrument,
            side,
            price,
            quantity: qty,
            synthetic_order_id: synthetic_order_id(instrument, price, side),
            sequence: seq,
        };
        self.emit(state, event);
    }

    fn force_resync(&self, state: &mut PerInstrument) -> SyncAction {
        state.book.clear();
        state.buffer.clear();
        let seq = Self::next_sequence(state);
        let _ = self.ring.try_push(MarketEvent::clear(state.book.instrument, seq));
        SyncAction::RequestSnapshot
    }

    /// spec §4.2.2 diff mode, steps 2–4: apply a freshly fetched REST
    /// snapshot, then reconcile whatever is sitting in the buffer.
    pub fn on_diff_mode_snapshot(&mut self, instrument: InstrumentId, snapshot: DepthSnapshot) -> SyncAction {
        self.subscribe(instrument);
        let state = self.states[instrument.index()].as_mut().unwrap();
        state.book.clear();
        state.book.last_update_id = snapshot.last_update_id;

        let seq = Self::next_sequence(state);
        self.emit(
            state,
            MarketEvent {
                kind: MarketEventKind::SnapshotStart,
                instrument,
                side: Side::Invalid,
                price: Price::INVALID,
                quantity: Qty::INVALID,
                synthetic_order_id: crate::types::OrderId(0),
                sequence: seq,
            },
        );
        for &(price, qty) in &snapshot.bids {
            self.emit_level_change(state, Side::Bid, price, qty, LevelChange::Add);
        }
        for &(price, qty) in &snapshot.asks {
            self.emit_level_change(state, Side::Ask, price, qty, LevelChange::Add);
        }
        let seq = Self::next_sequence(state);
        self.emit(
            state,
            MarketEvent {
                kind: MarketEventKind::SnapshotEnd,
                instrument,
                side: Side::Invalid,
                price: Price::INVALID,
                quantity: Qty::INVALID,
                synthetic_order_id: crate::types::OrderId(0),
                sequence: seq,
            },
        );
        state.book.initialized = true;

        state.buffer.discard_through(snapshot.last_update_id);
        self.reconcile(instrument)
    }

    /// Step 3 standalone: discard buffered diffs the snapshot already
    /// covers, without (re-)emitting the snapshot itself. Exposed for
    /// ingestors that apply the snapshot out of band.
    pub fn discard_stale_buffered(&mut self, instrument: InstrumentId, snapshot_id: u64) {
        if let Some(state) = self.states[instrument.index()].as_mut() {
            state.buffer.discard_through(snapshot_id);
        }
    }

    /// Drain the buffer against the current `last_update_id`, applying
    /// every contiguous diff (spec §4.2.2 step 5) until either the buffer is
    /// exhausted or a gap forces a resync.
    fn reconcile(&mut self, instrument: InstrumentId) -> SyncAction {
        loop {
            let state = self.states[instrument.index()].as_mut().unwrap();
            if !state.book.initialized {
                return SyncAction::RequestSnapshot;
            }
            let snapshot_id = state.book.last_update_id;
            let picked = state
                .buffer
                .pop_first_applicable(snapshot_id)
                .or_else(|| state.buffer.pop_if_contiguous(snapshot_id));
            match picked {
                Some(d) => {
                    if self.apply_diff_unchecked(instrument, d) == SyncAction::RequestSnapshot {
                        return SyncAction::RequestSnapshot;
                    }
                }
                None => {
                    let state = self.states[instrument.index()].as_ref().unwrap();
                    if let Some(front) = state.buffer.front() {
                        // Neither "applicable against snapshot" nor
                        // "contiguous with last applied" matched: either we
                        // missed updates (U > S+1) or the buffer starts
                        // after a gap relative to what we've applied.
                        if front.first_update_id > snapshot_id + 1 {
                            return self.force_resync(self.states[instrument.index()].as_mut().unwrap());
                        }
                    }
                    return SyncAction::Continue;
                }
            }
        }
    }

    /// Apply one diff that has already been range-checked against the
    /// current `last_update_id`, without re-validating contiguity.
    ///
    /// Mutates the book for every level in the diff first, then checks
    /// `is_crossed()` once against the fully-applied result, and only then
    /// either flushes the level-change events it collected along the way or
    /// discards them in favor of `force_resync` — never both (spec §4.2.4:
    /// "no crossed book is ever published").
    fn apply_diff_unchecked(&mut self, instrument: InstrumentId, diff: DepthDiff) -> SyncAction {
        let state = self.states[instrument.index()].as_mut().unwrap();
        let mut pending: Vec<(Side, Price, Qty, LevelChange)> = Vec::new();
        for &(price, qty) in &diff.bids {
            if let Some(change) = state.book.apply_level(Side::Bid, price, qty, 0, diff.last_update_id) {
                pending.push((Side::Bid, price, qty, change));
            }
        }
        for &(price, qty) in &diff.asks {
            if let Some(change) = state.book.apply_level(Side::Ask, price, qty, 0, diff.last_update_id) {
                pending.push((Side::Ask, price, qty, change));
            }
        }
        if state.book.is_crossed() {
            return self.force_resync(state);
        }
        for (side, price, qty, change) in pending {
            self.emit_level_change(state, side, price, qty, change);
        }
        state.book.last_update_id = diff.last_update_id;
        SyncAction::Continue
    }

    /// spec §4.2.2 diff mode, steps 1 + 5: feed one incoming diff. Buffers
    /// it while uninitialized; otherwise requires exact contiguity
    /// (`U == prev.u + 1`) and resyncs on any gap.
    pub fn on_diff_mode_diff(&mut self, instrument: InstrumentId, diff: DepthDiff) -> SyncAction {
        self.subscribe(instrument);
        let state = self.states[instrument.index()].as_mut().unwrap();
        if !state.book.initialized {
            if !state.buffer.push(diff) {
                // Hard cap exceeded (spec §5 Bounds): force a full resync.
                return self.force_resync(state);
            }
            return SyncAction::Continue;
        }
        if diff.first_update_id != state.book.last_update_id + 1 {
            return self.force_resync(state);
        }
        self.apply_diff_unchecked(instrument, diff)
    }

    /// spec §4.2.2 snapshot-replace mode: diff the new full picture against
    /// the last one on each side and emit exactly the levels that changed.
    ///
    /// Applies every level (and notes the trade, if any) before checking
    /// `is_crossed()` once against the fully-applied result. Nothing is
    /// published — not `SnapshotStart`, not a level change, not the trade —
    /// until that check passes; a crossed result goes straight to
    /// `force_resync` instead (spec §4.2.4: "no crossed book is ever
    /// published").
    pub fn on_bounded_tick(&mut self, instrument: InstrumentId, tick: BoundedDepthTick) {
        self.subscribe(instrument);
        let state = self.states[instrument.index()].as_mut().unwrap();
        let was_initialized = state.book.initialized;

        let old_bid_levels = state.book.bids();
        let old_ask_levels = state.book.asks();
        let bid_changes = diff_side(&old_bid_levels, &tick.bids);
        let ask_changes = diff_side(&old_ask_levels, &tick.asks);

        for &(price, qty, _) in &bid_changes {
            state.book.apply_level(Side::Bid, price, qty, 0, 0);
        }
        for &(price, qty, _) in &ask_changes {
            state.book.apply_level(Side::Ask, price, qty, 0, 0);
        }

        if state.book.is_crossed() {
            self.force_resync(state);
            return;
        }

        if !was_initialized {
            let seq = Self::next_sequence(state);
            self.emit(
                state,
                MarketEvent {
                    kind: MarketEventKind::SnapshotStart,
                    instrument,
                    side: Side::Invalid,
                    price: Price::INVALID,
                    quantity: Qty::INVALID,
                    synthetic_order_id: crate::types::OrderId(0),
                    sequence: seq,
                },
            );
        }
        for (price, qty, change) in bid_changes {
            self.emit_level_change(state, Side::Bid, price, qty, change);
        }
        for (price, qty, change) in ask_changes {
            self.emit_level_change(state, Side::Ask, price, qty, change);
        }
        if let Some(trade) = tick.trade {
            let seq = Self::next_sequence(state);
            self.emit(
                state,
                MarketEvent {
                    kind: MarketEventKind::Trade,
                    instrument,
                    side: trade.side,
                    price: trade.price,
                    quantity: trade.quantity,
                    synthetic_order_id: synthetic_order_id(instrument, trade.price, trade.side),
                    sequence: seq,
                },
            );
        }
        if !was_initialized {
            let seq = Self::next_sequence(state);
            self.emit(
                state,
                MarketEvent {
                    kind: MarketEventKind::SnapshotEnd,
                    instrument,
                    side: Side::Invalid,
                    price: Price::INVALID,
                    quantity: Qty::INVALID,
                    synthetic_order_id: crate::types::OrderId(0),
                    sequence: seq,
                },
            );
        }
        state.book.initialized = true;
    }

    /// spec §4.2.5: force clear-and-resync on disconnect or any unrecoverable
    /// reconstructor error.
    pub fn handle_disconnect(&mut self, instrument: InstrumentId) -> SyncAction {
        self.subscribe(instrument);
        let state = self.states[instrument.index()].as_mut().unwrap();
        self.force_resync(state)
    }

    pub fn book(&self, instrument: InstrumentId) -> Option<&VenueOrderBook> {
        self.states[instrument.index()].as_ref().map(|s| &s.book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MarketEventKind as K;

    fn drain<const N: usize>(ring: &Ring<MarketEvent, N>) -> Vec<MarketEvent> {
        let mut out = Vec::new();
        while let Some(e) = ring.try_pop() {
            out.push(e);
        }
        out
    }

    #[test]
    fn scenario_s1_diff_mode_cold_start() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut r = Reconstructor::new(&ring, 16);
        let inst = InstrumentId(0);
        r.subscribe(inst);

        r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 9,
                last_update_id: 10,
                bids: vec![],
                asks: vec![],
            },
        );
        r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 11,
                last_update_id: 12,
                bids: vec![(Price(100), Qty(8))],
                asks: vec![],
            },
        );
        r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 13,
                last_update_id: 13,
                bids: vec![],
                asks: vec![(Price(101), Qty::ZERO)],
            },
        );

        let action = r.on_diff_mode_snapshot(
            inst,
            DepthSnapshot {
                last_update_id: 10,
                bids: vec![(Price(100), Qty(5))],
                asks: vec![(Price(101), Qty(7))],
            },
        );
        assert_eq!(action, SyncAction::Continue);

        let events = drain(&ring);
        let kinds: Vec<K> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![K::SnapshotStart, K::Add, K::Add, K::SnapshotEnd, K::Modify, K::Cancel]
        );
        assert_eq!(events[4].price, Price(100));
        assert_eq!(events[4].quantity, Qty(8));
        assert_eq!(events[5].price, Price(101));

        let book = r.book(inst).unwrap();
        assert_eq!(book.best_bid().unwrap().qty, Qty(8));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn scenario_s2_gap_triggers_clear_and_resync() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut r = Reconstructor::new(&ring, 16);
        let inst = InstrumentId(1);
        r.on_diff_mode_snapshot(
            inst,
            DepthSnapshot {
                last_update_id: 10,
                bids: vec![(Price(100), Qty(5))],
                asks: vec![],
            },
        );
        drain(&ring);

        let action = r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 15,
                last_update_id: 15,
                bids: vec![(Price(999), Qty(1))],
                asks: vec![],
            },
        );
        assert_eq!(action, SyncAction::RequestSnapshot);
        let events = drain(&ring);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, K::Clear);
        assert!(!r.is_initialized(inst));
        assert!(r.book(inst).unwrap().best_bid().is_none(), "gap diff must not apply");
    }

    #[test]
    fn stale_snapshot_requests_fresh_snapshot() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut r = Reconstructor::new(&ring, 16);
        let inst = InstrumentId(2);
        r.subscribe(inst);
        r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 20,
                last_update_id: 21,
                bids: vec![],
                asks: vec![],
            },
        );
        let action = r.on_diff_mode_snapshot(
            inst,
            DepthSnapshot {
                last_update_id: 5,
                bids: vec![],
                asks: vec![],
            },
        );
        assert_eq!(action, SyncAction::RequestSnapshot);
    }

    #[test]
    fn never_publishes_crossed_book() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut r = Reconstructor::new(&ring, 16);
        let inst = InstrumentId(3);
        r.on_diff_mode_snapshot(
            inst,
            DepthSnapshot {
                last_update_id: 1,
                bids: vec![(Price(100), Qty(5))],
                asks: vec![(Price(101), Qty(5))],
            },
        );
        drain(&ring);
        let action = r.on_diff_mode_diff(
            inst,
            DepthDiff {
                first_update_id: 2,
                last_update_id: 2,
                bids: vec![(Price(105), Qty(1))],
                asks: vec![],
            },
        );
        assert_eq!(action, SyncAction::RequestSnapshot, "crossed book must force resync");
        assert!(r.book(inst).unwrap().best_bid().is_none(), "crossing update must be rolled back by clear");

        let events = drain(&ring);
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![K::Clear],
            "a crossing diff must publish only the resync CLEAR, never its own level changes"
        );
    }

    #[test]
    fn bounded_tick_never_publishes_crossed_book() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut r = Reconstructor::new(&ring, 16);
        let inst = InstrumentId(4);
        r.on_bounded_tick(
            inst,
            BoundedDepthTick {
                bids: vec![(Price(100), Qty(5))],
                asks: vec![(Price(101), Qty(5))],
                trade: None,
            },
        );
        drain(&ring);

        r.on_bounded_tick(
            inst,
            BoundedDepthTick {
                bids: vec![(Price(105), Qty(1))],
                asks: vec![(Price(101), Qty(5))],
                trade: None,
            },
        );

        assert!(!r.is_initialized(inst), "crossed tick must force re-initialization");
        assert!(r.book(inst).unwrap().best_bid().is_none(), "crossing tick must be rolled back by clear");

        let events = drain(&ring);
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![K::Clear],
            "a crossing tick must publish only the resync CLEAR, never its own level changes or trade"
        );
    }

    #[test]
    fn decimal_format_parses_fixed_point() {
        let fmt = VenueDecimalFormat {
            price_scale: 2,
            qty_scale: 8,
        };
        assert_eq!(fmt.parse_price("123.45"), Some(Price(12345)));
        assert_eq!(fmt.parse_price("100"), Some(Price(10000)));
        assert_eq!(fmt.parse_qty("0.00000001"), Some(Qty(1)));
    }

    #[test]
    fn synthetic_order_id_stable_across_repeated_events() {
        let inst = InstrumentId(7);
        let a = synthetic_order_id(inst, Price(12345), Side::Bid);
        let b = synthetic_order_id(inst, Price(12345), Side::Bid);
        assert_eq!(a, b);
        let c = synthetic_order_id(inst, Price(12345), Side::Ask);
        assert_ne!(a, c);
        let other_inst = synthetic_order_id(InstrumentId(8), Price(12345), Side::Bid);
        assert_ne!(a, other_inst);
    }
}
