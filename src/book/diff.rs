//! Diff-mode primitives (spec §4.2.2): a single incremental update plus the
//! per-instrument buffered-diff queue used while a book is uninitialized.
//!
//! Grounded in `backtest_v2/l2_delta.rs`'s `PolymarketL2Delta` (update-range
//! delta carrying first/last sequence plus per-side level replacements),
//! adapted from Polymarket's single-sequence model to the `(first_update_id,
//! last_update_id)` range Binance-style depth-diff feeds use.

use std::collections::VecDeque;

use crate::types::{Price, Qty};

/// One incremental depth update. `U`/`u` in spec §4.2.2 naming.
#[derive(Debug, Clone)]
pub struct DepthDiff {
    /// First update id covered by this diff (`U`).
    pub first_update_id: u64,
    /// Last update id covered by this diff (`u`).
    pub last_update_id: u64,
    /// `(price, new_quantity)` on the bid side; zero quantity cancels.
    pub bids: Vec<(Price, Qty)>,
    /// `(price, new_quantity)` on the ask side; zero quantity cancels.
    pub asks: Vec<(Price, Qty)>,
}

/// Bounded FIFO of diffs buffered while `VenueOrderBook::initialized` is
/// false. Exceeding `cap` is a §5 "hard cap" violation and signals the
/// caller to force a full resync rather than grow unbounded.
pub struct DiffBuffer {
    queue: VecDeque<DepthDiff>,
    cap: usize,
}

impl DiffBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            cap,
        }
    }

    /// Push a diff onto the buffer. Returns `false` if this push would
    /// exceed the configured cap; the caller must then force a resync
    /// (clear the book, discard the buffer, request a fresh snapshot).
    #[must_use]
    pub fn push(&mut self, diff: DepthDiff) -> bool {
        if self.queue.len() >= self.cap {
            return false;
        }
        self.queue.push_back(diff);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn front(&self) -> Option<&DepthDiff> {
        self.queue.front()
    }

    /// Discard every buffered diff whose `last_update_id <= snapshot_id`
    /// (spec §4.2.2 step 3).
    pub fn discard_through(&mut self, snapshot_id: u64) {
        while let Some(d) = self.queue.front() {
            if d.last_update_id <= snapshot_id {
                self.queue.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pop the next diff if it is the correct one to apply against
    /// `snapshot_id` per spec §4.2.2 step 4: `U <= snapshot_id + 1 <= u`.
    pub fn pop_first_applicable(&mut self, snapshot_id: u64) -> Option<DepthDiff> {
        let target = snapshot_id + 1;
        match self.queue.front() {
            Some(d) if d.first_update_id <= target && target <= d.last_update_id => {
                self.queue.pop_front()
            }
            _ => None,
        }
    }

    /// Pop the next diff only if it continues contiguously from `prev_u`
    /// (spec §4.2.2 step 5: `U == prev.u + 1`).
    pub fn pop_if_contiguous(&mut self, prev_u: u64) -> Option<DepthDiff> {
        match self.queue.front() {
            Some(d) if d.first_update_id == prev_u + 1 => self.queue.pop_front(),
            _ => None,
        }
    }
}
