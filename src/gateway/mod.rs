//! Order gateway (spec §4.4): request loop, per-order state machine, live
//! REST/WS execution and a deterministic paper-trading simulator.
//!
//! Grounded in `backtest_v2/oms.rs` (`OrderState`, `OmsOrder` fill/cancel
//! bookkeeping) for the state machine shape, `backtest_v2/taker_slippage.rs`
//! / `backtest_v2/latency.rs` for the paper simulator's slippage and
//! seeded-RNG latency model, and `vault/execution.rs` (`sign_request`,
//! `auth_headers`) for the live REST signing shape.

pub mod bracket;
pub mod live;
pub mod paper;
pub mod signing;
pub mod table;

pub use bracket::{BracketManager, BracketParams, BracketState};
pub use live::{ApiCredentials, BinanceGateway, GatewayConfig};
pub use paper::{PaperConfig, PaperGateway, SlippageModel};
pub use table::{ActiveOrderTable, OrderRecord, OrderState};

use crate::types::{Price, Qty};

/// Per-symbol venue filters (spec §4.4.3): tick size, lot step, price band.
/// Grounded in `backtest_v2/matching::price_to_ticks`/`ticks_to_price`'s
/// exact-integer rounding, generalized from `f64` ticks to the core's
/// integer `Price`/`Qty`.
#[derive(Debug, Clone, Copy)]
pub struct SymbolFilter {
    pub tick_size: i64,
    pub lot_step: u64,
    pub min_qty: Qty,
    pub price_band: (Price, Price),
}

impl SymbolFilter {
    /// Round `qty` down to the nearest `lot_step`. Never rounds up: an
    /// order can't grow past what the client asked for.
    pub fn round_qty_to_lot(&self, qty: Qty) -> Qty {
        if self.lot_step == 0 {
            return qty;
        }
        Qty((qty.0 / self.lot_step) * self.lot_step)
    }

    /// Clamp `price` into `[band.0, band.1]`, snapped to the nearest tick.
    pub fn clamp_price_to_band(&self, price: Price) -> Price {
        let (lo, hi) = self.price_band;
        let clamped = price.0.clamp(lo.0, hi.0);
        if self.tick_size <= 1 {
            return Price(clamped);
        }
        let snapped = (clamped / self.tick_size) * self.tick_size;
        Price(snapped)
    }

    /// `true` if `price` sits strictly outside the configured band (spec
    /// §4.4.6 `PRICE_BAND_VIOLATION`).
    pub fn is_outside_band(&self, price: Price) -> bool {
        price.0 < self.price_band.0 .0 || price.0 > self.price_band.1 .0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_qty_to_lot_floors() {
        let f = SymbolFilter {
            tick_size: 1,
            lot_step: 10,
            min_qty: Qty(10),
            price_band: (Price(0), Price(1_000_000)),
        };
        assert_eq!(f.round_qty_to_lot(Qty(25)), Qty(20));
        assert_eq!(f.round_qty_to_lot(Qty(30)), Qty(30));
    }

    #[test]
    fn clamp_price_to_band_snaps_into_range() {
        let f = SymbolFilter {
            tick_size: 5,
            lot_step: 1,
            min_qty: Qty(1),
            price_band: (Price(100), Price(200)),
        };
        assert_eq!(f.clamp_price_to_band(Price(50)), Price(100));
        assert_eq!(f.clamp_price_to_band(Price(203)), Price(200));
        assert!(f.is_outside_band(Price(50)));
        assert!(!f.is_outside_band(Price(150)));
    }
}
