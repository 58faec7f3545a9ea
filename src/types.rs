//! Primitive value types shared by every subsystem in the core.
//!
//! Everything here is a plain, `Copy` newtype. No floating point: prices and
//! quantities are exact integers in venue-native increments, converted from
//! wire strings only at adapter boundaries (see `book::VenueDecimalFormat`).

use std::fmt;

/// Upper bound on live instruments; also the capacity of any dense
/// per-instrument array (sequence counters, order books, subscription
/// state) indexed by `InstrumentId`.
pub const MAX_INSTRUMENTS: usize = 4096;

/// Fixed-point price in the venue's minimum price increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub i64);

impl Price {
    /// Sentinel distinguishing "no price" from a genuine zero price.
    pub const INVALID: Price = Price(i64::MIN);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Price::INVALID
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Price::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Non-negative quantity in the venue's lot unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qty(pub u64);

impl Qty {
    pub const ZERO: Qty = Qty(0);
    /// Sentinel distinguishing "no quantity" from a resting zero.
    pub const INVALID: Qty = Qty(u64::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Qty::INVALID
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Decrement by `fill`, saturating at zero. Returns the new remaining
    /// quantity; zero remaining means the order is done.
    #[inline]
    pub fn saturating_sub(self, fill: Qty) -> Qty {
        Qty(self.0.saturating_sub(fill.0))
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Qty::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Dense small integer identifying an instrument, used as an array index
/// on every hot path. The venue-native symbol string and venue-native
/// instrument token live in `registry::InstrumentRegistry`, off the hot
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrumentId(pub u32);

impl InstrumentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst#{}", self.0)
    }
}

/// Book side. `Invalid` appears only in trade records where the aggressor
/// side could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
    Invalid,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
            Side::Invalid => Side::Invalid,
        }
    }

    /// +1 for Bid, -1 for Ask; used by slippage sign conventions.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Side::Bid => 1,
            Side::Ask => -1,
            Side::Invalid => 0,
        }
    }

    #[inline]
    pub fn as_bit(self) -> u64 {
        match self {
            Side::Bid => 0,
            Side::Ask => 1,
            Side::Invalid => 1,
        }
    }
}

/// 64-bit order identifier. Real orders get one from the client/gateway
/// session; synthetic orders (materialized by the book reconstructor for
/// feeds with no per-order data) are deterministically derived from
/// `(InstrumentId, Price, Side)` — see `book::synthetic_order_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order#{}", self.0)
    }
}

/// Identifies a logical trading participant; present on every request and
/// response for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u32);

/// A single aggregated price level: all resting interest at one price on
/// one side of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Price,
    pub qty: Qty,
    pub order_count: u32,
    pub last_update_time: u64,
}

impl PriceLevel {
    pub fn new(price: Price, qty: Qty, order_count: u32, last_update_time: u64) -> Self {
        Self {
            price,
            qty,
            order_count,
            last_update_time,
        }
    }
}
