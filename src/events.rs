//! Normalized records that cross the strategy boundary (spec §3, §6).
//! `MarketEvent` flows strategy-ward through a `Ring<MarketEvent, N>`;
//! `ClientRequest`/`ClientResponse` flow between a strategy and the
//! gateway. All three are `Copy` so they can live directly in ring slots.

use crate::error::RejectReason;
use crate::types::{ClientId, InstrumentId, OrderId, Price, Qty, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEventKind {
    Add,
    Modify,
    Cancel,
    Trade,
    Clear,
    SnapshotStart,
    SnapshotEnd,
}

/// One normalized book/trade change, as a strategy would have seen it on
/// an ideal order-by-order feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketEvent {
    pub kind: MarketEventKind,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
    /// Deterministically derived from (instrument, price, side) for feeds
    /// with no per-order data — see `book::synthetic_order_id`.
    pub synthetic_order_id: OrderId,
    /// Strictly increasing per instrument, assigned on emission.
    pub sequence: u64,
}

impl MarketEvent {
    pub fn clear(instrument: InstrumentId, sequence: u64) -> Self {
        Self {
            kind: MarketEventKind::Clear,
            instrument,
            side: Side::Invalid,
            price: Price::INVALID,
            quantity: Qty::INVALID,
            synthetic_order_id: OrderId(0),
            sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRequestKind {
    New,
    Cancel,
}

/// A strategy's order intent, handed to the gateway over the request ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRequest {
    pub kind: ClientRequestKind,
    pub client_id: ClientId,
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
}

impl ClientRequest {
    /// Spec §3: "NEW requires positive quantity and (for limit orders)
    /// positive price; CANCEL references an order_id the client previously
    /// successfully placed." This checks the local, venue-agnostic part of
    /// that contract; venue filters (tick/lot/band) are checked separately
    /// by the gateway.
    pub fn is_locally_valid(&self) -> bool {
        match self.kind {
            ClientRequestKind::New => self.quantity.is_valid() && self.quantity.0 > 0 && self.price.is_valid() && self.price.0 > 0,
            ClientRequestKind::Cancel => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientResponseKind {
    Accepted,
    Filled,
    PartiallyFilled,
    Canceled,
    Rejected,
    CancelRejected,
}

/// The gateway's response to a `ClientRequest`, strictly ordered per
/// (gateway, client) via `sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientResponse {
    pub kind: ClientResponseKind,
    pub client_id: ClientId,
    pub instrument: InstrumentId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub executed_quantity: Qty,
    pub leaves_quantity: Qty,
    pub reject_reason: Option<RejectReason>,
    pub sequence: u64,
}

impl ClientResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ClientResponseKind::Filled
                | ClientResponseKind::Canceled
                | ClientResponseKind::Rejected
                | ClientResponseKind::CancelRejected
        )
    }
}
