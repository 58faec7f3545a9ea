//! Venue wire DTOs and their conversion to the reconstructor's domain types
//! (spec §4.3.3, §6 "conversions to/from venue strings happen only at
//! adapter boundaries").
//!
//! Grounded in `scrapers/binance_hardened_ingest.rs::parse_book_ticker`'s
//! manual JSON field extraction and `[price_str, qty_str]` level-array shape
//! (Binance depth-diff wire format), now expressed as `serde`-derived
//! structs rather than hand-rolled string scraping.

use serde::Deserialize;

use crate::book::{BoundedDepthTick, DepthDiff, DepthSnapshot, TradePrint, VenueDecimalFormat};
use crate::types::Side;

/// A single `[price_str, qty_str]` level, the shape Binance-style feeds use
/// for every level in a depth diff or snapshot.
#[derive(Debug, Deserialize)]
pub struct WireLevel(pub String, pub String);

fn convert_levels(levels: &[WireLevel], fmt: &VenueDecimalFormat) -> Option<Vec<(crate::types::Price, crate::types::Qty)>> {
    levels
        .iter()
        .map(|WireLevel(p, q)| Some((fmt.parse_price(p)?, fmt.parse_qty(q)?)))
        .collect()
}

/// One incremental depth-diff frame (spec §4.2.2 diff mode), `U`/`u` naming.
#[derive(Debug, Deserialize)]
pub struct DepthDiffWire {
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<WireLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<WireLevel>,
}

impl DepthDiffWire {
    pub fn into_diff(self, fmt: &VenueDecimalFormat) -> Option<DepthDiff> {
        Some(DepthDiff {
            first_update_id: self.first_update_id,
            last_update_id: self.last_update_id,
            bids: convert_levels(&self.bids, fmt)?,
            asks: convert_levels(&self.asks, fmt)?,
        })
    }
}

/// A REST depth-snapshot response body (spec §6).
#[derive(Debug, Deserialize)]
pub struct DepthSnapshotWire {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<WireLevel>,
    pub asks: Vec<WireLevel>,
}

impl DepthSnapshotWire {
    pub fn into_snapshot(self, fmt: &VenueDecimalFormat) -> Option<DepthSnapshot> {
        Some(DepthSnapshot {
            last_update_id: self.last_update_id,
            bids: convert_levels(&self.bids, fmt)?,
            asks: convert_levels(&self.asks, fmt)?,
        })
    }
}

/// A single trade print frame.
#[derive(Debug, Deserialize)]
pub struct TradeWire {
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub qty: String,
    /// `true` if the buyer was the resting (maker) side: the print's
    /// aggressor was therefore a sell.
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl TradeWire {
    pub fn into_print(self, fmt: &VenueDecimalFormat) -> Option<TradePrint> {
        Some(TradePrint {
            side: if self.is_buyer_maker { Side::Ask } else { Side::Bid },
            price: fmt.parse_price(&self.price)?,
            quantity: fmt.parse_qty(&self.qty)?,
        })
    }
}

/// A bounded-depth full-picture tick (spec §4.2.2 snapshot-replace mode).
#[derive(Debug, Deserialize)]
pub struct BoundedDepthTickWire {
    pub bids: Vec<WireLevel>,
    pub asks: Vec<WireLevel>,
    pub trade: Option<TradeWire>,
}

impl BoundedDepthTickWire {
    pub fn into_tick(self, fmt: &VenueDecimalFormat) -> Option<BoundedDepthTick> {
        let trade = match self.trade {
            Some(t) => Some(t.into_print(fmt)?),
            None => None,
        };
        Some(BoundedDepthTick {
            bids: convert_levels(&self.bids, fmt)?,
            asks: convert_levels(&self.asks, fmt)?,
            trade,
        })
    }
}

/// Combined-stream envelope: `{"stream": "...", "data": {...}}`. The
/// `stream` suffix (`@depth`, `@trade`, ...) selects which payload shape to
/// deserialize `data` as (spec §4.3.3).
#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> VenueDecimalFormat {
        VenueDecimalFormat {
            price_scale: 2,
            qty_scale: 4,
        }
    }

    #[test]
    fn depth_diff_wire_converts_levels() {
        let raw = r#"{"U":10,"u":12,"b":[["100.50","2.0000"]],"a":[["101.00","0.0000"]]}"#;
        let wire: DepthDiffWire = serde_json::from_str(raw).unwrap();
        let diff = wire.into_diff(&fmt()).unwrap();
        assert_eq!(diff.first_update_id, 10);
        assert_eq!(diff.bids[0].0, crate::types::Price(10050));
        assert_eq!(diff.asks[0].1, crate::types::Qty::ZERO);
    }

    #[test]
    fn trade_wire_maps_buyer_maker_to_ask_aggressor() {
        let raw = r#"{"p":"50.00","q":"1.0000","m":true}"#;
        let wire: TradeWire = serde_json::from_str(raw).unwrap();
        let print = wire.into_print(&fmt()).unwrap();
        assert_eq!(print.side, Side::Ask);
    }

    #[test]
    fn stream_envelope_parses_generic_shape() {
        let raw = r#"{"stream":"btcusdt@depth","data":{"U":1,"u":2,"b":[],"a":[]}}"#;
        let env: StreamEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.stream, "btcusdt@depth");
        let diff: DepthDiffWire = serde_json::from_value(env.data).unwrap();
        assert_eq!(diff.last_update_id, 2);
    }
}
