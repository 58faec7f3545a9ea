//! Live REST execution gateway (spec §4.4.3).
//!
//! Grounded in `vault/execution.rs` (`PolymarketClobAdapter`: `reqwest`
//! client construction, `sign_request`/`auth_headers` shape) and
//! `scrapers/binance_hardened_ingest.rs` (thread naming, `Arc<AtomicBool>`
//! cooperative shutdown, `.context(...)`-annotated REST calls). Per
//! DESIGN.md's resolution of spec.md §9's `binance_order_gateway` vs
//! `binance_order_gateway_adapter` naming ambiguity, there is exactly one
//! gateway type here, `BinanceGateway` — no `_adapter` duplicate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RejectReason;
use crate::events::{ClientRequest, ClientRequestKind, ClientResponse, ClientResponseKind};
use crate::fabric::Ring;
use crate::gateway::bracket::{BracketManager, BracketParams};
use crate::gateway::signing::{canonicalize, sign_query};
use crate::gateway::table::{ActiveOrderTable, OrderState};
use crate::gateway::SymbolFilter;
use crate::registry::InstrumentRegistry;
use crate::types::{ClientId, InstrumentId, OrderId, Price, Qty, Side};

/// Pre-supplied credential material (spec §6: "Venue-specific signing key
/// material/credential acquisition remains external"). Nothing in this
/// crate fetches or refreshes these.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub client_id: ClientId,
    pub base_url: String,
    pub auth_header_name: &'static str,
    pub request_timeout_ms: u64,
    pub status_poll_interval_ms: u64,
    pub price_scale: u32,
    pub qty_scale: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: ClientId(0),
            base_url: "https://api.venue.example".to_string(),
            auth_header_name: "X-Auth-Key",
            request_timeout_ms: 30_000,
            status_poll_interval_ms: 1_000,
            price_scale: 2,
            qty_scale: 8,
        }
    }
}

impl GatewayConfig {
    fn fmt_price(&self, p: Price) -> String {
        format_fixed(p.0, self.price_scale)
    }

    fn fmt_qty(&self, q: Qty) -> String {
        format_fixed(q.0 as i64, self.qty_scale)
    }

    fn parse_qty(&self, s: &str) -> Option<Qty> {
        parse_fixed(s, self.qty_scale).map(|v| Qty(v.max(0) as u64))
    }
}

fn format_fixed(value: i64, scale: u32) -> String {
    let div = 10i64.pow(scale);
    let int_part = value / div;
    let frac_part = (value % div).abs();
    if scale == 0 {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part:0width$}", width = scale as usize)
    }
}

fn parse_fixed(s: &str, scale: u32) -> Option<i64> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    let int_val: i64 = int_part.parse().ok()?;
    let mut frac = frac_part.to_string();
    while (frac.len() as u32) < scale {
        frac.push('0');
    }
    frac.truncate(scale as usize);
    let frac_val: i64 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
    Some(int_val * 10i64.pow(scale) + frac_val)
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct NewOrderAck {
    #[serde(rename = "orderId")]
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct VenueErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
}

/// Venue error-code → normalized reject reason (spec §4.4.6). The mapping
/// is illustrative of a Binance-style venue; the original code/message is
/// always logged alongside the classified reason.
fn classify_venue_error(code: i64) -> RejectReason {
    match code {
        -1013 | -1100 | -1111 => RejectReason::InvalidQuantity,
        -1021 => RejectReason::RateLimit,
        -1003 => RejectReason::RateLimit,
        -2010 | -2019 => RejectReason::RiskReject,
        -1102 => RejectReason::InvalidPrice,
        -2011 => RejectReason::VenueErrorOther,
        _ => RejectReason::VenueErrorOther,
    }
}

fn venue_status_to_state(status: &str) -> OrderState {
    match status {
        "NEW" => OrderState::Live,
        "PARTIALLY_FILLED" => OrderState::PartiallyFilled,
        "FILLED" => OrderState::Filled,
        "CANCELED" | "EXPIRED" => OrderState::Canceled,
        "REJECTED" => OrderState::Rejected,
        _ => OrderState::Live,
    }
}

fn response_kind_for(state: OrderState) -> ClientResponseKind {
    match state {
        OrderState::PendingNew | OrderState::Live => ClientResponseKind::Accepted,
        OrderState::PartiallyFilled => ClientResponseKind::PartiallyFilled,
        OrderState::Filled => ClientResponseKind::Filled,
        OrderState::Canceled => ClientResponseKind::Canceled,
        OrderState::Rejected => ClientResponseKind::Rejected,
    }
}

/// One live venue connection. `registry` resolves `InstrumentId` to the
/// venue-native symbol string (spec §4.3.2); `table` is shared between the
/// request loop and the status-poller thread.
pub struct BinanceGateway {
    config: GatewayConfig,
    creds: ApiCredentials,
    http: Client,
    registry: std::sync::Arc<InstrumentRegistry>,
    table: std::sync::Arc<ActiveOrderTable>,
    filters: Mutex<HashMap<InstrumentId, SymbolFilter>>,
    brackets: Mutex<BracketManager>,
    sequence: std::sync::atomic::AtomicU64,
}

impl BinanceGateway {
    pub fn new(config: GatewayConfig, creds: ApiCredentials, registry: std::sync::Arc<InstrumentRegistry>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build REST client")?;
        Ok(Self {
            config,
            creds,
            http,
            registry,
            table: std::sync::Arc::new(ActiveOrderTable::new()),
            filters: Mutex::new(HashMap::new()),
            brackets: Mutex::new(BracketManager::new()),
            sequence: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn table(&self) -> std::sync::Arc<ActiveOrderTable> {
        self.table.clone()
    }

    pub fn register_filter(&self, instrument: InstrumentId, filter: SymbolFilter) {
        self.filters.lock().insert(instrument, filter);
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn sign_and_send(&self, method: &str, path: &str, fields: Vec<(&str, String)>) -> Result<serde_json::Value> {
        let query = canonicalize(fields.iter().map(|(k, v)| (*k, v.clone())));
        let signature = sign_query(&self.creds.api_secret, &query);
        let mut form = fields;
        form.push(("signature", signature));
        let url = format!("{}{}", self.config.base_url, path);
        let builder = match method {
            "POST" => self.http.post(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.get(&url),
        };
        let resp = builder
            .header(self.config.auth_header_name, &self.creds.api_key)
            .form(&form)
            .send()
            .with_context(|| format!("REST {method} {path} failed"))?;
        let body: serde_json::Value = resp.json().context("failed to parse venue response body")?;
        Ok(body)
    }

    /// spec §4.4.1: validate a request locally before dispatching on kind.
    fn reject_if_invalid(&self, req: &ClientRequest) -> Option<RejectReason> {
        if req.client_id != self.config.client_id {
            return Some(RejectReason::VenueErrorOther);
        }
        if !self.registry.is_registered(req.instrument) {
            return Some(RejectReason::UnknownInstrument);
        }
        if req.kind == ClientRequestKind::New {
            if !req.quantity.is_valid() || req.quantity.0 == 0 {
                return Some(RejectReason::InvalidQuantity);
            }
            if !req.price.is_valid() || req.price.0 <= 0 {
                return Some(RejectReason::InvalidPrice);
            }
            if let Some(filter) = self.filters.lock().get(&req.instrument) {
                if filter.is_outside_band(req.price) {
                    return Some(RejectReason::PriceBandViolation);
                }
            }
        }
        None
    }

    fn rejected(&self, req: &ClientRequest, reason: RejectReason) -> ClientResponse {
        warn!(order_id = req.order_id.0, ?reason, "order rejected pre-trade, no venue call made");
        ClientResponse {
            kind: ClientResponseKind::Rejected,
            client_id: req.client_id,
            instrument: req.instrument,
            order_id: req.order_id,
            side: req.side,
            price: req.price,
            executed_quantity: Qty::ZERO,
            leaves_quantity: req.quantity,
            reject_reason: Some(reason),
            sequence: self.next_sequence(),
        }
    }

    /// spec §4.4.1/§4.4.3: handle one `ClientRequest`, dispatching on kind.
    /// Blocks on the REST call; this is invoked from the gateway's own
    /// dedicated request thread, which spec §5 permits to block on I/O.
    pub fn handle_request(&self, req: ClientRequest) -> ClientResponse {
        if let Some(reason) = self.reject_if_invalid(&req) {
            return self.rejected(&req, reason);
        }
        match req.kind {
            ClientRequestKind::New => self.handle_new(req),
            ClientRequestKind::Cancel => self.handle_cancel(req),
        }
    }

    fn symbol_filter_adjusted(&self, instrument: InstrumentId, quantity: Qty) -> Result<Qty, RejectReason> {
        let filters = self.filters.lock();
        let Some(filter) = filters.get(&instrument) else {
            return Ok(quantity);
        };
        let adjusted = filter.round_qty_to_lot(quantity);
        if adjusted < filter.min_qty {
            return Err(RejectReason::LotSizeViolation);
        }
        if adjusted != quantity {
            info!(?instrument, original = quantity.0, adjusted = adjusted.0, "quantity rounded to lot step");
        }
        Ok(adjusted)
    }

    /// Build and POST a new-order REST request. `order_type` is `"LIMIT"`
    /// (the client-facing path, always carries `price`) or `"MARKET"` (the
    /// gateway-originated flatten path, spec §4.4.5 — no price to quote).
    fn place_new_order_rest(&self, instrument: InstrumentId, side: Side, quantity: Qty, price: Price, order_type: &str) -> Result<serde_json::Value> {
        let symbol = self.registry.symbol_for_instrument(instrument).unwrap_or_default();
        let mut fields = vec![
            ("symbol", symbol),
            ("side", side_str(side).to_string()),
            ("type", order_type.to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", self.config.fmt_qty(quantity)),
        ];
        if order_type == "LIMIT" {
            fields.push(("price", self.config.fmt_price(price)));
        }
        fields.push(("timestamp", now_ms().to_string()));
        self.sign_and_send("POST", "/api/v3/order", fields)
    }

    fn handle_new(&self, req: ClientRequest) -> ClientResponse {
        let quantity = match self.symbol_filter_adjusted(req.instrument, req.quantity) {
            Ok(q) => q,
            Err(reason) => return self.rejected(&req, reason),
        };
        self.table.insert_pending(req.order_id, req.client_id, req.instrument, req.side, req.price, quantity);

        match self.place_new_order_rest(req.instrument, req.side, quantity, req.price, "LIMIT") {
            Ok(body) => match serde_json::from_value::<NewOrderAck>(body.clone()) {
                Ok(ack) => {
                    self.table.mark_acked(req.order_id, ack.order_id);
                    let resp = ClientResponse {
                        kind: ClientResponseKind::Accepted,
                        client_id: req.client_id,
                        instrument: req.instrument,
                        order_id: req.order_id,
                        side: req.side,
                        price: req.price,
                        executed_quantity: Qty::ZERO,
                        leaves_quantity: quantity,
                        reject_reason: None,
                        sequence: self.next_sequence(),
                    };
                    self.brackets.lock().on_response(resp.order_id, resp.kind);
                    resp
                }
                Err(_) => {
                    self.table.remove(req.order_id);
                    let reason = match serde_json::from_value::<VenueErrorBody>(body) {
                        Ok(err) => {
                            warn!(code = err.code, msg = %err.msg, "venue rejected new order");
                            classify_venue_error(err.code)
                        }
                        Err(_) => RejectReason::VenueErrorOther,
                    };
                    let resp = self.rejected(&req, reason);
                    self.brackets.lock().on_response(resp.order_id, resp.kind);
                    resp
                }
            },
            Err(e) => {
                warn!(error = %e, "REST new-order call failed");
                self.table.remove(req.order_id);
                let resp = self.rejected(&req, RejectReason::VenueErrorOther);
                self.brackets.lock().on_response(resp.order_id, resp.kind);
                resp
            }
        }
    }

    /// spec §4.4.5: "on any leg rejection... the gateway issues a
    /// market-order to close any acquired position." `order_id` is the
    /// deterministic id the status poller derives from the bracket's entry
    /// id; this path never goes through `reject_if_invalid` (no client ever
    /// requested it, and a market order carries no limit price to validate).
    fn submit_market_close(&self, order_id: OrderId, client_id: ClientId, instrument: InstrumentId, side: Side, quantity: Qty) -> ClientResponse {
        let reject = |reason: RejectReason| ClientResponse {
            kind: ClientResponseKind::Rejected,
            client_id,
            instrument,
            order_id,
            side,
            price: Price::INVALID,
            executed_quantity: Qty::ZERO,
            leaves_quantity: quantity,
            reject_reason: Some(reason),
            sequence: self.next_sequence(),
        };
        if !self.registry.is_registered(instrument) {
            return reject(RejectReason::UnknownInstrument);
        }
        if quantity.0 == 0 {
            return reject(RejectReason::InvalidQuantity);
        }

        self.table.insert_pending(order_id, client_id, instrument, side, Price::INVALID, quantity);
        match self.place_new_order_rest(instrument, side, quantity, Price::INVALID, "MARKET") {
            Ok(body) => match serde_json::from_value::<NewOrderAck>(body.clone()) {
                Ok(ack) => {
                    self.table.mark_acked(order_id, ack.order_id);
                    ClientResponse {
                        kind: ClientResponseKind::Accepted,
                        client_id,
                        instrument,
                        order_id,
                        side,
                        price: Price::INVALID,
                        executed_quantity: Qty::ZERO,
                        leaves_quantity: quantity,
                        reject_reason: None,
                        sequence: self.next_sequence(),
                    }
                }
                Err(_) => {
                    self.table.remove(order_id);
                    let reason = match serde_json::from_value::<VenueErrorBody>(body) {
                        Ok(err) => {
                            warn!(code = err.code, msg = %err.msg, "venue rejected flatten market order");
                            classify_venue_error(err.code)
                        }
                        Err(_) => RejectReason::VenueErrorOther,
                    };
                    reject(reason)
                }
            },
            Err(e) => {
                warn!(error = %e, "REST flatten market-order call failed");
                self.table.remove(order_id);
                reject(RejectReason::VenueErrorOther)
            }
        }
    }

    fn handle_cancel(&self, req: ClientRequest) -> ClientResponse {
        let Some(venue_id) = self.table.venue_id_for(req.order_id) else {
            return ClientResponse {
                kind: ClientResponseKind::CancelRejected,
                client_id: req.client_id,
                instrument: req.instrument,
                order_id: req.order_id,
                side: req.side,
                price: Price::INVALID,
                executed_quantity: Qty::ZERO,
                leaves_quantity: Qty::ZERO,
                reject_reason: Some(RejectReason::VenueErrorOther),
                sequence: self.next_sequence(),
            };
        };
        let symbol = self.registry.symbol_for_instrument(req.instrument).unwrap_or_default();
        let fields = vec![
            ("symbol", symbol),
            ("orderId", venue_id.to_string()),
            ("timestamp", now_ms().to_string()),
        ];
        let record = self.table.get(req.order_id);
        match self.sign_and_send("DELETE", "/api/v3/order", fields) {
            Ok(_) => {
                self.table.remove(req.order_id);
                let resp = ClientResponse {
                    kind: ClientResponseKind::Canceled,
                    client_id: req.client_id,
                    instrument: req.instrument,
                    order_id: req.order_id,
                    side: record.as_ref().map(|r| r.side).unwrap_or(req.side),
                    price: record.as_ref().map(|r| r.price).unwrap_or(Price::INVALID),
                    executed_quantity: Qty::ZERO,
                    leaves_quantity: record.as_ref().map(|r| r.leaves_quantity()).unwrap_or(Qty::ZERO),
                    reject_reason: None,
                    sequence: self.next_sequence(),
                };
                self.brackets.lock().on_response(resp.order_id, resp.kind);
                resp
            }
            Err(e) => {
                warn!(error = %e, "REST cancel call failed");
                ClientResponse {
                    kind: ClientResponseKind::CancelRejected,
                    client_id: req.client_id,
                    instrument: req.instrument,
                    order_id: req.order_id,
                    side: req.side,
                    price: Price::INVALID,
                    executed_quantity: Qty::ZERO,
                    leaves_quantity: Qty::ZERO,
                    reject_reason: Some(RejectReason::VenueErrorOther),
                    sequence: self.next_sequence(),
                }
            }
        }
    }

    /// spec §4.4.3 status poller: iterate active orders, query venue
    /// status, emit a response only for orders whose `(state,
    /// executed_qty)` actually changed.
    pub fn poll_statuses(&self) -> Vec<ClientResponse> {
        let mut out = Vec::new();
        for record in self.table.active_orders() {
            let Some(venue_id) = record.venue_order_id else { continue };
            let symbol = self.registry.symbol_for_instrument(record.instrument).unwrap_or_default();
            let fields = vec![
                ("symbol", symbol),
                ("orderId", venue_id.to_string()),
                ("timestamp", now_ms().to_string()),
            ];
            let body = match self.sign_and_send("GET", "/api/v3/order", fields) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, order_id = record.order_id.0, "status poll failed");
                    continue;
                }
            };
            let Ok(status) = serde_json::from_value::<StatusBody>(body) else { continue };
            let Some(executed) = self.config.parse_qty(&status.executed_qty) else { continue };
            let new_state = venue_status_to_state(&status.status);

            if new_state == record.state && executed == record.executed_quantity {
                continue; // idempotent: no change since last emission
            }
            self.table.update_progress(record.order_id, new_state, executed);
            if new_state.is_terminal() {
                self.table.remove(record.order_id);
            }
            let kind = response_kind_for(new_state);
            self.brackets.lock().on_response(record.order_id, kind);
            out.push(ClientResponse {
                kind,
                client_id: record.client_id,
                instrument: record.instrument,
                order_id: record.order_id,
                side: record.side,
                price: record.price,
                executed_quantity: executed,
                leaves_quantity: record.original_quantity.saturating_sub(executed),
                reject_reason: if new_state == OrderState::Rejected {
                    Some(RejectReason::VenueErrorOther)
                } else {
                    None
                },
                sequence: self.next_sequence(),
            });
        }

        let bracket_events = self.brackets.lock().drain_fill_triggers();
        for params in bracket_events {
            out.extend(self.place_bracket_exits(params));
        }

        for order_id in self.brackets.lock().drain_cancel_requests() {
            if let Some(record) = self.table.get(order_id) {
                let cancel_req = ClientRequest {
                    kind: ClientRequestKind::Cancel,
                    client_id: record.client_id,
                    order_id,
                    instrument: record.instrument,
                    side: record.side,
                    price: Price::INVALID,
                    quantity: Qty::INVALID,
                };
                out.push(self.handle_request(cancel_req));
            }
        }

        for (entry_id, instrument, close_side, quantity) in self.brackets.lock().drain_flatten_requests() {
            // Distinct low bits from `exit_order_ids`'s `0b01`/`0b10` so a
            // flatten order id never collides with either exit leg's id.
            let flatten_order_id = OrderId(entry_id.0 << 2 | 0b11);
            warn!(?instrument, ?close_side, qty = quantity.0, "bracket exit leg rejected after entry fill; issuing market close");
            out.push(self.submit_market_close(flatten_order_id, self.config.client_id, instrument, close_side, quantity));
        }

        out
    }

    /// spec §4.4.5: record a bracket's three-leg intent and place the
    /// entry normally. Invoked directly by the caller (brackets are not
    /// carried on `ClientRequest`, which spec §3 defines with exactly the
    /// fields `{kind, client_id, order_id, instrument, side, price,
    /// quantity}`).
    pub fn submit_bracket(&self, entry_req: ClientRequest, params: BracketParams) -> ClientResponse {
        self.brackets.lock().track(entry_req.order_id, entry_req.instrument, entry_req.side, params);
        self.handle_request(entry_req)
    }

    fn place_bracket_exits(&self, params: crate::gateway::bracket::FilledEntry) -> Vec<ClientResponse> {
        let exit_side = params.side.opposite();
        let stop_req = ClientRequest {
            kind: ClientRequestKind::New,
            client_id: self.config.client_id,
            order_id: params.stop_order_id,
            instrument: params.instrument,
            side: exit_side,
            price: params.stop_loss_price,
            quantity: params.quantity,
        };
        let target_req = ClientRequest {
            kind: ClientRequestKind::New,
            client_id: self.config.client_id,
            order_id: params.target_order_id,
            instrument: params.instrument,
            side: exit_side,
            price: params.target_price,
            quantity: params.quantity,
        };
        vec![self.handle_request(stop_req), self.handle_request(target_req)]
    }

    /// Cooperative run loop for the request thread (spec §5: "a shared
    /// atomic flag terminates each thread at its next poll point").
    pub fn run<const REQC: usize, const RESC: usize>(
        &self,
        request_ring: &Ring<ClientRequest, REQC>,
        response_ring: &Ring<ClientResponse, RESC>,
        running: &AtomicBool,
    ) {
        while running.load(Ordering::Relaxed) {
            match request_ring.try_pop() {
                Some(req) => {
                    let resp = self.handle_request(req);
                    let _ = response_ring.try_push(resp);
                }
                None => std::thread::sleep(Duration::from_micros(500)),
            }
        }
    }

    /// Cooperative run loop for the status-poller thread (spec §4.4.3).
    pub fn run_status_poller<const RESC: usize>(&self, response_ring: &Ring<ClientResponse, RESC>, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            for resp in self.poll_statuses() {
                let _ = response_ring.try_push(resp);
            }
            std::thread::sleep(Duration::from_millis(self.config.status_poll_interval_ms));
        }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Bid => "BUY",
        Side::Ask => "SELL",
        Side::Invalid => "BUY",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_fixed_point_roundtrip() {
        assert_eq!(format_fixed(12345, 2), "123.45");
        assert_eq!(parse_fixed("123.45", 2), Some(12345));
        assert_eq!(parse_fixed("10", 2), Some(1000));
    }

    #[test]
    fn classify_venue_error_maps_known_codes() {
        assert_eq!(classify_venue_error(-1013), RejectReason::InvalidQuantity);
        assert_eq!(classify_venue_error(-2010), RejectReason::RiskReject);
        assert_eq!(classify_venue_error(-1021), RejectReason::RateLimit);
        assert_eq!(classify_venue_error(-9999), RejectReason::VenueErrorOther);
    }

    #[test]
    fn venue_status_maps_to_order_state() {
        assert_eq!(venue_status_to_state("FILLED"), OrderState::Filled);
        assert_eq!(venue_status_to_state("PARTIALLY_FILLED"), OrderState::PartiallyFilled);
        assert_eq!(venue_status_to_state("CANCELED"), OrderState::Canceled);
    }

    #[test]
    fn unregistered_instrument_is_rejected_without_network_call() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        let req = ClientRequest {
            kind: ClientRequestKind::New,
            client_id: ClientId(0),
            order_id: OrderId(1),
            instrument: InstrumentId(5),
            side: Side::Bid,
            price: Price(100),
            quantity: Qty(10),
        };
        let resp = gw.handle_request(req);
        assert_eq!(resp.kind, ClientResponseKind::Rejected);
        assert_eq!(resp.reject_reason, Some(RejectReason::UnknownInstrument));
    }

    #[test]
    fn scenario_s6_price_band_violation_rejected_locally() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        registry.register("BTCUSDT", None, InstrumentId(0));
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        gw.register_filter(
            InstrumentId(0),
            SymbolFilter {
                tick_size: 1,
                lot_step: 1,
                min_qty: Qty(1),
                price_band: (Price(100), Price(200)),
            },
        );
        let req = ClientRequest {
            kind: ClientRequestKind::New,
            client_id: ClientId(0),
            order_id: OrderId(1),
            instrument: InstrumentId(0),
            side: Side::Bid,
            price: Price(500),
            quantity: Qty(10),
        };
        let resp = gw.handle_request(req);
        assert_eq!(resp.kind, ClientResponseKind::Rejected);
        assert_eq!(resp.reject_reason, Some(RejectReason::PriceBandViolation));
    }

    #[test]
    fn lot_size_violation_rejected_when_adjusted_qty_below_minimum() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        registry.register("BTCUSDT", None, InstrumentId(0));
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        gw.register_filter(
            InstrumentId(0),
            SymbolFilter {
                tick_size: 1,
                lot_step: 10,
                min_qty: Qty(10),
                price_band: (Price(0), Price(1_000_000)),
            },
        );
        let req = ClientRequest {
            kind: ClientRequestKind::New,
            client_id: ClientId(0),
            order_id: OrderId(1),
            instrument: InstrumentId(0),
            side: Side::Bid,
            price: Price(100),
            quantity: Qty(5),
        };
        let resp = gw.handle_request(req);
        assert_eq!(resp.kind, ClientResponseKind::Rejected);
        assert_eq!(resp.reject_reason, Some(RejectReason::LotSizeViolation));
    }

    #[test]
    fn cancel_of_unmapped_order_is_rejected_without_network_call() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        registry.register("BTCUSDT", None, InstrumentId(0));
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        let req = ClientRequest {
            kind: ClientRequestKind::Cancel,
            client_id: ClientId(0),
            order_id: OrderId(123),
            instrument: InstrumentId(0),
            side: Side::Invalid,
            price: Price::INVALID,
            quantity: Qty::INVALID,
        };
        let resp = gw.handle_request(req);
        assert_eq!(resp.kind, ClientResponseKind::CancelRejected);
    }

    #[test]
    fn market_close_of_unregistered_instrument_rejected_without_network_call() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        let resp = gw.submit_market_close(OrderId(0b11), ClientId(0), InstrumentId(9), Side::Ask, Qty(5));
        assert_eq!(resp.kind, ClientResponseKind::Rejected);
        assert_eq!(resp.reject_reason, Some(RejectReason::UnknownInstrument));
    }

    #[test]
    fn market_close_of_zero_quantity_rejected_without_network_call() {
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        registry.register("BTCUSDT", None, InstrumentId(0));
        let gw = BinanceGateway::new(
            GatewayConfig::default(),
            ApiCredentials { api_key: "k".into(), api_secret: "s".into() },
            registry,
        )
        .unwrap();
        let resp = gw.submit_market_close(OrderId(0b11), ClientId(0), InstrumentId(0), Side::Ask, Qty::ZERO);
        assert_eq!(resp.kind, ClientResponseKind::Rejected);
        assert_eq!(resp.reject_reason, Some(RejectReason::InvalidQuantity));
    }
}
