//! Deterministic paper-trading simulator (spec §4.4.4).
//!
//! Grounded in `backtest_v2/latency.rs` (`LatencyDistribution::sample`'s
//! seeded-`StdRng` Box-Muller normal sampler, `WithTailSpikes`'s Bernoulli
//! gating) and `backtest_v2/benchmark.rs::SyntheticDataGenerator` (the
//! `rand_chacha::ChaCha8Rng::seed_from_u64` determinism pattern). Unlike
//! the teacher's `StdRng`-based latency model, the RNG here is
//! `ChaCha8Rng` specifically because spec §4.4.4 requires bit-identical
//! replay across process runs/platforms, which `StdRng`'s
//! unspecified-algorithm contract does not guarantee.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::RejectReason;
use crate::events::{ClientRequest, ClientRequestKind, ClientResponse, ClientResponseKind};
use crate::fabric::Ring;
use crate::gateway::table::{ActiveOrderTable, OrderState};
use crate::types::{ClientId, InstrumentId, OrderId, Price, Qty, Side};

/// spec §4.4.4: slippage model selector. `Fixed` returns a constant
/// multiplier of 1 so `slippage_factor` alone controls the shock; `Normal`
/// and `Pareto` are scaled the same way.
#[derive(Debug, Clone, Copy)]
pub enum SlippageModel {
    Fixed,
    Normal { std_dev: f64 },
    Pareto { shape: f64 },
}

impl SlippageModel {
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        match self {
            SlippageModel::Fixed => 1.0,
            SlippageModel::Normal { std_dev } => sample_normal(rng, 0.0, *std_dev),
            SlippageModel::Pareto { shape } => sample_pareto(rng, *shape),
        }
    }
}

/// Box-Muller normal sample, same derivation as
/// `backtest_v2::latency::sample_normal`.
fn sample_normal(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Inverse-CDF sample from a standard Pareto(shape), shifted so the
/// support starts at 0 (`Pareto(1, shape) - 1`) rather than 1: a slippage
/// shock of 0 should be the minimum, not 1.
fn sample_pareto(rng: &mut ChaCha8Rng, shape: f64) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    (1.0 - u).powf(-1.0 / shape) - 1.0
}

/// spec §4.4.4 tunables, plus the seed spec requires be "observable" for
/// bit-identical replay.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub client_id: ClientId,
    pub fill_probability: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub slippage_model: SlippageModel,
    pub slippage_factor: f64,
    pub seed: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            client_id: ClientId(0),
            fill_probability: 0.95,
            min_latency_ms: 1,
            max_latency_ms: 25,
            slippage_model: SlippageModel::Fixed,
            slippage_factor: 0.0,
            seed: 0,
        }
    }
}

struct PendingExecution {
    order_id: OrderId,
    client_id: ClientId,
    instrument: InstrumentId,
    side: Side,
    price: Price,
    quantity: Qty,
    due_at: Instant,
    will_fill: bool,
    slippage: f64,
}

/// One paper-trading instance. Drives the same ring-based request/response
/// contract a live gateway would (spec §6 strategy boundary), but never
/// touches the network: NEW/CANCEL are answered purely from sampled RNG
/// state. The RNG only advances in `on_request`, never in `poll_due`, so
/// replay determinism depends only on the order requests arrive in, not on
/// wall-clock polling cadence.
pub struct PaperGateway {
    config: PaperConfig,
    rng: ChaCha8Rng,
    table: ActiveOrderTable,
    pending: Vec<PendingExecution>,
    sequence: u64,
}

impl PaperGateway {
    pub fn new(config: PaperConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            table: ActiveOrderTable::new(),
            pending: Vec::new(),
            sequence: 0,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn response(
        &mut self,
        kind: ClientResponseKind,
        client_id: ClientId,
        instrument: InstrumentId,
        order_id: OrderId,
        side: Side,
        price: Price,
        executed_quantity: Qty,
        leaves_quantity: Qty,
        reject_reason: Option<RejectReason>,
    ) -> ClientResponse {
        ClientResponse {
            kind,
            client_id,
            instrument,
            order_id,
            side,
            price,
            executed_quantity,
            leaves_quantity,
            reject_reason,
            sequence: self.next_sequence(),
        }
    }

    /// spec §4.4.1/§4.4.4: process one request, return zero or more
    /// responses to publish (always zero or one here; NEW emits ACCEPTED
    /// immediately, the fill/cancel outcome arrives later from
    /// `poll_due`).
    pub fn on_request(&mut self, req: ClientRequest, now: Instant) -> Vec<ClientResponse> {
        if req.client_id != self.config.client_id {
            return Vec::new();
        }
        match req.kind {
            ClientRequestKind::New => self.on_new(req, now),
            ClientRequestKind::Cancel => vec![self.on_cancel(req)],
        }
    }

    fn on_new(&mut self, req: ClientRequest, now: Instant) -> Vec<ClientResponse> {
        if !req.is_locally_valid() {
            let reason = if !req.quantity.is_valid() || req.quantity.0 == 0 {
                RejectReason::InvalidQuantity
            } else {
                RejectReason::InvalidPrice
            };
            return vec![self.response(
                ClientResponseKind::Rejected,
                req.client_id,
                req.instrument,
                req.order_id,
                req.side,
                req.price,
                Qty::ZERO,
                req.quantity,
                Some(reason),
            )];
        }

        self.table
            .insert_pending(req.order_id, req.client_id, req.instrument, req.side, req.price, req.quantity);
        self.table.update_progress(req.order_id, OrderState::Live, Qty::ZERO);

        let accepted = self.response(
            ClientResponseKind::Accepted,
            req.client_id,
            req.instrument,
            req.order_id,
            req.side,
            req.price,
            Qty::ZERO,
            req.quantity,
            None,
        );

        let latency_ms = if self.config.max_latency_ms > self.config.min_latency_ms {
            self.rng.gen_range(self.config.min_latency_ms..=self.config.max_latency_ms)
        } else {
            self.config.min_latency_ms
        };
        let will_fill = self.rng.gen::<f64>() < self.config.fill_probability;
        let slippage = if will_fill {
            self.config.slippage_factor * self.config.slippage_model.sample(&mut self.rng)
        } else {
            0.0
        };

        self.pending.push(PendingExecution {
            order_id: req.order_id,
            client_id: req.client_id,
            instrument: req.instrument,
            side: req.side,
            price: req.price,
            quantity: req.quantity,
            due_at: now + Duration::from_millis(latency_ms),
            will_fill,
            slippage,
        });

        vec![accepted]
    }

    fn on_cancel(&mut self, req: ClientRequest) -> ClientResponse {
        if let Some(idx) = self.pending.iter().position(|p| p.order_id == req.order_id) {
            let pending = self.pending.remove(idx);
            self.table.update_progress(req.order_id, OrderState::Canceled, Qty::ZERO);
            self.table.remove(req.order_id);
            return self.response(
                ClientResponseKind::Canceled,
                req.client_id,
                pending.instrument,
                req.order_id,
                pending.side,
                pending.price,
                Qty::ZERO,
                pending.quantity,
                None,
            );
        }
        let known = self.table.get(req.order_id);
        self.response(
            ClientResponseKind::CancelRejected,
            req.client_id,
            known.as_ref().map(|r| r.instrument).unwrap_or(req.instrument),
            req.order_id,
            known.as_ref().map(|r| r.side).unwrap_or(req.side),
            known.as_ref().map(|r| r.price).unwrap_or(req.price),
            Qty::ZERO,
            Qty::ZERO,
            Some(RejectReason::VenueErrorOther),
        )
    }

    /// Execute every pending order whose scheduled time has arrived (spec
    /// §4.4.4 steps 2-4).
    pub fn poll_due(&mut self, now: Instant) -> Vec<ClientResponse> {
        let mut due = Vec::new();
        self.pending.retain(|p| {
            if p.due_at <= now {
                due.push(PendingExecution {
                    order_id: p.order_id,
                    client_id: p.client_id,
                    instrument: p.instrument,
                    side: p.side,
                    price: p.price,
                    quantity: p.quantity,
                    due_at: p.due_at,
                    will_fill: p.will_fill,
                    slippage: p.slippage,
                });
                false
            } else {
                true
            }
        });

        let mut out = Vec::with_capacity(due.len());
        for p in due {
            if p.will_fill {
                let exec_price = Price(
                    ((p.price.0 as f64) * (1.0 + p.side.sign() as f64 * p.slippage)).round() as i64,
                );
                self.table.update_progress(p.order_id, OrderState::Filled, p.quantity);
                self.table.remove(p.order_id);
                out.push(self.response(
                    ClientResponseKind::Filled,
                    p.client_id,
                    p.instrument,
                    p.order_id,
                    p.side,
                    exec_price,
                    p.quantity,
                    Qty::ZERO,
                    None,
                ));
            } else {
                self.table.update_progress(p.order_id, OrderState::Canceled, Qty::ZERO);
                self.table.remove(p.order_id);
                out.push(self.response(
                    ClientResponseKind::Canceled,
                    p.client_id,
                    p.instrument,
                    p.order_id,
                    p.side,
                    p.price,
                    Qty::ZERO,
                    p.quantity,
                    None,
                ));
            }
        }
        out
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cooperative run loop: drain `request_ring`, feed responses into
    /// `response_ring`, and check for due executions on every pass. Never
    /// blocks; sleeps briefly between empty passes (spec §5: rings "never
    /// block; fail-and-return-later").
    pub fn run<const REQC: usize, const RESC: usize>(
        &mut self,
        request_ring: &Ring<ClientRequest, REQC>,
        response_ring: &Ring<ClientResponse, RESC>,
        running: &std::sync::atomic::AtomicBool,
    ) {
        use std::sync::atomic::Ordering;
        while running.load(Ordering::Relaxed) {
            let mut did_work = false;
            if let Some(req) = request_ring.try_pop() {
                did_work = true;
                for resp in self.on_request(req, Instant::now()) {
                    let _ = response_ring.try_push(resp);
                }
            }
            for resp in self.poll_due(Instant::now()) {
                did_work = true;
                let _ = response_ring.try_push(resp);
            }
            if !did_work {
                std::thread::sleep(Duration::from_micros(500));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_req(order_id: u64, instrument: u32, price: i64, qty: u64) -> ClientRequest {
        ClientRequest {
            kind: ClientRequestKind::New,
            client_id: ClientId(0),
            order_id: OrderId(order_id),
            instrument: InstrumentId(instrument),
            side: Side::Bid,
            price: Price(price),
            quantity: Qty(qty),
        }
    }

    fn cancel_req(order_id: u64) -> ClientRequest {
        ClientRequest {
            kind: ClientRequestKind::Cancel,
            client_id: ClientId(0),
            order_id: OrderId(order_id),
            instrument: InstrumentId(0),
            side: Side::Invalid,
            price: Price::INVALID,
            quantity: Qty::INVALID,
        }
    }

    #[test]
    fn scenario_s4_paper_fill() {
        let config = PaperConfig {
            fill_probability: 1.0,
            min_latency_ms: 10,
            max_latency_ms: 10,
            slippage_model: SlippageModel::Fixed,
            slippage_factor: 0.0,
            seed: 42,
            ..PaperConfig::default()
        };
        let mut gw = PaperGateway::new(config);
        let t0 = Instant::now();
        let responses = gw.on_request(new_req(1, 0, 100, 10), t0);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].kind, ClientResponseKind::Accepted);

        assert!(gw.poll_due(t0 + Duration::from_millis(9)).is_empty());
        let fills = gw.poll_due(t0 + Duration::from_millis(10));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].kind, ClientResponseKind::Filled);
        assert_eq!(fills[0].executed_quantity, Qty(10));
        assert_eq!(fills[0].price, Price(100));
    }

    #[test]
    fn scenario_s5_paper_cancel_race() {
        let config = PaperConfig {
            fill_probability: 1.0,
            min_latency_ms: 100,
            max_latency_ms: 100,
            seed: 7,
            ..PaperConfig::default()
        };
        let mut gw = PaperGateway::new(config);
        let t0 = Instant::now();
        let accepted = gw.on_request(new_req(5, 0, 100, 10), t0);
        assert_eq!(accepted[0].kind, ClientResponseKind::Accepted);

        let cancel_resp = gw.on_request(cancel_req(5), t0 + Duration::from_millis(50));
        assert_eq!(cancel_resp.len(), 1);
        assert_eq!(cancel_resp[0].kind, ClientResponseKind::Canceled);

        let later = gw.poll_due(t0 + Duration::from_millis(200));
        assert!(later.is_empty(), "canceled order must never subsequently fill");
    }

    #[test]
    fn accepted_always_precedes_terminal_response() {
        let config = PaperConfig {
            fill_probability: 0.5,
            min_latency_ms: 1,
            max_latency_ms: 5,
            seed: 123,
            ..PaperConfig::default()
        };
        let mut gw = PaperGateway::new(config);
        let t0 = Instant::now();
        for i in 0..20 {
            let resp = gw.on_request(new_req(i, 0, 100, 1), t0);
            assert_eq!(resp[0].kind, ClientResponseKind::Accepted);
        }
        let terms = gw.poll_due(t0 + Duration::from_millis(10));
        assert_eq!(terms.len(), 20);
        for r in terms {
            assert!(matches!(r.kind, ClientResponseKind::Filled | ClientResponseKind::Canceled));
        }
    }

    #[test]
    fn identical_seed_and_requests_yield_bit_identical_responses() {
        let make = || PaperConfig {
            fill_probability: 0.7,
            min_latency_ms: 1,
            max_latency_ms: 50,
            slippage_model: SlippageModel::Normal { std_dev: 0.001 },
            slippage_factor: 1.0,
            seed: 999,
            ..PaperConfig::default()
        };
        let requests: Vec<ClientRequest> = (0..10).map(|i| new_req(i, 0, 1000 + i as i64, 5)).collect();

        let run = |cfg: PaperConfig| {
            let mut gw = PaperGateway::new(cfg);
            let t0 = Instant::now();
            let mut out = Vec::new();
            for req in &requests {
                out.extend(gw.on_request(*req, t0));
            }
            out.extend(gw.poll_due(t0 + Duration::from_millis(100)));
            out
        };

        let a = run(make());
        let b = run(make());
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(b.iter()) {
            assert_eq!(ra.kind, rb.kind);
            assert_eq!(ra.order_id, rb.order_id);
            assert_eq!(ra.price, rb.price);
            assert_eq!(ra.executed_quantity, rb.executed_quantity);
            assert_eq!(ra.sequence, rb.sequence);
        }
    }

    #[test]
    fn cancel_of_unknown_order_is_rejected() {
        let mut gw = PaperGateway::new(PaperConfig::default());
        let resp = gw.on_request(cancel_req(404), Instant::now());
        assert_eq!(resp[0].kind, ClientResponseKind::CancelRejected);
    }
}
