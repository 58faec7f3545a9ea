//! Echo consumer demo binary.
//!
//! Run with: cargo run --bin echo_consumer
//!
//! Exercises the strategy-facing side of the ring boundary (spec §6: "a
//! strategy logic is a consumer that holds non-owning references to an
//! event ring") without implementing any trading logic. Feeds the
//! scenario S1 cold-start sequence from spec §8 into a `Reconstructor`
//! on one thread and logs every `MarketEvent` a strategy would have
//! observed on another. This is not a strategy implementation — it makes
//! no order decisions — and stays out of the scope spec.md §9 reserves
//! for a strategy layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

use trading_core::book::{DepthDiff, DepthSnapshot, Reconstructor};
use trading_core::events::MarketEvent;
use trading_core::fabric::Ring;
use trading_core::{InstrumentId, Price, Qty};

const RING_CAP: usize = 256;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("echo_consumer=info".parse().unwrap()))
        .init();

    let ring: Ring<MarketEvent, RING_CAP> = Ring::new();
    let ring: &'static Ring<MarketEvent, RING_CAP> = Box::leak(Box::new(ring));
    let running = Arc::new(AtomicBool::new(true));

    let consumer_running = running.clone();
    let consumer = thread::spawn(move || {
        while consumer_running.load(Ordering::Relaxed) {
            match ring.try_pop() {
                Some(event) => info!(?event.kind, instrument = event.instrument.0, price = event.price.0, qty = event.quantity.0, seq = event.sequence, "market event"),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
    });

    let mut reconstructor = Reconstructor::new(ring, 16);
    let inst = InstrumentId(0);
    reconstructor.on_diff_mode_snapshot(
        inst,
        DepthSnapshot {
            last_update_id: 10,
            bids: vec![(Price(100), Qty(5))],
            asks: vec![(Price(101), Qty(7))],
        },
    );
    reconstructor.on_diff_mode_diff(
        inst,
        DepthDiff {
            first_update_id: 11,
            last_update_id: 12,
            bids: vec![(Price(100), Qty(8))],
            asks: vec![],
        },
    );
    reconstructor.on_diff_mode_diff(
        inst,
        DepthDiff {
            first_update_id: 13,
            last_update_id: 13,
            bids: vec![],
            asks: vec![(Price(101), Qty::ZERO)],
        },
    );

    thread::sleep(Duration::from_millis(50));
    running.store(false, Ordering::Relaxed);
    consumer.join().expect("echo consumer thread panicked");
}
