//! Stream-type routing (spec §4.3.3: "routed by stream type ... unknown
//! stream types are counted and dropped").
//!
//! Grounded in `scrapers/binance_hardened_ingest.rs::ingest_loop`'s manual
//! `if text.contains("\"e\":\"depthUpdate\"")`-style branching, generalized
//! to a combined-stream `@suffix` classifier plus an explicit counter
//! instead of a silent `continue`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    DepthDiff,
    DepthSnapshotTick,
    Trade,
    Heartbeat,
    Unknown,
}

/// Classify a combined-stream name (`"btcusdt@depth"`, `"btcusdt@trade"`,
/// ...) by its suffix. Venues that multiplex everything under one stream
/// name instead route on a payload discriminator field before reaching this
/// point.
pub fn classify_stream(stream: &str) -> StreamKind {
    if stream.ends_with("@depth") || stream.contains("@depth@") {
        StreamKind::DepthDiff
    } else if stream.ends_with("@bookTicker") || stream.ends_with("@depth20") {
        StreamKind::DepthSnapshotTick
    } else if stream.ends_with("@trade") || stream.ends_with("@aggTrade") {
        StreamKind::Trade
    } else if stream.is_empty() || stream == "ping" || stream == "pong" {
        StreamKind::Heartbeat
    } else {
        StreamKind::Unknown
    }
}

/// Process-lifetime counters for dispatch outcomes (cold-path diagnostics,
/// not touched by the reconstructor itself).
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub depth_diffs: AtomicU64,
    pub depth_ticks: AtomicU64,
    pub trades: AtomicU64,
    pub heartbeats: AtomicU64,
    pub unknown: AtomicU64,
    pub parse_failures: AtomicU64,
}

impl DispatchStats {
    pub fn record(&self, kind: StreamKind) {
        let counter = match kind {
            StreamKind::DepthDiff => &self.depth_diffs,
            StreamKind::DepthSnapshotTick => &self.depth_ticks,
            StreamKind::Trade => &self.trades,
            StreamKind::Heartbeat => &self.heartbeats,
            StreamKind::Unknown => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }
}
