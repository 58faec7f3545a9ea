//! Venue market-data ingestor (spec §4.3): drives one venue WebSocket
//! connection through its lifecycle, applies rate-limited REST snapshot
//! fetches, and feeds every frame to a `Reconstructor` that owns the actual
//! book state.
//!
//! Grounded in `scrapers/binance_hardened_ingest.rs::{ingest_loop,
//! run_connection}` — one tokio current-thread runtime per ingest thread,
//! a `tokio::select!` over the WS read half and a heartbeat tick, with the
//! reconnect loop itself driven by the outer `ConnectionState` machine
//! rather than buried inside the connection future.

pub mod dispatch;
pub mod state;
pub mod wire;

pub use dispatch::{classify_stream, DispatchStats, StreamKind};
pub use state::{BackoffCalculator, ConnectionState, DisconnectReason, HeartbeatAction, HeartbeatMonitor, IngestorConfig};
pub use wire::{BoundedDepthTickWire, DepthDiffWire, DepthSnapshotWire, StreamEnvelope, TradeWire, WireLevel};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::book::{Reconstructor, SyncAction, VenueDecimalFormat};
use crate::registry::InstrumentRegistry;
use crate::types::InstrumentId;

/// spec §4.2.2: diff mode and snapshot-replace mode are mutually exclusive
/// per connection, chosen once at construction from what the venue feed
/// actually offers for the subscribed instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionMode {
    Diff,
    SnapshotReplace,
}

/// Venue-specific URLs. `rest_snapshot_url` takes a `{symbol}` placeholder
/// (spec §6 "adapter boundary" — no venue string formatting leaks past this
/// module).
#[derive(Debug, Clone)]
pub struct VenueEndpoint {
    pub ws_url: String,
    pub rest_snapshot_url: String,
}

impl VenueEndpoint {
    fn snapshot_url_for(&self, symbol: &str) -> String {
        self.rest_snapshot_url.replace("{symbol}", symbol)
    }
}

/// One venue connection: WS lifecycle, REST snapshot fetch, and the
/// `Reconstructor` it feeds. `CAP` is the `MarketEvent` ring's capacity.
pub struct Ingestor<'a, const CAP: usize> {
    endpoint: VenueEndpoint,
    config: IngestorConfig,
    mode: ReconstructionMode,
    decimal_fmt: VenueDecimalFormat,
    registry: std::sync::Arc<InstrumentRegistry>,
    reconstructor: Reconstructor<'a, CAP>,
    stats: DispatchStats,
    http: reqwest::Client,
    next_instrument_id: u32,
    symbols: Vec<String>,
    last_rest_call: Option<Instant>,
    rest_failures: u32,
}

impl<'a, const CAP: usize> Ingestor<'a, CAP> {
    pub fn new(
        endpoint: VenueEndpoint,
        config: IngestorConfig,
        mode: ReconstructionMode,
        decimal_fmt: VenueDecimalFormat,
        registry: std::sync::Arc<InstrumentRegistry>,
        ring: &'a crate::fabric::Ring<crate::events::MarketEvent, CAP>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rest_timeout_ms))
            .build()
            .context("failed to build REST client")?;
        let diff_buffer_cap = config.diff_buffer_cap;
        Ok(Self {
            endpoint,
            config,
            mode,
            decimal_fmt,
            registry,
            reconstructor: Reconstructor::new(ring, diff_buffer_cap),
            stats: DispatchStats::default(),
            http,
            next_instrument_id: 0,
            symbols: Vec::new(),
            last_rest_call: None,
            rest_failures: 0,
        })
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Register a venue symbol (spec §4.3.2) and begin tracking its book.
    /// Idempotent for an already-registered symbol.
    pub fn subscribe(&mut self, symbol: &str) -> InstrumentId {
        if let Some(id) = self.registry.instrument_id_for_symbol(symbol) {
            self.reconstructor.subscribe(id);
            if !self.symbols.iter().any(|s| s == symbol) {
                self.symbols.push(symbol.to_string());
            }
            return id;
        }
        let id = InstrumentId(self.next_instrument_id);
        self.next_instrument_id += 1;
        self.registry.register(symbol, None, id);
        self.reconstructor.subscribe(id);
        self.symbols.push(symbol.to_string());
        id
    }

    fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .symbols
            .iter()
            .map(|s| {
                let suffix = match self.mode {
                    ReconstructionMode::Diff => "depth",
                    ReconstructionMode::SnapshotReplace => "bookTicker",
                };
                format!("{}@{}", s.to_lowercase(), suffix)
            })
            .collect();
        format!("{}/stream?streams={}", self.endpoint.ws_url, streams.join("/"))
    }

    fn instrument_for_stream(&self, stream: &str) -> Option<InstrumentId> {
        let symbol = stream.split('@').next()?;
        self.registry.instrument_id_for_symbol(&symbol.to_uppercase())
    }

    /// spec §4.3.5: "REST calls for a given venue are serialized behind a
    /// minimum inter-call interval". Sleeps out the remainder if called too
    /// soon after the previous REST call.
    async fn throttle_rest(&mut self) {
        if let Some(last) = self.last_rest_call {
            let min_interval = Duration::from_millis(self.config.rest_min_interval_ms);
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        self.last_rest_call = Some(Instant::now());
    }

    async fn fetch_snapshot(&mut self, instrument: InstrumentId, symbol: &str) -> Result<SyncAction> {
        self.throttle_rest().await;
        let url = self.endpoint.snapshot_url_for(symbol);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("REST snapshot fetch failed for {symbol}"))?
            .json::<wire::DepthSnapshotWire>()
            .await
            .with_context(|| format!("REST snapshot body for {symbol} did not parse"))?;
        let snapshot = resp
            .into_snapshot(&self.decimal_fmt)
            .context("REST snapshot contained a level this venue's decimal format could not parse")?;
        self.rest_failures = 0;
        Ok(self.reconstructor.on_diff_mode_snapshot(instrument, snapshot))
    }

    fn handle_text_frame(&mut self, text: &str) -> Vec<(InstrumentId, String)> {
        let Ok(envelope) = serde_json::from_str::<wire::StreamEnvelope>(text) else {
            self.stats.record_parse_failure();
            return Vec::new();
        };
        let kind = classify_stream(&envelope.stream);
        self.stats.record(kind);
        let Some(instrument) = self.instrument_for_stream(&envelope.stream) else {
            return Vec::new();
        };
        let symbol = envelope.stream.split('@').next().unwrap_or_default().to_uppercase();

        match (self.mode, kind) {
            (ReconstructionMode::Diff, StreamKind::DepthDiff) => {
                match serde_json::from_value::<wire::DepthDiffWire>(envelope.data) {
                    Ok(wire_diff) => match wire_diff.into_diff(&self.decimal_fmt) {
                        Some(diff) => {
                            if self.reconstructor.on_diff_mode_diff(instrument, diff) == SyncAction::RequestSnapshot {
                                return vec![(instrument, symbol)];
                            }
                        }
                        None => self.stats.record_parse_failure(),
                    },
                    Err(_) => self.stats.record_parse_failure(),
                }
            }
            (ReconstructionMode::SnapshotReplace, StreamKind::DepthSnapshotTick) => {
                match serde_json::from_value::<wire::BoundedDepthTickWire>(envelope.data) {
                    Ok(wire_tick) => match wire_tick.into_tick(&self.decimal_fmt) {
                        Some(tick) => self.reconstructor.on_bounded_tick(instrument, tick),
                        None => self.stats.record_parse_failure(),
                    },
                    Err(_) => self.stats.record_parse_failure(),
                }
            }
            _ => {}
        }
        Vec::new()
    }

    /// Run one connection attempt end to end: connect, wait for the first
    /// frame as a subscribe ack, then stream until disconnect. Returns the
    /// reason the connection ended so the caller can drive backoff.
    async fn run_connection(&mut self, running: &AtomicBool) -> Result<DisconnectReason> {
        let url = self.stream_url();
        debug!(url = %url, "ingestor connecting");

        let connect = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            tokio_tungstenite::connect_async(&url),
        )
        .await;
        let (ws_stream, _resp) = match connect {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(error = %e, "ws connect failed");
                return Ok(DisconnectReason::ConnectFailed);
            }
            Err(_) => return Ok(DisconnectReason::ConnectFailed),
        };
        let (mut write, mut read) = ws_stream.split();

        let subscribe_deadline = Duration::from_millis(self.config.connect_timeout_ms);
        match tokio::time::timeout(subscribe_deadline, read.next()).await {
            Ok(Some(Ok(_))) => info!("ingestor subscribed"),
            _ => return Ok(DisconnectReason::SubscribeFailed),
        }

        let now = Instant::now();
        let mut heartbeat = HeartbeatMonitor::new(&self.config, now);
        let mut ticker = tokio::time::interval(Duration::from_millis(250));

        loop {
            if !running.load(Ordering::Relaxed) {
                return Ok(DisconnectReason::ShutdownRequested);
            }

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.on_data_received(Instant::now());
                            let resyncs = self.handle_text_frame(&text);
                            for (instrument, symbol) in resyncs {
                                if let Err(e) = self.fetch_snapshot(instrument, &symbol).await {
                                    error!(error = %e, %symbol, "snapshot refetch failed");
                                    self.rest_failures += 1;
                                    if self.rest_failures > self.config.rest_retry_cap {
                                        return Ok(DisconnectReason::NetworkError);
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            heartbeat.on_data_received(Instant::now());
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => heartbeat.on_pong(Instant::now()),
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "ws server closed");
                            return Ok(DisconnectReason::ServerClose);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "ws read error");
                            return Ok(DisconnectReason::NetworkError);
                        }
                        None => return Ok(DisconnectReason::NetworkError),
                    }
                }
                _ = ticker.tick() => {
                    match heartbeat.check(Instant::now()) {
                        HeartbeatAction::Ok => {}
                        HeartbeatAction::SendPing => {
                            heartbeat.mark_ping_sent(Instant::now());
                            let _ = write.send(Message::Ping(Vec::new())).await;
                        }
                        HeartbeatAction::Disconnect(reason) => return Ok(reason),
                    }
                }
            }
        }
    }

    /// spec §4.2.5: on any disconnect, clear every subscribed instrument's
    /// book and mark it for a fresh resync on the next connection.
    fn reset_all_books(&mut self) {
        for symbol in self.symbols.clone() {
            if let Some(id) = self.registry.instrument_id_for_symbol(&symbol) {
                self.reconstructor.handle_disconnect(id);
            }
        }
    }

    /// Drive the full reconnect/backoff loop until `running` is cleared
    /// (spec §4.3.1). Runs on its own dedicated thread's tokio runtime.
    pub async fn run(&mut self, running: &AtomicBool) {
        let mut backoff = BackoffCalculator::new(&self.config);

        while running.load(Ordering::Relaxed) {
            let result = self.run_connection(running).await;
            self.reset_all_books();

            match result {
                Ok(DisconnectReason::ShutdownRequested) => break,
                Ok(reason) => {
                    warn!(%reason, "ingestor disconnected, backing off");
                    if !matches!(reason, DisconnectReason::ConnectFailed | DisconnectReason::SubscribeFailed) {
                        backoff.reset();
                    }
                    let wait = backoff.next_backoff();
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(error = %e, "ingestor connection attempt errored");
                    let wait = backoff.next_backoff();
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MarketEvent;
    use crate::fabric::Ring;

    fn make_ingestor(ring: &Ring<MarketEvent, 64>) -> Ingestor<'_, 64> {
        let endpoint = VenueEndpoint {
            ws_url: "wss://example.invalid".to_string(),
            rest_snapshot_url: "https://example.invalid/depth?symbol={symbol}".to_string(),
        };
        let registry = std::sync::Arc::new(InstrumentRegistry::new());
        Ingestor::new(
            endpoint,
            IngestorConfig::default(),
            ReconstructionMode::Diff,
            VenueDecimalFormat { price_scale: 2, qty_scale: 8 },
            registry,
            ring,
        )
        .unwrap()
    }

    #[test]
    fn subscribe_allocates_dense_instrument_ids() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut ing = make_ingestor(&ring);
        let a = ing.subscribe("BTCUSDT");
        let b = ing.subscribe("ETHUSDT");
        assert_ne!(a, b);
        assert_eq!(ing.subscribe("BTCUSDT"), a, "re-subscribing is idempotent");
    }

    #[test]
    fn stream_url_joins_depth_suffixes_for_diff_mode() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut ing = make_ingestor(&ring);
        ing.subscribe("BTCUSDT");
        ing.subscribe("ETHUSDT");
        let url = ing.stream_url();
        assert!(url.contains("btcusdt@depth"));
        assert!(url.contains("ethusdt@depth"));
    }

    #[test]
    fn instrument_for_stream_resolves_registered_symbol() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut ing = make_ingestor(&ring);
        let id = ing.subscribe("BTCUSDT");
        assert_eq!(ing.instrument_for_stream("btcusdt@depth"), Some(id));
        assert_eq!(ing.instrument_for_stream("dogeusdt@depth"), None);
    }

    #[test]
    fn unparsable_frame_is_counted_not_panicked() {
        let ring: Ring<MarketEvent, 64> = Ring::new();
        let mut ing = make_ingestor(&ring);
        ing.subscribe("BTCUSDT");
        let resyncs = ing.handle_text_frame("not json");
        assert!(resyncs.is_empty());
        assert_eq!(ing.stats().parse_failures.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
