//! Connection lifecycle state machine, backoff, and heartbeat monitoring
//! (spec §4.3.1, §4.3.4).
//!
//! Grounded in `scrapers/binance_session.rs`: `SessionState`'s linear
//! `Init → Connecting → Subscribing → Streaming → Reconnecting` shape becomes
//! the spec's exact `DISCONNECTED → RESOLVING → CONNECTING →
//! TLS_HANDSHAKE → WS_HANDSHAKE → CONNECTED` chain, and `BackoffCalculator`'s
//! xorshift64 jitter and `HeartbeatMonitor`'s ping/pong/stale-data tracking
//! are carried over unchanged in shape.

use std::time::{Duration, Instant};

/// spec §4.3.1. Any state can fail back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Resolving,
    Connecting,
    TlsHandshake,
    WsHandshake,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Resolving => "RESOLVING",
            Self::Connecting => "CONNECTING",
            Self::TlsHandshake => "TLS_HANDSHAKE",
            Self::WsHandshake => "WS_HANDSHAKE",
            Self::Connected => "CONNECTED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectFailed,
    HandshakeFailed,
    SubscribeFailed,
    PongTimeout,
    DataStale,
    ServerClose,
    NetworkError,
    ShutdownRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConnectFailed => "connect_failed",
            Self::HandshakeFailed => "handshake_failed",
            Self::SubscribeFailed => "subscribe_failed",
            Self::PongTimeout => "pong_timeout",
            Self::DataStale => "data_stale",
            Self::ServerClose => "server_close",
            Self::NetworkError => "network_error",
            Self::ShutdownRequested => "shutdown_requested",
        };
        write!(f, "{s}")
    }
}

/// Tunables for one venue connection (spec §4.3.1, §4.3.4, §4.3.5).
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub connect_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub stale_data_timeout_ms: u64,
    pub missed_heartbeat_limit: u32,
    pub rest_min_interval_ms: u64,
    pub rest_retry_cap: u32,
    pub rest_timeout_ms: u64,
    pub diff_buffer_cap: usize,
    pub depth_snapshot_limit: u32,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 100,
            backoff_max_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.3,
            connect_timeout_ms: 10_000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            stale_data_timeout_ms: 5_000,
            missed_heartbeat_limit: 3,
            rest_min_interval_ms: 250,
            rest_retry_cap: 5,
            rest_timeout_ms: 30_000,
            diff_buffer_cap: 1_000,
            depth_snapshot_limit: 1_000,
        }
    }
}

impl IngestorConfig {
    pub fn from_env(prefix: &str) -> Self {
        let mut c = Self::default();
        let var = |name: &str| std::env::var(format!("{prefix}_{name}")).ok();
        if let Some(v) = var("BACKOFF_BASE_MS") {
            c.backoff_base_ms = v.parse().unwrap_or(c.backoff_base_ms);
        }
        if let Some(v) = var("BACKOFF_MAX_MS") {
            c.backoff_max_ms = v.parse().unwrap_or(c.backoff_max_ms);
        }
        if let Some(v) = var("PING_INTERVAL_MS") {
            c.ping_interval_ms = v.parse().unwrap_or(c.ping_interval_ms);
        }
        if let Some(v) = var("STALE_DATA_TIMEOUT_MS") {
            c.stale_data_timeout_ms = v.parse().unwrap_or(c.stale_data_timeout_ms);
        }
        if let Some(v) = var("REST_MIN_INTERVAL_MS") {
            c.rest_min_interval_ms = v.parse().unwrap_or(c.rest_min_interval_ms);
        }
        c
    }
}

/// Exponential backoff with jitter (spec §4.3.1 "bounded exponential backoff
/// capped at a configured ceiling"). Same xorshift64 jitter source as the
/// teacher so reconnect storms spread out without pulling in a full `rand`
/// dependency on this hot-ish reconnect path.
#[derive(Debug)]
pub struct BackoffCalculator {
    base_ms: f64,
    max_ms: f64,
    multiplier: f64,
    jitter_factor: f64,
    attempt: u32,
    rng_state: u64,
}

impl BackoffCalculator {
    pub fn new(config: &IngestorConfig) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15);
        Self {
            base_ms: config.backoff_base_ms as f64,
            max_ms: config.backoff_max_ms as f64,
            multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
            attempt: 0,
            rng_state: seed | 1,
        }
    }

    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }

    pub fn next_backoff(&mut self) -> Duration {
        let base = self.base_ms * self.multiplier.powi(self.attempt as i32);
        let capped = base.min(self.max_ms);
        let jitter_range = capped * self.jitter_factor;
        let jitter = (self.next_random() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(self.base_ms);
        self.attempt += 1;
        Duration::from_millis(final_ms as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Ok,
    SendPing,
    Disconnect(DisconnectReason),
}

/// spec §4.3.4: heartbeat frames are liveness signals only; missed
/// heartbeats or stale market data within the configured window force a
/// disconnect.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    ping_interval: Duration,
    pong_timeout: Duration,
    stale_timeout: Duration,
    missed_limit: u32,
    last_ping_sent: Option<Instant>,
    awaiting_pong: bool,
    last_data_received: Instant,
    missed_heartbeats: u32,
}

impl HeartbeatMonitor {
    pub fn new(config: &IngestorConfig, now: Instant) -> Self {
        Self {
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            pong_timeout: Duration::from_millis(config.pong_timeout_ms),
            stale_timeout: Duration::from_millis(config.stale_data_timeout_ms),
            missed_limit: config.missed_heartbeat_limit,
            last_ping_sent: None,
            awaiting_pong: false,
            last_data_received: now,
            missed_heartbeats: 0,
        }
    }

    /// Any market-data frame, or a venue heartbeat frame, counts as liveness.
    pub fn on_data_received(&mut self, now: Instant) {
        self.last_data_received = now;
        self.missed_heartbeats = 0;
    }

    pub fn on_pong(&mut self, now: Instant) {
        self.awaiting_pong = false;
        self.last_data_received = now;
    }

    pub fn mark_ping_sent(&mut self, now: Instant) {
        self.last_ping_sent = Some(now);
        self.awaiting_pong = true;
    }

    pub fn check(&mut self, now: Instant) -> HeartbeatAction {
        if self.awaiting_pong {
            if let Some(sent) = self.last_ping_sent {
                if now.duration_since(sent) > self.pong_timeout {
                    self.missed_heartbeats += 1;
                    if self.missed_heartbeats >= self.missed_limit {
                        return HeartbeatAction::Disconnect(DisconnectReason::PongTimeout);
                    }
                }
            }
        }
        if now.duration_since(self.last_data_received) > self.stale_timeout {
            return HeartbeatAction::Disconnect(DisconnectReason::DataStale);
        }
        if !self.awaiting_pong {
            if let Some(sent) = self.last_ping_sent {
                if now.duration_since(sent) >= self.ping_interval {
                    return HeartbeatAction::SendPing;
                }
            } else {
                return HeartbeatAction::SendPing;
            }
        }
        HeartbeatAction::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = IngestorConfig {
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..IngestorConfig::default()
        };
        let mut b = BackoffCalculator::new(&config);
        let first = b.next_backoff();
        let second = b.next_backoff();
        assert!(second >= first, "backoff must not shrink without jitter");
        for _ in 0..10 {
            let d = b.next_backoff();
            assert!(d.as_millis() <= 1_000, "backoff must respect the ceiling");
        }
    }

    #[test]
    fn backoff_resets_attempt_counter() {
        let config = IngestorConfig::default();
        let mut b = BackoffCalculator::new(&config);
        b.next_backoff();
        b.next_backoff();
        assert_eq!(b.attempt(), 2);
        b.reset();
        assert_eq!(b.attempt(), 0);
    }

    #[test]
    fn stale_data_forces_disconnect() {
        let config = IngestorConfig {
            stale_data_timeout_ms: 10,
            ..IngestorConfig::default()
        };
        let t0 = Instant::now();
        let mut hb = HeartbeatMonitor::new(&config, t0);
        let later = t0 + Duration::from_millis(50);
        assert_eq!(
            hb.check(later),
            HeartbeatAction::Disconnect(DisconnectReason::DataStale)
        );
    }

    #[test]
    fn fresh_data_keeps_heartbeat_healthy() {
        let config = IngestorConfig {
            stale_data_timeout_ms: 10_000,
            ping_interval_ms: 10_000,
            ..IngestorConfig::default()
        };
        let t0 = Instant::now();
        let mut hb = HeartbeatMonitor::new(&config, t0);
        hb.on_data_received(t0 + Duration::from_millis(1));
        assert_eq!(hb.check(t0 + Duration::from_millis(2)), HeartbeatAction::Ok);
    }
}
