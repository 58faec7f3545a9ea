//! Multi-venue trading core: process entry point (spec §1, §5).
//!
//! A thin binary. All behavior lives in the library (`trading_core`); this
//! file only wires the fabric rings together, starts one thread per
//! component per spec §5's scheduling model, and waits for a shutdown
//! signal:
//!   - one market-data I/O thread per venue (an `Ingestor` on its own
//!     current-thread tokio runtime),
//!   - one process-wide logger thread (`fabric::Logger`),
//!   - one gateway request thread and one gateway status-poller thread,
//!   - the REST calls a `BinanceGateway` makes run inline on its own
//!     request/status threads rather than a separate worker pool, since
//!     spec §5 permits a gateway thread to block on I/O.
//!
//! Shutdown is cooperative: a shared `Arc<AtomicBool>` is flipped on
//! SIGINT/SIGTERM, every thread observes it at its next poll point, and
//! `main` joins all of them before exiting. Exit code 0 on a clean join,
//! nonzero if any thread reports a fatal error (spec §6).

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use trading_core::book::VenueDecimalFormat;
use trading_core::events::{ClientRequest, ClientResponse, MarketEvent};
use trading_core::fabric::{Logger, Ring};
use trading_core::gateway::{ApiCredentials, BinanceGateway, GatewayConfig, PaperConfig, PaperGateway};
use trading_core::ingestor::{Ingestor, IngestorConfig, ReconstructionMode, VenueEndpoint};
use trading_core::InstrumentRegistry;

const MARKET_EVENT_RING_CAP: usize = 4096;
const CLIENT_REQUEST_RING_CAP: usize = 1024;
const CLIENT_RESPONSE_RING_CAP: usize = 1024;
const DIFF_BUFFER_CAP: usize = 64;

/// Which order gateway backend to run, selected by `TRADING_CORE_MODE`
/// (spec §4.4: "live and paper modes share the same request/response ring
/// contract").
enum GatewayMode {
    Paper,
    Live,
}

impl GatewayMode {
    fn from_env() -> Self {
        match env::var("TRADING_CORE_MODE").as_deref() {
            Ok("live") => GatewayMode::Live,
            _ => GatewayMode::Paper,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("trading_core=info".parse().unwrap()))
        .init();
}

/// Block the calling thread on SIGINT. Runs its own tiny current-thread
/// runtime since `main` itself isn't async (spec §5: the async runtime is
/// per-component, not process-wide).
fn wait_for_shutdown_signal() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build shutdown-signal runtime");
    rt.block_on(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c, shutting down anyway");
        }
    });
}

fn main() {
    init_tracing();
    info!("trading-core starting");

    let mut log_rings = Vec::new();
    let log_handle = Logger::new_handle(&mut log_rings);
    let log_path = env::var("TRADING_CORE_LOG_PATH").unwrap_or_else(|_| "trading-core.log".to_string());
    let logger = match Logger::start(&log_path, log_rings) {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to start hot-path logger");
            std::process::exit(1);
        }
    };
    // `log_handle` is issued to every hot-path thread below; kept here too
    // so this thread's own startup/shutdown lines land in the same file.
    let _ = &log_handle;

    let registry = Arc::new(InstrumentRegistry::new());
    let running = Arc::new(AtomicBool::new(true));

    // Rings are shared across threads for the process lifetime; `Box::leak`
    // gives them `'static` storage the same way `fabric::ring`'s own tests
    // do for cross-thread fixtures, without reaching for an `Arc` the
    // `Reconstructor`'s borrow-based API doesn't ask for.
    let market_ring: &'static Ring<MarketEvent, MARKET_EVENT_RING_CAP> = Box::leak(Box::new(Ring::new()));
    let request_ring: &'static Ring<ClientRequest, CLIENT_REQUEST_RING_CAP> = Box::leak(Box::new(Ring::new()));
    let response_ring: &'static Ring<ClientResponse, CLIENT_RESPONSE_RING_CAP> = Box::leak(Box::new(Ring::new()));

    let mut handles = Vec::new();

    handles.push(spawn_ingestor_thread(registry.clone(), running.clone(), market_ring));
    handles.push(spawn_market_event_consumer_thread(running.clone(), market_ring));

    match GatewayMode::from_env() {
        GatewayMode::Paper => {
            let (req, status) = spawn_paper_gateway_threads(running.clone(), request_ring, response_ring);
            handles.push(req);
            handles.push(status);
        }
        GatewayMode::Live => match spawn_live_gateway_threads(registry.clone(), running.clone(), request_ring, response_ring) {
            Ok((req, status)) => {
                handles.push(req);
                handles.push(status);
            }
            Err(e) => {
                error!(error = %e, "failed to start live gateway");
                running.store(false, Ordering::SeqCst);
                logger.stop();
                std::process::exit(1);
            }
        },
    }

    wait_for_shutdown_signal();
    info!("shutdown signal received, draining threads");
    running.store(false, Ordering::SeqCst);

    let mut exit_code = 0;
    for handle in handles {
        if handle.join().is_err() {
            exit_code = 1;
        }
    }

    logger.stop();
    info!(exit_code, "trading-core stopped");
    std::process::exit(exit_code);
}

/// One market-data I/O thread per venue (spec §5). Only a single Binance
/// venue is wired up here; additional venues are additional calls to this
/// function against their own `VenueEndpoint`/`Ingestor`.
fn spawn_ingestor_thread(
    registry: Arc<InstrumentRegistry>,
    running: Arc<AtomicBool>,
    market_ring: &'static Ring<MarketEvent, MARKET_EVENT_RING_CAP>,
) -> thread::JoinHandle<()> {
    let endpoint = VenueEndpoint {
        ws_url: env::var("TRADING_CORE_WS_URL").unwrap_or_else(|_| "wss://stream.binance.com:9443/stream".to_string()),
        rest_snapshot_url: env::var("TRADING_CORE_REST_URL")
            .unwrap_or_else(|_| "https://api.binance.com/api/v3/depth?symbol={symbol}&limit=1000".to_string()),
    };
    let mut config = IngestorConfig::from_env("TRADING_CORE_INGESTOR");
    config.diff_buffer_cap = DIFF_BUFFER_CAP;
    let decimal_fmt = VenueDecimalFormat { price_scale: 2, qty_scale: 8 };
    let symbols: Vec<String> = env::var("TRADING_CORE_SYMBOLS")
        .unwrap_or_else(|_| "btcusdt".to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .collect();

    thread::Builder::new()
        .name("ingestor-binance".into())
        .spawn(move || {
            let mut ingestor = match Ingestor::new(endpoint, config, ReconstructionMode::Diff, decimal_fmt, registry, market_ring) {
                Ok(i) => i,
                Err(e) => {
                    error!(error = %e, "failed to construct ingestor");
                    return;
                }
            };
            for symbol in &symbols {
                ingestor.subscribe(symbol);
            }
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build ingestor runtime");
            rt.block_on(ingestor.run(&running));
            info!("ingestor thread exiting");
        })
        .expect("failed to spawn ingestor thread")
}

/// Placeholder consumer (spec §6: a strategy layer owns this ring past
/// this point). Drains the ring so it never backs up with nobody
/// reading; a real strategy thread replaces this entirely.
fn spawn_market_event_consumer_thread(
    running: Arc<AtomicBool>,
    market_ring: &'static Ring<MarketEvent, MARKET_EVENT_RING_CAP>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("market-event-sink".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                if market_ring.try_pop().is_none() {
                    thread::sleep(std::time::Duration::from_micros(500));
                }
            }
        })
        .expect("failed to spawn market-event consumer thread")
}

fn spawn_paper_gateway_threads(
    running: Arc<AtomicBool>,
    request_ring: &'static Ring<ClientRequest, CLIENT_REQUEST_RING_CAP>,
    response_ring: &'static Ring<ClientResponse, CLIENT_RESPONSE_RING_CAP>,
) -> (thread::JoinHandle<()>, thread::JoinHandle<()>) {
    let config = PaperConfig::default();
    let gateway = Arc::new(parking_lot::Mutex::new(PaperGateway::new(config)));

    let req_gateway = gateway.clone();
    let req_running = running.clone();
    let req_handle = thread::Builder::new()
        .name("gateway-request-paper".into())
        .spawn(move || {
            req_gateway.lock().run(request_ring, response_ring, &req_running);
        })
        .expect("failed to spawn paper gateway request thread");

    // Paper mode has no separate venue to poll; `run` already drives both
    // the request loop and due-execution checks each pass, so the status
    // thread is a no-op join target kept only so the thread model matches
    // live mode's two-thread shape (spec §5).
    let status_handle = thread::Builder::new()
        .name("gateway-status-paper".into())
        .spawn(move || {})
        .expect("failed to spawn paper gateway status thread");

    (req_handle, status_handle)
}

fn spawn_live_gateway_threads(
    registry: Arc<InstrumentRegistry>,
    running: Arc<AtomicBool>,
    request_ring: &'static Ring<ClientRequest, CLIENT_REQUEST_RING_CAP>,
    response_ring: &'static Ring<ClientResponse, CLIENT_RESPONSE_RING_CAP>,
) -> anyhow::Result<(thread::JoinHandle<()>, thread::JoinHandle<()>)> {
    let creds = ApiCredentials {
        api_key: env::var("TRADING_CORE_API_KEY").unwrap_or_default(),
        api_secret: env::var("TRADING_CORE_API_SECRET").unwrap_or_default(),
    };
    let config = GatewayConfig {
        base_url: env::var("TRADING_CORE_VENUE_URL").unwrap_or_else(|_| GatewayConfig::default().base_url),
        ..GatewayConfig::default()
    };
    let gateway = Arc::new(BinanceGateway::new(config, creds, registry)?);

    let req_gateway = gateway.clone();
    let req_running = running.clone();
    let req_handle = thread::Builder::new()
        .name("gateway-request-live".into())
        .spawn(move || {
            req_gateway.run(request_ring, response_ring, &req_running);
        })
        .expect("failed to spawn live gateway request thread");

    let status_gateway = gateway;
    let status_running = running;
    let status_handle = thread::Builder::new()
        .name("gateway-status-live".into())
        .spawn(move || {
            status_gateway.run_status_poller(response_ring, &status_running);
        })
        .expect("failed to spawn live gateway status thread");

    Ok((req_handle, status_handle))
}
