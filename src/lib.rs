//! Multi-venue trading core library.
//!
//! Four components share three kinds of lock-free value-carrying rings
//! (`fabric::Ring`): a book reconstructor (`book`) turns venue market-data
//! frames into normalized `MarketEvent`s, a venue ingestor (`ingestor`)
//! owns the socket/REST plumbing that feeds it, and an order gateway
//! (`gateway`) turns `ClientRequest`s into `ClientResponse`s against either
//! a live venue or a deterministic paper simulator. `types`/`events`/
//! `error` are the shared vocabulary; `registry` is the off-hot-path
//! symbol↔InstrumentId mapping table every other module depends on.

pub mod book;
pub mod error;
pub mod events;
pub mod fabric;
pub mod gateway;
pub mod ingestor;
pub mod registry;
pub mod types;

pub use error::{CoreError, RejectReason};
pub use events::{ClientRequest, ClientRequestKind, ClientResponse, ClientResponseKind, MarketEvent, MarketEventKind};
pub use fabric::{LogHandle, Logger, Pool, Ring};
pub use registry::InstrumentRegistry;
pub use types::{ClientId, InstrumentId, OrderId, Price, PriceLevel, Qty, Side, MAX_INSTRUMENTS};
