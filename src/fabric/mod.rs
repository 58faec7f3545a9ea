//! The event fabric (spec §4.1): the lock-free primitives every other
//! subsystem communicates through. Three pieces, each usable independently:
//!
//! - [`ring`] — the SPSC bounded ring all cross-thread data paths use.
//! - [`pool`] — a preallocated object pool for single-threaded
//!   materialize/release patterns.
//! - [`logger`] — the hot-path-safe async logger built on top of a ring.

pub mod logger;
pub mod pool;
pub mod ring;

pub use logger::{LogHandle, Logger};
pub use pool::Pool;
pub use ring::Ring;
