//! Asynchronous, hot-path-safe logger (spec §4.1.3).
//!
//! Every producer thread gets its own `Ring<LogRecord, CAP>`. The hot path
//! only stamps fixed-size fields into a reserved slot — no allocation, no
//! I/O, never blocks. A dedicated logger thread drains every registered
//! ring round-robin and appends formatted lines to a file.
//!
//! This is distinct from the crate's `tracing` setup (see `main.rs`), which
//! covers cold-path/startup diagnostics; this module exists specifically
//! because the hot path cannot tolerate `tracing`'s allocation or
//! subscriber dispatch overhead.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::fabric::ring::Ring;

pub const LOG_RING_CAPACITY: usize = 4096;
const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// A single preallocated log line. Fixed size so it can live in a `Ring`
/// slot: the message is stamped byte-by-byte into a fixed buffer rather
/// than formatted into a heap `String`.
#[derive(Clone, Copy)]
pub struct LogRecord {
    pub timestamp_ns: u64,
    pub level: Level,
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    message: [u8; MAX_MESSAGE_LEN],
    message_len: u16,
}

impl LogRecord {
    pub fn new(
        timestamp_ns: u64,
        level: Level,
        file: &'static str,
        line: u32,
        function: &'static str,
        message: &str,
    ) -> Self {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let bytes = message.as_bytes();
        let len = bytes.len().min(MAX_MESSAGE_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            timestamp_ns,
            level,
            file,
            line,
            function,
            message: buf,
            message_len: len as u16,
        }
    }

    pub fn message(&self) -> &str {
        std::str::from_utf8(&self.message[..self.message_len as usize]).unwrap_or("<invalid utf8>")
    }
}

/// Handle a hot-path thread uses to stamp log records. Cheap to clone
/// (shares the underlying ring via `Arc`).
#[derive(Clone)]
pub struct LogHandle {
    ring: Arc<Ring<LogRecord, LOG_RING_CAPACITY>>,
}

impl LogHandle {
    /// Stamp a record into the ring. Never blocks; if the ring is full the
    /// record is silently dropped (the hot path never waits on the
    /// logger).
    #[inline]
    pub fn log(&self, level: Level, file: &'static str, line: u32, function: &'static str, message: &str) {
        let record = LogRecord::new(now_ns(), level, file, line, function, message);
        let _ = self.ring.try_push(record);
    }
}

fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Process-wide logger thread. Fixed per-line prefix: `time level
/// file:line function` (spec §6).
pub struct Logger {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Logger {
    /// Start the logger thread, draining `rings` round-robin and appending
    /// to `path`.
    pub fn start(
        path: impl AsRef<Path>,
        rings: Vec<Arc<Ring<LogRecord, LOG_RING_CAPACITY>>>,
    ) -> anyhow::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("core-logger".into())
            .spawn(move || Self::run(thread_running, rings, file))
            .expect("failed to spawn logger thread");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn run(running: Arc<AtomicBool>, rings: Vec<Arc<Ring<LogRecord, LOG_RING_CAPACITY>>>, file: File) {
        let mut writer = BufWriter::new(file);
        loop {
            let mut drained_any = false;
            for ring in &rings {
                while let Some(record) = ring.try_pop() {
                    drained_any = true;
                    let _ = writeln!(
                        writer,
                        "{} {} {}:{} {} {}",
                        record.timestamp_ns,
                        record.level.as_str(),
                        record.file,
                        record.line,
                        record.function,
                        record.message()
                    );
                }
            }
            if drained_any {
                let _ = writer.flush();
            } else if !running.load(Ordering::Relaxed) {
                break;
            } else {
                thread::sleep(Duration::from_micros(200));
            }
        }
        let _ = writer.flush();
    }

    /// Create a new producer ring and register it with this logger.
    /// Intended to be called once per hot-path thread at startup; the
    /// returned handle is then moved into that thread.
    pub fn new_handle(rings: &mut Vec<Arc<Ring<LogRecord, LOG_RING_CAPACITY>>>) -> LogHandle {
        let ring = Arc::new(Ring::new());
        rings.push(ring.clone());
        LogHandle { ring }
    }

    /// Cooperative shutdown: drain remaining records then join.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
