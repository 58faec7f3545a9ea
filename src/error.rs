//! The core's error taxonomy (spec §7): transient I/O, synchronization
//! failure, order rejection, and fatal/programmer errors. Categories 1 and
//! 2 are handled locally by the owning component and never surface to a
//! strategy; category 3 surfaces as a classified `ClientResponse`; category
//! 4 is non-recoverable.

use thiserror::Error;

/// Normalized reject reasons (spec §4.4.6). Venue-specific error codes are
/// mapped onto this set; the original code/message is logged but not
/// retained on the wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownInstrument,
    InvalidPrice,
    InvalidQuantity,
    PriceBandViolation,
    LotSizeViolation,
    RiskReject,
    RateLimit,
    VenueErrorOther,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::UnknownInstrument => "UNKNOWN_INSTRUMENT",
            RejectReason::InvalidPrice => "INVALID_PRICE",
            RejectReason::InvalidQuantity => "INVALID_QUANTITY",
            RejectReason::PriceBandViolation => "PRICE_BAND_VIOLATION",
            RejectReason::LotSizeViolation => "LOT_SIZE_VIOLATION",
            RejectReason::RiskReject => "RISK_REJECT",
            RejectReason::RateLimit => "RATE_LIMIT",
            RejectReason::VenueErrorOther => "VENUE_ERROR_OTHER",
        }
    }
}

/// The four-category error model. Categories 1/2 are recovered from
/// internally and logged; only `Fatal` ever propagates out of a
/// component's run loop.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient I/O: {0}")]
    Transient(String),

    #[error("synchronization failure: {0}")]
    Synchronization(String),

    #[error("order rejected: {0:?}")]
    OrderRejected(RejectReason),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Fatal(_))
    }
}
