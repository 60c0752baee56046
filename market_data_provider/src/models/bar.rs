//! Canonical in-memory representation of a time-series bar (OHLCV).
//!
//! This struct is the standard output of every
//! [`Provider`](crate::providers::Provider) implementation, regardless of the
//! source's own wire format.

use serde::{Deserialize, Serialize};

/// A single OHLCV bar.
///
/// Values are normalized from the source but passed through as-is: the
/// `low <= open/close <= high` relationship is the source's responsibility
/// and is not re-validated here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar-open time, seconds since the Unix epoch (UTC).
    pub timestamp: i64,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume traded during the bar interval. Zero when the source does not
    /// report volume (some CFD feeds).
    pub volume: f64,
}
