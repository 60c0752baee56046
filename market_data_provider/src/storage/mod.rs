//! Bar persistence behind the [`BarSink`] trait.
//!
//! A sink is an append-only, timestamp-ordered consumer of bars. The
//! downloader asks it for the last persisted timestamp to resume an
//! interrupted acquisition, then appends strictly newer bars one by one, so
//! a crash mid-download never leaves duplicated or out-of-order rows behind.

pub mod jsonl;
pub mod memory;

use snafu::{Backtrace, Snafu};

use crate::models::bar::Bar;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// An error occurred while trying to write the data.
    #[snafu(display("Failed to write data: {message}"))]
    WriteError {
        message: String,
        backtrace: Backtrace,
    },

    /// An append would break the strictly-increasing timestamp order.
    #[snafu(display("Out-of-order append: {timestamp} is not after {last}"))]
    OutOfOrder {
        timestamp: i64,
        last: i64,
        backtrace: Backtrace,
    },

    /// A generic I/O error.
    #[snafu(display("I/O error: {source}"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Append-only destination for downloaded bars.
///
/// Implementations enforce strictly increasing timestamps across appends,
/// including across process restarts.
pub trait BarSink {
    /// Timestamp of the newest bar already persisted, if any.
    fn last_timestamp(&mut self) -> Result<Option<i64>, SinkError>;

    /// Appends one bar. Must be durable enough that a subsequent
    /// [`BarSink::last_timestamp`] from a fresh handle sees it.
    fn append(&mut self, bar: &Bar) -> Result<(), SinkError>;
}
