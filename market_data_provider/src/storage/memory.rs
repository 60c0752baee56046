//! In-memory sink for tests and embedders that post-process bars themselves.

use snafu::ensure;

use super::{BarSink, OutOfOrderSnafu, SinkError, WriteSnafu};
use crate::models::bar::Bar;

/// A [`BarSink`] backed by a `Vec`, with optional failure injection.
#[derive(Debug, Default)]
pub struct MemorySink {
    bars: Vec<Bar>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the sink as if `bars` had been persisted by an earlier run.
    pub fn with_existing(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            fail_after: None,
        }
    }

    /// Makes every append past the first `n` fail, for abort-path tests.
    pub fn failing_after(n: usize) -> Self {
        Self {
            bars: Vec::new(),
            fail_after: Some(n),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }
}

impl BarSink for MemorySink {
    fn last_timestamp(&mut self) -> Result<Option<i64>, SinkError> {
        Ok(self.bars.last().map(|b| b.timestamp))
    }

    fn append(&mut self, bar: &Bar) -> Result<(), SinkError> {
        if let Some(limit) = self.fail_after {
            ensure!(
                self.bars.len() < limit,
                WriteSnafu {
                    message: format!("injected failure after {limit} bars"),
                }
            );
        }
        if let Some(last) = self.bars.last() {
            ensure!(
                bar.timestamp > last.timestamp,
                OutOfOrderSnafu {
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                }
            );
        }
        self.bars.push(*bar);
        Ok(())
    }
}
