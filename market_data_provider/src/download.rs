//! Chunked, resumable bar acquisition.
//!
//! [`ChunkedDownloader`] drives a [`Provider`] over an arbitrary time range
//! by slicing it according to the provider's [`ChunkPlan`], and streams the
//! result into a [`BarSink`]:
//!
//! - **Resume**: when the sink already holds bars, the download restarts at
//!   the last persisted timestamp and the overlap is dropped, so re-running
//!   the same request is idempotent.
//! - **Ordering**: each chunk is sorted and deduplicated before appending;
//!   a monotone watermark makes the sink see strictly increasing timestamps
//!   even when chunks overlap.
//! - **Gaps**: an empty paged response advances the cursor by one day, so
//!   listing gaps or pre-listing ranges cannot stall the loop.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::errors::{AcquisitionCause, AcquisitionError};
use crate::providers::{ChunkPlan, Provider};
use crate::storage::BarSink;

/// Outcome of one [`ChunkedDownloader::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Bars appended to the sink by this run.
    pub appended: u64,
    /// Timestamp the run resumed from, when the sink was non-empty.
    pub resumed_from: Option<i64>,
}

/// One acquisition session binding a provider to a sink.
pub struct ChunkedDownloader<'a> {
    provider: &'a dyn Provider,
    sink: &'a mut dyn BarSink,
}

impl<'a> ChunkedDownloader<'a> {
    pub fn new(provider: &'a dyn Provider, sink: &'a mut dyn BarSink) -> Self {
        Self { provider, sink }
    }

    /// Downloads `[time_from, time_to]`, resuming from the sink's last
    /// timestamp when one exists. `time_to` defaults to now. `on_progress`
    /// is called after every chunk with the position reached, ending at
    /// `time_to`; it fires at least once even for an already-complete range.
    pub async fn run<F>(
        &mut self,
        time_from: DateTime<Utc>,
        time_to: Option<DateTime<Utc>>,
        mut on_progress: F,
    ) -> Result<DownloadReport, AcquisitionError>
    where
        F: FnMut(DateTime<Utc>),
    {
        let requested_to = time_to.unwrap_or_else(Utc::now);
        let resumed_from = self
            .sink
            .last_timestamp()
            .map_err(|e| Self::abort(0, e.into()))?;

        // An existing file overrides the requested start: the download
        // continues where the last run stopped.
        let effective_from = resumed_from
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or(time_from);

        if effective_from >= requested_to {
            on_progress(requested_to);
            return Ok(DownloadReport {
                appended: 0,
                resumed_from,
            });
        }

        let plan = self.provider.chunking();
        debug!(
            provider = self.provider.name(),
            symbol = self.provider.symbol(),
            from = %effective_from,
            to = %requested_to,
            resumed = resumed_from.is_some(),
            "starting chunked download"
        );

        let floor = effective_from.timestamp();
        let ceiling = requested_to.timestamp();
        let mut watermark = resumed_from;
        let mut appended: u64 = 0;
        let mut cursor = effective_from;

        while cursor < requested_to {
            let (mut rows, next_cursor) = match plan {
                ChunkPlan::Paged { page_limit } => {
                    let rows = self
                        .provider
                        .fetch_bars(cursor, requested_to, page_limit)
                        .await
                        .map_err(|e| Self::abort(appended, e.into()))?;
                    let next = match rows.iter().map(|b| b.timestamp).max() {
                        Some(last) => DateTime::from_timestamp(last, 0)
                            .map(|dt| dt + self.provider.timeframe().bar_span())
                            .unwrap_or(requested_to),
                        // Nothing in this page; skip a day ahead.
                        None => cursor + Duration::days(1),
                    };
                    (rows, next)
                }
                ChunkPlan::Calendar { span, page_limit } => {
                    let chunk_end = (cursor + span).min(requested_to);
                    let rows = self
                        .provider
                        .fetch_bars(cursor, chunk_end, page_limit)
                        .await
                        .map_err(|e| Self::abort(appended, e.into()))?;
                    (rows, chunk_end)
                }
            };

            rows.sort_by_key(|b| b.timestamp);
            rows.dedup_by_key(|b| b.timestamp);
            for bar in &rows {
                if bar.timestamp < floor || bar.timestamp > ceiling {
                    continue;
                }
                if watermark.is_some_and(|w| bar.timestamp <= w) {
                    continue;
                }
                self.sink
                    .append(bar)
                    .map_err(|e| Self::abort(appended, e.into()))?;
                watermark = Some(bar.timestamp);
                appended += 1;
            }

            // Guard against a plan that fails to move the cursor forward.
            cursor = next_cursor.max(cursor + Duration::seconds(1));
            on_progress(cursor.min(requested_to));
        }

        info!(
            provider = self.provider.name(),
            symbol = self.provider.symbol(),
            appended,
            "download complete"
        );
        Ok(DownloadReport {
            appended,
            resumed_from,
        })
    }

    fn abort(appended: u64, cause: AcquisitionCause) -> AcquisitionError {
        AcquisitionError { appended, cause }
    }
}
