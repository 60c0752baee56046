//! Provider abstraction for market data sources.
//!
//! This module defines the [`Provider`] trait, the unified capability set
//! every market-data source must implement: symbol listing, metadata refresh,
//! and one paginated bar fetch. A provider never loops over a whole requested
//! window itself; the
//! [`ChunkedDownloader`](crate::download::ChunkedDownloader) drives repeated
//! `fetch_bars` calls using the provider's [`ChunkPlan`].
//!
//! The trait is designed for async usage and dynamic dispatch
//! (`Box<dyn Provider>`), so the orchestration layer can select a source at
//! runtime through the [`registry`](crate::registry).

pub mod capitalcom;
pub mod config;
pub mod errors;
pub mod exchange;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{
    bar::Bar,
    symbol_info::SymbolMetadata,
    timeframe::{Timeframe, TimeframeCodec},
};

pub use errors::ProviderError;

/// How the downloader should slice a window into provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Row-count pagination: each call returns up to `page_limit` rows and
    /// the cursor advances past the last row returned.
    Paged { page_limit: u32 },

    /// Calendar-window pagination: each call covers at most `span`, bounding
    /// request counts on sources with date-range APIs.
    Calendar { span: Duration, page_limit: u32 },
}

impl ChunkPlan {
    /// Default calendar spans by timeframe granularity: days for sub-hour
    /// bars, a month for hourly bars, a year for daily and above.
    pub fn calendar_for(timeframe: &Timeframe) -> Self {
        let span = if timeframe.is_sub_hour() {
            Duration::days(7)
        } else if timeframe.is_intraday() {
            Duration::days(30)
        } else {
            Duration::days(365)
        };
        ChunkPlan::Calendar {
            span,
            page_limit: 1000,
        }
    }
}

/// Construction inputs resolved by the orchestration session.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Symbol spec in the provider's own notation (e.g. `"BINANCE:BTC/USDT"`
    /// or a bare epic). May be venue-only for symbol listing.
    pub symbol: String,
    /// Canonical timeframe for the session.
    pub timeframe: Timeframe,
    /// Directory holding `providers.toml`, when configuration exists.
    pub config_dir: Option<PathBuf>,
}

/// Constructor reference stored in the plugin registry.
pub type ProviderFactory = fn(&ProviderContext) -> Result<Box<dyn Provider>, ProviderError>;

/// Polymorphic contract for one market data source bound to a single
/// (symbol, timeframe) pair.
///
/// Instances are owned by the session that created them and are not shared
/// across concurrent downloads.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name of this provider (e.g. `"exchange"`).
    fn name(&self) -> &'static str;

    /// The market symbol this instance is bound to.
    fn symbol(&self) -> &str;

    /// Canonical timeframe of the session.
    fn timeframe(&self) -> &Timeframe;

    /// Native rendition of [`Self::timeframe`], derived at construction.
    fn native_timeframe(&self) -> &str;

    /// The codec for this provider's timeframe vocabulary.
    fn codec(&self) -> &dyn TimeframeCodec;

    /// How downloads against this source should be chunked.
    fn chunking(&self) -> ChunkPlan {
        ChunkPlan::calendar_for(self.timeframe())
    }

    /// Queries the source's symbol catalog.
    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError>;

    /// Computes current symbol metadata from the source.
    async fn refresh_metadata(&self) -> Result<SymbolMetadata, ProviderError>;

    /// One paginated fetch covering at most `[window_start, window_end)`,
    /// possibly truncated by the source. Rows come back in the source's
    /// order; the downloader sorts and deduplicates.
    async fn fetch_bars(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page_limit: u32,
    ) -> Result<Vec<Bar>, ProviderError>;
}

/// Deterministic file stem for everything persisted about one
/// (provider, symbol, timeframe) target. Path separators and venue colons in
/// the symbol are flattened to underscores.
pub fn file_stem(provider: &str, symbol: &str, timeframe: &Timeframe) -> String {
    let symbol = symbol.replace(['/', ':'], "_");
    format!("{provider}_{symbol}_{timeframe}")
}
