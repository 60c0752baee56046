//! Historical OHLCV acquisition for pluggable market data sources.
//!
//! The crate turns "give me bars for this symbol and timeframe over this
//! range" into provider-specific API calls, chunked and resumable, and
//! persists the result as an append-only bar file plus a symbol metadata
//! sidecar:
//!
//! - [`models`] holds the canonical [`Timeframe`](models::timeframe::Timeframe),
//!   [`Bar`](models::bar::Bar), and
//!   [`SymbolMetadata`](models::symbol_info::SymbolMetadata) types.
//! - [`providers`] defines the [`Provider`](providers::Provider) trait and
//!   the built-in sources.
//! - [`download`] drives a provider over a range, chunk by chunk.
//! - [`storage`] persists bars behind the [`BarSink`](storage::BarSink)
//!   trait.
//! - [`syminfo`] caches symbol metadata on disk.
//! - [`registry`] discovers and loads provider plugins.
//! - [`service`] is the facade the CLI and embedders use.

pub mod download;
pub mod errors;
pub mod models;
pub mod providers;
pub mod registry;
pub mod service;
pub mod storage;
pub mod syminfo;

#[cfg(feature = "cli")]
pub mod cli;

pub use errors::{AcquisitionCause, AcquisitionError, Error};
pub use service::DataService;
