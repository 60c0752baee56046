use thiserror::Error;

use crate::models::timeframe::TimeframeError;
use crate::providers::ProviderError;
use crate::storage::SinkError;
use crate::syminfo::SymbolInfoError;

/// What broke an acquisition mid-flight.
#[derive(Debug, Error)]
pub enum AcquisitionCause {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A download aborted after persisting part of the requested range.
///
/// Everything appended before the failure stays in the sink; `appended`
/// reports how much, so callers can decide whether to resume or give up.
#[derive(Debug, Error)]
#[error("Download aborted after {appended} bars: {cause}")]
pub struct AcquisitionError {
    pub appended: u64,
    #[source]
    pub cause: AcquisitionCause,
}

/// Top-level error for the orchestration service and CLI.
#[derive(Debug, Error)]
pub enum Error {
    /// No plugin, builtin or declared, carries this provider name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider plugin exists but failed discovery or loading.
    #[error("Provider plugin unavailable: {name}: {reason}")]
    PluginUnavailable { name: String, reason: String },

    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    SymbolInfo(#[from] SymbolInfoError),
}
