use thiserror::Error;

use super::config::ConfigError;
use crate::models::timeframe::TimeframeError;

/// Errors that can occur within a [`Provider`](super::Provider)
/// implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The source could not be reached (network failure, timeout, DNS).
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] reqwest::Error),

    /// The source rejected our credentials, after one forced re-auth retry.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The source's API returned an error payload.
    #[error("API error: {0}")]
    Api(String),

    /// A required configuration key (credentials, settings) is absent.
    #[error("Missing provider configuration: {0}")]
    ConfigurationMissing(String),

    /// The persisted configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested timeframe is malformed or outside this provider's
    /// vocabulary.
    #[error(transparent)]
    InvalidTimeframe(#[from] TimeframeError),

    /// The symbol is missing or not in the form this provider expects.
    #[error("Invalid symbol: {0}")]
    Symbol(String),

    /// The source answered with a payload we could not interpret.
    #[error("Unexpected response from source: {0}")]
    UnexpectedResponse(String),
}
