//! Symbol metadata caching.
//!
//! Metadata is expensive to recompute (it needs live provider calls) and
//! changes rarely, so it is persisted as one TOML file per
//! (provider, symbol, timeframe) target and reused until a caller forces a
//! refresh. [`SymbolInfoCache::get`] performs at most one provider round
//! trip per call and persists the result before returning it.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::models::{symbol_info::SymbolMetadata, timeframe::Timeframe};
use crate::providers::{Provider, ProviderError, file_stem};

/// Failures in the persistence half of the cache.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors from [`SymbolInfoCache::get`]: either the store or the refresh.
#[derive(Debug, Error)]
pub enum SymbolInfoError {
    #[error(transparent)]
    Store(#[from] MetadataError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Persistence backend for symbol metadata, keyed by
/// (provider, symbol, timeframe).
pub trait MetadataStore {
    fn load(
        &self,
        provider: &str,
        symbol: &str,
        timeframe: &Timeframe,
    ) -> Result<Option<SymbolMetadata>, MetadataError>;

    fn save(
        &self,
        provider: &str,
        symbol: &str,
        timeframe: &Timeframe,
        metadata: &SymbolMetadata,
    ) -> Result<(), MetadataError>;
}

/// [`MetadataStore`] writing one TOML file per target into a directory.
pub struct TomlMetadataStore {
    dir: PathBuf,
}

impl TomlMetadataStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, provider: &str, symbol: &str, timeframe: &Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}.toml", file_stem(provider, symbol, timeframe)))
    }
}

impl MetadataStore for TomlMetadataStore {
    fn load(
        &self,
        provider: &str,
        symbol: &str,
        timeframe: &Timeframe,
    ) -> Result<Option<SymbolMetadata>, MetadataError> {
        let path = self.path_for(provider, symbol, timeframe);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let metadata = toml::from_str(&text).map_err(|source| MetadataError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(metadata))
    }

    fn save(
        &self,
        provider: &str,
        symbol: &str,
        timeframe: &Timeframe,
        metadata: &SymbolMetadata,
    ) -> Result<(), MetadataError> {
        let path = self.path_for(provider, symbol, timeframe);
        std::fs::create_dir_all(&self.dir).map_err(|source| MetadataError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;
        let text = toml::to_string_pretty(metadata)?;
        std::fs::write(&path, text).map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "persisted symbol metadata");
        Ok(())
    }
}

/// Read-through cache over a [`MetadataStore`].
pub struct SymbolInfoCache<S: MetadataStore> {
    store: S,
}

impl<S: MetadataStore> SymbolInfoCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns cached metadata for the provider's bound target, refreshing
    /// from the source when nothing is cached or `force_refresh` is set.
    ///
    /// A refresh is persisted before the metadata is returned, so a caller
    /// crash after `get` never loses the round trip.
    pub async fn get(
        &self,
        provider: &dyn Provider,
        force_refresh: bool,
    ) -> Result<SymbolMetadata, SymbolInfoError> {
        let name = provider.name();
        let symbol = provider.symbol();
        let timeframe = provider.timeframe();

        if !force_refresh {
            if let Some(cached) = self.store.load(name, symbol, timeframe)? {
                return Ok(cached);
            }
        }

        let fresh = provider.refresh_metadata().await?;
        self.store.save(name, symbol, timeframe, &fresh)?;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::symbol_info::{InstrumentType, around_the_clock};
    use tempfile::TempDir;

    fn sample(ticker: &str) -> SymbolMetadata {
        let (opening_hours, session_starts, session_ends) = around_the_clock();
        SymbolMetadata {
            prefix: "BINANCE".into(),
            description: format!("{ticker} Spot"),
            ticker: ticker.into(),
            currency: "USDT".into(),
            base_currency: "BTC".into(),
            period: Timeframe::Minutes(60),
            instrument_type: InstrumentType::Crypto,
            min_tick: 0.01,
            price_scale: 100,
            min_move: 1.0,
            point_value: 1.0,
            timezone: "UTC".into(),
            opening_hours,
            session_starts,
            session_ends,
            taker_fee: None,
            maker_fee: None,
            avg_spread: None,
        }
    }

    #[test]
    fn store_round_trip_and_miss() {
        let dir = TempDir::new().unwrap();
        let store = TomlMetadataStore::new(dir.path());
        let tf = Timeframe::Minutes(60);

        assert!(store.load("exchange", "BTC/USDT", &tf).unwrap().is_none());

        let meta = sample("BTCUSDT");
        store.save("exchange", "BTC/USDT", &tf, &meta).unwrap();
        let loaded = store.load("exchange", "BTC/USDT", &tf).unwrap().unwrap();
        assert_eq!(loaded, meta);

        // Separator flattening keeps one file per target.
        assert!(dir.path().join("exchange_BTC_USDT_60.toml").exists());
    }

    #[test]
    fn targets_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = TomlMetadataStore::new(dir.path());

        store
            .save("exchange", "BTC/USDT", &Timeframe::Minutes(60), &sample("BTCUSDT"))
            .unwrap();
        store
            .save("exchange", "BTC/USDT", &Timeframe::Days(1), &sample("BTCUSDT"))
            .unwrap();

        assert!(store
            .load("capitalcom", "BTC/USDT", &Timeframe::Minutes(60))
            .unwrap()
            .is_none());
        assert!(store
            .load("exchange", "BTC/USDT", &Timeframe::Days(1))
            .unwrap()
            .is_some());
    }
}
