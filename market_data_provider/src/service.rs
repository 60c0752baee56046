//! High-level orchestration facade.
//!
//! [`DataService`] ties the registry, providers, downloader, sinks, and the
//! metadata cache together behind the handful of operations the CLI (or an
//! embedding application) needs: download a range, list symbols, inspect
//! symbol metadata, and list plugins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::download::{ChunkedDownloader, DownloadReport};
use crate::errors::Error;
use crate::models::{symbol_info::SymbolMetadata, timeframe::Timeframe};
use crate::providers::{Provider, ProviderContext, file_stem};
use crate::registry::{PluginDescriptor, PluginRegistry};
use crate::storage::jsonl::JsonlSink;
use crate::syminfo::{SymbolInfoCache, TomlMetadataStore};

/// Orchestration entry point bound to a data directory.
pub struct DataService {
    registry: PluginRegistry,
    /// Where bar files and symbol metadata are persisted.
    data_dir: PathBuf,
    /// Where `providers.toml` lives, when configuration exists.
    config_dir: Option<PathBuf>,
}

impl DataService {
    pub fn new(data_dir: &Path, config_dir: Option<&Path>) -> Self {
        Self {
            registry: PluginRegistry::new(),
            data_dir: data_dir.to_path_buf(),
            config_dir: config_dir.map(Path::to_path_buf),
        }
    }

    /// The registry, for declaring external plugins before use.
    pub fn registry(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    fn instantiate(
        &mut self,
        provider: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Box<dyn Provider>, Error> {
        let Some(factory) = self.registry.load(provider) else {
            return match self.registry.descriptor(provider) {
                Some(descriptor) => Err(Error::PluginUnavailable {
                    name: provider.to_string(),
                    reason: descriptor
                        .error
                        .clone()
                        .unwrap_or_else(|| "not a data provider".to_string()),
                }),
                None => Err(Error::UnknownProvider(provider.to_string())),
            };
        };
        let context = ProviderContext {
            symbol: symbol.to_string(),
            timeframe,
            config_dir: self.config_dir.clone(),
        };
        Ok(factory(&context)?)
    }

    /// Path of the bar file for one (provider, symbol, timeframe) target.
    pub fn bar_file(&self, provider: &str, symbol: &str, timeframe: &Timeframe) -> PathBuf {
        self.data_dir
            .join(format!("{}.jsonl", file_stem(provider, symbol, timeframe)))
    }

    /// Downloads `[time_from, time_to]` into the target's bar file, resuming
    /// any earlier partial download. `time_to` defaults to now.
    pub async fn download<F>(
        &mut self,
        provider: &str,
        symbol: &str,
        timeframe: &str,
        time_from: DateTime<Utc>,
        time_to: Option<DateTime<Utc>>,
        on_progress: F,
    ) -> Result<(PathBuf, DownloadReport), Error>
    where
        F: FnMut(DateTime<Utc>),
    {
        let tf: Timeframe = timeframe.parse()?;
        let instance = self.instantiate(provider, symbol, tf)?;
        let path = self.bar_file(provider, symbol, &tf);
        let mut sink = JsonlSink::open(&path)?;
        let report = ChunkedDownloader::new(instance.as_ref(), &mut sink)
            .run(time_from, time_to, on_progress)
            .await?;
        Ok((path, report))
    }

    /// Lists symbols available from a provider. `spec` narrows the listing
    /// where the provider supports it (e.g. a venue name).
    pub async fn list_symbols(&mut self, provider: &str, spec: &str) -> Result<Vec<String>, Error> {
        let instance = self.instantiate(provider, spec, Timeframe::Days(1))?;
        Ok(instance.list_symbols().await?)
    }

    /// Returns symbol metadata, served from the on-disk cache unless
    /// `force_refresh` is set or nothing is cached yet.
    pub async fn symbol_info(
        &mut self,
        provider: &str,
        symbol: &str,
        timeframe: &str,
        force_refresh: bool,
    ) -> Result<SymbolMetadata, Error> {
        let tf: Timeframe = timeframe.parse()?;
        let instance = self.instantiate(provider, symbol, tf)?;
        let cache = SymbolInfoCache::new(TomlMetadataStore::new(&self.data_dir));
        Ok(cache.get(instance.as_ref(), force_refresh).await?)
    }

    /// All known plugins, including ones frozen with a discovery or load
    /// error.
    pub fn plugins(&mut self) -> Vec<PluginDescriptor> {
        self.registry.plugins()
    }

    /// Provider names that can be instantiated right now.
    pub fn available_providers(&mut self) -> Vec<String> {
        self.registry.available_provider_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bar_file_path_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let service = DataService::new(dir.path(), None);
        let path = service.bar_file("exchange", "BINANCE:BTC/USDT", &Timeframe::Minutes(60));
        assert_eq!(
            path,
            dir.path().join("exchange_BINANCE_BTC_USDT_60.jsonl")
        );
    }

    #[tokio::test]
    async fn unknown_provider_is_reported_by_name() {
        let dir = TempDir::new().unwrap();
        let mut service = DataService::new(dir.path(), None);
        let err = service
            .symbol_info("nope", "BTC/USDT", "60", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(name) if name == "nope"));
    }

    #[tokio::test]
    async fn invalid_timeframe_fails_before_any_io() {
        let dir = TempDir::new().unwrap();
        let mut service = DataService::new(dir.path(), None);
        let err = service
            .download(
                "exchange",
                "BINANCE:BTC/USDT",
                "1X",
                Utc::now(),
                None,
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeframe(_)));
    }
}
