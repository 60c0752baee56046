//! Persisted provider configuration (`providers.toml`).
//!
//! Each provider reads one top-level section keyed by its name. A provider
//! may carry nested sub-sections for per-venue overrides, e.g.:
//!
//! ```toml
//! [exchange]
//! api_key = "shared-key"
//!
//! [exchange.binance]
//! api_key = "binance-only-key"
//! ```
//!
//! Loading `("exchange", Some("binance"))` merges the venue sub-section over
//! the shared defaults key by key. A missing file or section yields an empty
//! config; the absence of a *required* key only surfaces when a capability
//! actually needs it, as [`ProviderError::ConfigurationMissing`].

use std::path::Path;

use thiserror::Error;
use toml::{Table, Value};
use tracing::debug;

use super::errors::ProviderError;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "providers.toml";

/// Failures while reading or parsing `providers.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// The merged configuration mapping for one provider instance.
///
/// Owned per instance; merging happens at load time so later mutation of the
/// file never aliases into live providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    values: Table,
}

impl ProviderConfig {
    /// Loads the section for `provider`, overlaying `sub_section` when given.
    ///
    /// A missing directory, file, or section is not an error; it produces an
    /// empty config.
    pub fn load(
        config_dir: Option<&Path>,
        provider: &str,
        sub_section: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let Some(dir) = config_dir else {
            return Ok(Self::default());
        };
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no provider config file, using empty config");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let root: Table = text.parse().map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::from_table(&root, provider, sub_section))
    }

    /// Extracts and merges the provider section from an already-parsed table.
    pub fn from_table(root: &Table, provider: &str, sub_section: Option<&str>) -> Self {
        let mut values = Table::new();

        let base = root.get(provider).and_then(Value::as_table);
        if let Some(base) = base {
            for (k, v) in base {
                // Nested tables are per-venue overrides, not plain settings.
                if !v.is_table() {
                    values.insert(k.clone(), v.clone());
                }
            }
        }
        if let Some(sub) = sub_section {
            if let Some(over) = base
                .and_then(|b| b.get(sub))
                .and_then(Value::as_table)
            {
                for (k, v) in over {
                    values.insert(k.clone(), v.clone());
                }
            }
        }

        Self { values }
    }

    /// Whether no keys were loaded at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Returns the string value for `key` or a
    /// [`ProviderError::ConfigurationMissing`] naming it.
    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.get_str(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::ConfigurationMissing(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Table {
        text.parse().unwrap()
    }

    #[test]
    fn base_section_only() {
        let root = parse(
            r#"
            [exchange]
            api_key = "shared"
            timeout = 5
            "#,
        );
        let cfg = ProviderConfig::from_table(&root, "exchange", None);
        assert_eq!(cfg.get_str("api_key"), Some("shared"));
        assert!(cfg.get_str("missing").is_none());
    }

    #[test]
    fn sub_section_overrides_base_key_by_key() {
        let root = parse(
            r#"
            [exchange]
            api_key = "shared"
            secret = "shared-secret"

            [exchange.binance]
            api_key = "binance-key"
            "#,
        );
        let cfg = ProviderConfig::from_table(&root, "exchange", Some("binance"));
        assert_eq!(cfg.get_str("api_key"), Some("binance-key"));
        // Untouched base keys survive the overlay.
        assert_eq!(cfg.get_str("secret"), Some("shared-secret"));
    }

    #[test]
    fn unknown_sub_section_falls_back_to_base() {
        let root = parse(
            r#"
            [exchange]
            api_key = "shared"
            "#,
        );
        let cfg = ProviderConfig::from_table(&root, "exchange", Some("kraken"));
        assert_eq!(cfg.get_str("api_key"), Some("shared"));
    }

    #[test]
    fn missing_section_is_empty_not_error() {
        let root = parse("[capitalcom]\ndemo = true\n");
        let cfg = ProviderConfig::from_table(&root, "exchange", None);
        assert!(cfg.is_empty());
        assert!(matches!(
            cfg.require_str("api_key"),
            Err(ProviderError::ConfigurationMissing(k)) if k == "api_key"
        ));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let root = parse("[capitalcom]\napi_key = \"\"\n");
        let cfg = ProviderConfig::from_table(&root, "capitalcom", None);
        assert!(cfg.require_str("api_key").is_err());
    }
}
