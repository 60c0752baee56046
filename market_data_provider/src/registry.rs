//! Plugin discovery and loading.
//!
//! The registry tracks every known plugin as a [`PluginDescriptor`]. The
//! built-in providers are registered up front and always loaded; external
//! plugins are registered as [`PluginDeclaration`]s whose metadata and
//! loader hooks are evaluated lazily. A hook failure is isolated to its own
//! plugin and frozen into the descriptor: it is reported on every listing
//! and never retried, so one broken plugin can neither take down discovery
//! nor flap between states.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::providers::ProviderFactory;
use crate::providers::{capitalcom::CapitalComProvider, exchange::ExchangeProvider};

/// What a plugin contributes to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Provider,
    Indicator,
    Strategy,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginKind::Provider => "provider",
            PluginKind::Indicator => "indicator",
            PluginKind::Strategy => "strategy",
        };
        f.pad(s)
    }
}

/// A plugin hook failed.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("load error: {0}")]
    Load(String),

    #[error("plugin does not provide a data source")]
    NotAProvider,
}

/// Metadata a plugin reports about itself during discovery.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub version: String,
    pub description: String,
}

/// Registration record for an external plugin.
///
/// Hooks are plain function pointers so declarations stay `Copy`-cheap and
/// the loaded factory can be cached by value.
pub struct PluginDeclaration {
    pub name: &'static str,
    pub kind: PluginKind,
    /// Where the plugin comes from, for display (crate name, path, ...).
    pub source: &'static str,
    /// Evaluated once at discovery; a failure freezes the descriptor.
    pub metadata: fn() -> Result<PluginMetadata, PluginLoadError>,
    /// Evaluated once on first load; a failure freezes the descriptor.
    pub loader: fn() -> Result<ProviderFactory, PluginLoadError>,
}

/// One row in the plugin listing.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub kind: PluginKind,
    pub version: String,
    pub description: String,
    pub source: String,
    /// Whether the plugin's code is present at all. Always true for plugins
    /// reached through registration; kept distinct from `loaded` for
    /// listings that mirror package-manager output.
    pub installed: bool,
    /// Whether the plugin's factory is resident.
    pub loaded: bool,
    /// Frozen failure message, when discovery or loading failed.
    pub error: Option<String>,
}

/// Registry of built-in and declared plugins.
pub struct PluginRegistry {
    declared: IndexMap<&'static str, PluginDeclaration>,
    descriptors: IndexMap<String, PluginDescriptor>,
    factories: IndexMap<String, ProviderFactory>,
}

impl PluginRegistry {
    /// A registry with the built-in providers pre-loaded.
    pub fn new() -> Self {
        let mut registry = Self {
            declared: IndexMap::new(),
            descriptors: IndexMap::new(),
            factories: IndexMap::new(),
        };
        registry.register_builtin(
            "exchange",
            "Crypto exchange OHLCV via Binance-compatible REST",
            ExchangeProvider::factory,
        );
        registry.register_builtin(
            "capitalcom",
            "Capital.com stocks, forex, indices and crypto CFDs",
            CapitalComProvider::factory,
        );
        registry
    }

    fn register_builtin(&mut self, name: &str, description: &str, factory: ProviderFactory) {
        self.descriptors.insert(
            name.to_string(),
            PluginDescriptor {
                name: name.to_string(),
                kind: PluginKind::Provider,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: description.to_string(),
                source: "builtin".to_string(),
                installed: true,
                loaded: true,
                error: None,
            },
        );
        self.factories.insert(name.to_string(), factory);
    }

    /// Registers an external plugin. Nothing is evaluated until
    /// [`PluginRegistry::discover`].
    pub fn declare(&mut self, declaration: PluginDeclaration) {
        self.declared.insert(declaration.name, declaration);
    }

    /// Builds descriptors for declared plugins, optionally filtered by kind.
    ///
    /// Idempotent: plugins already discovered keep their descriptor, and a
    /// descriptor frozen with an error is never re-evaluated.
    pub fn discover(&mut self, kind: Option<PluginKind>) {
        let names: Vec<&'static str> = self
            .declared
            .keys()
            .copied()
            .filter(|name| !self.descriptors.contains_key(*name))
            .collect();

        for name in names {
            let Some(decl) = self.declared.get(name) else {
                continue;
            };
            if kind.is_some_and(|k| k != decl.kind) {
                continue;
            }
            let descriptor = match (decl.metadata)() {
                Ok(meta) => {
                    debug!(plugin = name, version = %meta.version, "discovered plugin");
                    PluginDescriptor {
                        name: name.to_string(),
                        kind: decl.kind,
                        version: meta.version,
                        description: meta.description,
                        source: decl.source.to_string(),
                        installed: true,
                        loaded: false,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(plugin = name, error = %e, "plugin discovery failed");
                    PluginDescriptor {
                        name: name.to_string(),
                        kind: decl.kind,
                        version: String::new(),
                        description: String::new(),
                        source: decl.source.to_string(),
                        installed: true,
                        loaded: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            self.descriptors.insert(name.to_string(), descriptor);
        }
    }

    /// Returns the provider factory for `name`, loading it on first use.
    ///
    /// `None` means the plugin is unknown, failed earlier, or failed now;
    /// [`PluginRegistry::descriptor`] tells which.
    pub fn load(&mut self, name: &str) -> Option<ProviderFactory> {
        if let Some(factory) = self.factories.get(name) {
            return Some(*factory);
        }

        self.discover(Some(PluginKind::Provider));
        let descriptor = self.descriptors.get_mut(name)?;
        if descriptor.error.is_some() || descriptor.kind != PluginKind::Provider {
            return None;
        }

        let decl = self.declared.get(name)?;
        match (decl.loader)() {
            Ok(factory) => {
                descriptor.loaded = true;
                self.factories.insert(name.to_string(), factory);
                Some(factory)
            }
            Err(e) => {
                warn!(plugin = name, error = %e, "plugin load failed");
                descriptor.error = Some(e.to_string());
                None
            }
        }
    }

    /// Descriptor lookup, after any discovery performed so far.
    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    /// All descriptors in registration order. Discovers everything first so
    /// failed plugins show up with their frozen error.
    pub fn plugins(&mut self) -> Vec<PluginDescriptor> {
        self.discover(None);
        self.descriptors.values().cloned().collect()
    }

    /// Names of provider plugins that are usable right now.
    pub fn available_provider_names(&mut self) -> Vec<String> {
        self.discover(Some(PluginKind::Provider));
        self.descriptors
            .values()
            .filter(|d| d.kind == PluginKind::Provider && d.error.is_none())
            .map(|d| d.name.clone())
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preloaded() {
        let mut registry = PluginRegistry::new();
        let names = registry.available_provider_names();
        assert_eq!(names, vec!["exchange", "capitalcom"]);

        let exchange = registry.descriptor("exchange").unwrap();
        assert!(exchange.loaded);
        assert_eq!(exchange.source, "builtin");
        assert_eq!(exchange.version, env!("CARGO_PKG_VERSION"));
        assert!(registry.load("exchange").is_some());
    }

    #[test]
    fn unknown_plugin_is_none() {
        let mut registry = PluginRegistry::new();
        assert!(registry.load("nonexistent").is_none());
        assert!(registry.descriptor("nonexistent").is_none());
    }
}
