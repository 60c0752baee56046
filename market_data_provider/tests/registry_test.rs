//! Plugin registry behavior: builtin availability, per-plugin error
//! isolation, and frozen failures.

use market_data_provider::providers::exchange::ExchangeProvider;
use market_data_provider::providers::ProviderFactory;
use market_data_provider::registry::{
    PluginDeclaration, PluginKind, PluginLoadError, PluginMetadata, PluginRegistry,
};

fn good_metadata() -> Result<PluginMetadata, PluginLoadError> {
    Ok(PluginMetadata {
        version: "0.3.1".to_string(),
        description: "external test provider".to_string(),
    })
}

fn bad_metadata() -> Result<PluginMetadata, PluginLoadError> {
    Err(PluginLoadError::Metadata("manifest unreadable".to_string()))
}

fn good_loader() -> Result<ProviderFactory, PluginLoadError> {
    Ok(ExchangeProvider::factory)
}

fn bad_loader() -> Result<ProviderFactory, PluginLoadError> {
    Err(PluginLoadError::Load("entry point missing".to_string()))
}

fn not_a_provider() -> Result<ProviderFactory, PluginLoadError> {
    Err(PluginLoadError::NotAProvider)
}

#[test]
fn declared_provider_becomes_available_after_discovery() {
    let mut registry = PluginRegistry::new();
    registry.declare(PluginDeclaration {
        name: "mirror",
        kind: PluginKind::Provider,
        source: "mirror-plugin",
        metadata: good_metadata,
        loader: good_loader,
    });

    registry.discover(Some(PluginKind::Provider));
    let descriptor = registry.descriptor("mirror").unwrap();
    assert_eq!(descriptor.version, "0.3.1");
    assert!(!descriptor.loaded);
    assert!(descriptor.error.is_none());

    assert!(registry.load("mirror").is_some());
    assert!(registry.descriptor("mirror").unwrap().loaded);
    assert_eq!(
        registry.available_provider_names(),
        vec!["exchange", "capitalcom", "mirror"]
    );
}

#[test]
fn load_without_prior_discovery_works() {
    let mut registry = PluginRegistry::new();
    registry.declare(PluginDeclaration {
        name: "mirror",
        kind: PluginKind::Provider,
        source: "mirror-plugin",
        metadata: good_metadata,
        loader: good_loader,
    });
    assert!(registry.load("mirror").is_some());
}

#[test]
fn metadata_failure_is_isolated_and_frozen() {
    let mut registry = PluginRegistry::new();
    registry.declare(PluginDeclaration {
        name: "broken",
        kind: PluginKind::Provider,
        source: "broken-plugin",
        metadata: bad_metadata,
        loader: good_loader,
    });
    registry.declare(PluginDeclaration {
        name: "mirror",
        kind: PluginKind::Provider,
        source: "mirror-plugin",
        metadata: good_metadata,
        loader: good_loader,
    });

    registry.discover(None);

    // The healthy plugin is unaffected by its broken neighbor.
    assert!(registry.load("mirror").is_some());
    assert!(registry.load("broken").is_none());
    let broken = registry.descriptor("broken").unwrap();
    assert!(broken.error.as_deref().unwrap().contains("manifest unreadable"));

    // Re-declaring with working hooks does not thaw the frozen failure.
    registry.declare(PluginDeclaration {
        name: "broken",
        kind: PluginKind::Provider,
        source: "broken-plugin",
        metadata: good_metadata,
        loader: good_loader,
    });
    registry.discover(None);
    assert!(registry.descriptor("broken").unwrap().error.is_some());
    assert!(registry.load("broken").is_none());

    assert_eq!(
        registry.available_provider_names(),
        vec!["exchange", "capitalcom", "mirror"]
    );
}

#[test]
fn loader_failure_freezes_the_descriptor() {
    let mut registry = PluginRegistry::new();
    registry.declare(PluginDeclaration {
        name: "halfway",
        kind: PluginKind::Provider,
        source: "halfway-plugin",
        metadata: good_metadata,
        loader: bad_loader,
    });

    assert!(registry.load("halfway").is_none());
    let descriptor = registry.descriptor("halfway").unwrap();
    assert!(!descriptor.loaded);
    assert!(descriptor.error.as_deref().unwrap().contains("entry point missing"));

    // Second attempt hits the frozen error, not the loader again.
    assert!(registry.load("halfway").is_none());
}

#[test]
fn non_provider_plugins_are_listed_but_not_loadable_as_providers() {
    let mut registry = PluginRegistry::new();
    registry.declare(PluginDeclaration {
        name: "sma-pack",
        kind: PluginKind::Indicator,
        source: "indicator-pack",
        metadata: good_metadata,
        loader: not_a_provider,
    });

    registry.discover(None);
    assert!(registry.load("sma-pack").is_none());
    assert!(
        !registry
            .available_provider_names()
            .contains(&"sma-pack".to_string())
    );

    let listing = registry.plugins();
    assert!(listing.iter().any(|p| p.name == "sma-pack" && p.kind == PluginKind::Indicator));
}
