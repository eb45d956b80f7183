//! Provider registry mapping slugs to provider implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::providers::fitbit::FitbitProvider;
use crate::providers::trait_::{ProviderError, WearableProvider};
use crate::providers::withings::WithingsProvider;

/// Registry of available wearable providers
#[derive(Clone, Default)]
pub struct Registry {
    providers: HashMap<&'static str, Arc<dyn WearableProvider>>,
}

impl Registry {
    /// Create an empty registry (tests register their own providers)
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Build the registry of production providers from configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.sync.provider_timeout_seconds))
            .build()
            .unwrap_or_default();

        let mut registry = Self::new();
        registry.register(Arc::new(WithingsProvider::new(
            http.clone(),
            config.withings_api_base.clone(),
        )));
        registry.register(Arc::new(FitbitProvider::new(
            http,
            config.fitbit_api_base.clone(),
        )));
        registry
    }

    /// Register a provider under its slug
    pub fn register(&mut self, provider: Arc<dyn WearableProvider>) {
        self.providers.insert(provider.slug(), provider);
    }

    /// Look up a provider by slug
    pub fn get(&self, slug: &str) -> Result<Arc<dyn WearableProvider>, ProviderError> {
        self.providers
            .get(slug)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider {
                slug: slug.to_string(),
            })
    }

    /// Slugs of all registered providers
    pub fn slugs(&self) -> Vec<&'static str> {
        let mut slugs: Vec<_> = self.providers.keys().copied().collect();
        slugs.sort_unstable();
        slugs
    }
}
