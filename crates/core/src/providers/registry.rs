use crate::models::settings::Settings;

use super::alphavantage::AlphaVantageProvider;
use super::polygon::PolygonProvider;
#[cfg(not(target_arch = "wasm32"))]
use super::yahoo_finance::YahooFinanceProvider;
use super::traits::QuoteProvider;

/// Registry of all available quote providers, in priority order.
///
/// The quote service walks providers in registration order and falls back to
/// the next one when a request fails.
pub struct QuoteProviderRegistry {
    providers: Vec<Box<dyn QuoteProvider>>,
}

impl QuoteProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with all default providers the settings allow.
    pub fn new_with_defaults(settings: &Settings) -> Self {
        let mut registry = Self::new();

        // Polygon: requires API key (primary)
        if let Some(key) = settings.api_key("polygon") {
            registry.register(Box::new(PolygonProvider::new(key.to_string())));
        }

        // Yahoo Finance: no API key needed
        // Not available on WASM (uses native reqwest/tokio connectors)
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Ok(yahoo) = YahooFinanceProvider::new() {
                registry.register(Box::new(yahoo));
            }
        }

        // Alpha Vantage: requires API key (fallback, and the profile source)
        if let Some(key) = settings.api_key("alphavantage") {
            registry.register(Box::new(AlphaVantageProvider::new(key.to_string())));
        }

        registry
    }

    /// Register a new quote provider at the lowest priority.
    pub fn register(&mut self, provider: Box<dyn QuoteProvider>) {
        self.providers.push(provider);
    }

    /// All providers, in priority order.
    pub fn providers(&self) -> Vec<&dyn QuoteProvider> {
        self.providers.iter().map(|p| p.as_ref()).collect()
    }

    /// Providers that can return company profiles, in priority order.
    pub fn profile_providers(&self) -> Vec<&dyn QuoteProvider> {
        self.providers
            .iter()
            .filter(|p| p.supports_profiles())
            .map(|p| p.as_ref())
            .collect()
    }

    /// Provider names, in priority order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

impl Default for QuoteProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
