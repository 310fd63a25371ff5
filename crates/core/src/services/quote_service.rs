use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::price::{CompanyProfile, PriceQuote, QuoteOutcome};
use crate::models::settings::{Settings, DEFAULT_LOOKBACK_DAYS};
use crate::providers::registry::QuoteProviderRegistry;

/// Fetches latest prices and company profiles from the registered providers.
///
/// Freshness rule: a symbol whose last update marker equals today's market
/// date is not fetched again. Otherwise the service asks for daily bars in
/// the window `[yesterday - lookback_days, yesterday]` and takes the most
/// recent close, trying providers in priority order.
///
/// A failed fetch is never an error for the caller: it is logged and
/// reported as `QuoteOutcome::Unavailable`.
pub struct QuoteService {
    registry: QuoteProviderRegistry,
    lookback_days: i64,
}

impl QuoteService {
    pub fn new(registry: QuoteProviderRegistry) -> Self {
        Self {
            registry,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Build the default provider registry from settings (API keys, window).
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(QuoteProviderRegistry::new_with_defaults(settings))
            .with_lookback_days(settings.lookback_days)
    }

    pub fn with_lookback_days(mut self, lookback_days: i64) -> Self {
        self.lookback_days = lookback_days.max(1);
        self
    }

    /// Names of registered providers, in priority order.
    pub fn provider_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn has_providers(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn has_profile_provider(&self) -> bool {
        !self.registry.profile_providers().is_empty()
    }

    /// Date window searched for the latest close: it ends yesterday, since
    /// today's bar is not final until the market closes.
    pub fn fetch_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today - Duration::days(1);
        let start = end - Duration::days(self.lookback_days);
        (start, end)
    }

    /// Get the latest price for `symbol` unless it was already refreshed on
    /// `today` (per `last_updated`).
    pub async fn fetch_quote(
        &self,
        symbol: &str,
        last_updated: Option<NaiveDate>,
        today: NaiveDate,
    ) -> QuoteOutcome {
        if last_updated == Some(today) {
            debug!(%symbol, "quote data is up to date");
            return QuoteOutcome::AlreadyCurrent;
        }

        match self.fetch_latest(symbol, today).await {
            Ok(quote) => {
                info!(%symbol, price = quote.price, as_of = %quote.as_of_date, "fetched quote");
                QuoteOutcome::Updated(quote)
            }
            Err(e) => {
                warn!(%symbol, error = %e, "failed to fetch quote");
                QuoteOutcome::Unavailable(e.to_string())
            }
        }
    }

    /// Fetch the latest close from the providers with automatic fallback.
    ///
    /// A provider returning a non-finite or non-positive price is treated as
    /// a failure (`MalformedQuote`) and the next provider is tried.
    pub async fn fetch_latest(
        &self,
        symbol: &str,
        today: NaiveDate,
    ) -> Result<PriceQuote, CoreError> {
        let providers = self.registry.providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider(format!("quotes of {symbol}")));
        }

        let (from, to) = self.fetch_window(today);
        let mut last_error = None;

        for provider in &providers {
            match provider.get_latest_close(symbol, from, to).await {
                Ok(point) => {
                    let quote = PriceQuote::new(symbol, point.price, point.date);
                    if !quote.is_valid() {
                        debug!(
                            provider = provider.name(),
                            %symbol,
                            price = point.price,
                            "provider returned malformed price"
                        );
                        last_error = Some(CoreError::MalformedQuote {
                            symbol: quote.symbol,
                            price: point.price,
                        });
                        continue;
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    debug!(
                        provider = provider.name(),
                        %symbol,
                        error = %e,
                        "provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(format!("quotes of {symbol}"))))
    }

    /// Fetch sector, industry and beta from the first profile provider that
    /// answers.
    pub async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, CoreError> {
        let providers = self.registry.profile_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider(format!("company profile of {symbol}")));
        }

        let mut last_error = None;
        for provider in &providers {
            match provider.get_profile(symbol).await {
                Ok(profile) => {
                    info!(%symbol, provider = provider.name(), "fetched company profile");
                    return Ok(profile);
                }
                Err(e) => {
                    debug!(provider = provider.name(), %symbol, error = %e, "profile lookup failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CoreError::NoProvider(format!("company profile of {symbol}"))))
    }
}
