use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::price::{CompanyProfile, PricePoint};

/// Trait abstraction for all market-data providers.
///
/// Each API (Polygon, Yahoo Finance, Alpha Vantage) implements this trait.
/// If an API stops working or changes, only that one implementation is
/// replaced; the quote service and aggregator are untouched.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Whether `get_profile` is implemented.
    fn supports_profiles(&self) -> bool {
        false
    }

    /// Daily closes for `symbol` between `from` and `to` (inclusive),
    /// sorted by date.
    async fn get_price_range(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;

    /// The most recent daily close between `from` and `to`.
    async fn get_latest_close(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PricePoint, CoreError> {
        let points = self.get_price_range(symbol, from, to).await?;
        points
            .into_iter()
            .max_by_key(|p| p.date)
            .ok_or_else(|| CoreError::Api {
                provider: self.name().to_string(),
                message: format!("No data received for {symbol} between {from} and {to}"),
            })
    }

    /// Sector, industry and beta for `symbol`.
    async fn get_profile(&self, symbol: &str) -> Result<CompanyProfile, CoreError> {
        Err(CoreError::NoProvider(format!(
            "company profile of {symbol} ({} has no profile endpoint)",
            self.name()
        )))
    }
}
