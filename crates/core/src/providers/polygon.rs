use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::price::PricePoint;
use super::traits::QuoteProvider;

const BASE_URL: &str = "https://api.polygon.io";

/// Polygon.io aggregates API provider for US equity prices.
///
/// - **Requires**: API key (set via settings as "polygon").
/// - **Free tier**: 5 requests/minute, end-of-day data only.
/// - **Strategy**: request daily bars over a short window ending yesterday
///   and take the last close.
pub struct PolygonProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PolygonProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Point the provider at a different host (used by tests and proxies).
    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the daily aggregates endpoint for a symbol and date window.
    pub fn aggregates_url(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol.to_uppercase(),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        )
    }
}

// ── Polygon API response types ──────────────────────────────────────

#[derive(Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Option<Vec<AggregateBar>>,
}

#[derive(Deserialize)]
struct AggregateBar {
    /// Close price
    #[serde(rename = "c")]
    close: f64,
    /// Bar start, unix milliseconds
    #[serde(rename = "t")]
    timestamp_ms: i64,
}

/// Parse an aggregates response body into price points sorted by date.
///
/// An `"ERROR"` status becomes `CoreError::Api`; a response without
/// `results` (no trading days in the window) yields an empty Vec.
pub fn parse_aggregates(symbol: &str, body: &str) -> Result<Vec<PricePoint>, CoreError> {
    let resp: AggregatesResponse = serde_json::from_str(body).map_err(|e| CoreError::Api {
        provider: "Polygon".into(),
        message: format!("Failed to parse aggregates for {symbol}: {e}"),
    })?;

    if resp.status.as_deref() == Some("ERROR") {
        return Err(CoreError::Api {
            provider: "Polygon".into(),
            message: format!(
                "Request for {symbol} rejected: {}",
                resp.error.unwrap_or_else(|| "unknown error".into())
            ),
        });
    }

    let mut points: Vec<PricePoint> = resp
        .results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|bar| {
            let date = chrono::DateTime::from_timestamp_millis(bar.timestamp_ms)?.date_naive();
            Some(PricePoint {
                date,
                price: bar.close,
            })
        })
        .collect();

    points.sort_by_key(|p| p.date);
    Ok(points)
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteProvider for PolygonProvider {
    fn name(&self) -> &str {
        "Polygon"
    }

    async fn get_price_range(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let body = self
            .client
            .get(self.aggregates_url(symbol, from, to))
            .query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;

        parse_aggregates(symbol, &body)
    }
}
