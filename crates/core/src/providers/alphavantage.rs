use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::price::{CompanyProfile, PricePoint};
use super::traits::QuoteProvider;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage API provider for stock prices and company profiles.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (set via settings as "alphavantage").
/// - **Coverage**: 100k+ global equity symbols.
/// - **Profiles**: the `OVERVIEW` endpoint supplies sector, industry and
///   beta, which no other registered provider does.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }

    async fn query(
        &self,
        function: &str,
        symbol: &str,
        extra: &[(&str, &str)],
    ) -> Result<String, CoreError> {
        let symbol = symbol.to_uppercase();
        let mut params: Vec<(&str, &str)> = vec![
            ("function", function),
            ("symbol", symbol.as_str()),
            ("apikey", self.api_key.as_str()),
        ];
        params.extend_from_slice(extra);

        let body = self
            .client
            .get(BASE_URL)
            .query(&params)
            .send()
            .await?
            .text()
            .await?;
        Ok(body)
    }
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyData>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct DailyData {
    #[serde(rename = "4. close")]
    close: String,
}

#[derive(Deserialize)]
struct OverviewResponse {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "Beta")]
    beta: Option<String>,
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: "Alpha Vantage".into(),
        message,
    }
}

/// Alpha Vantage reports missing fields as `"None"` or `"-"` strings.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "None" && v != "-")
}

/// Parse a `TIME_SERIES_DAILY` body into the closes between `from` and `to`,
/// sorted by date.
///
/// Rate-limit notices and error messages (which Alpha Vantage returns with
/// HTTP 200) become `CoreError::Api`.
pub fn parse_time_series(
    symbol: &str,
    body: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<PricePoint>, CoreError> {
    let resp: TimeSeriesResponse = serde_json::from_str(body)
        .map_err(|e| api_error(format!("Failed to parse time series for {symbol}: {e}")))?;

    let time_series = match resp.time_series {
        Some(series) => series,
        None => {
            let reason = resp
                .error_message
                .or(resp.note)
                .or(resp.information)
                .unwrap_or_else(|| "API limit may be exceeded".into());
            return Err(api_error(format!("No time series data for {symbol}: {reason}")));
        }
    };

    let mut points: Vec<PricePoint> = time_series
        .iter()
        .filter_map(|(date_str, data)| {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
            if date >= from && date <= to {
                let price: f64 = data.close.parse().ok()?;
                Some(PricePoint { date, price })
            } else {
                None
            }
        })
        .collect();

    points.sort_by_key(|p| p.date);
    Ok(points)
}

/// Parse an `OVERVIEW` body into a company profile.
///
/// An empty object (unknown symbol) is an error; individual missing fields
/// are left as `None`.
pub fn parse_overview(symbol: &str, body: &str) -> Result<CompanyProfile, CoreError> {
    let resp: OverviewResponse = serde_json::from_str(body)
        .map_err(|e| api_error(format!("Failed to parse overview for {symbol}: {e}")))?;

    if resp.symbol.is_none() {
        return Err(api_error(format!("No overview data for {symbol}")));
    }

    Ok(CompanyProfile {
        symbol: symbol.to_uppercase(),
        sector: present(resp.sector),
        industry: present(resp.industry),
        beta: present(resp.beta)
            .and_then(|b| b.parse::<f64>().ok())
            .filter(|b| b.is_finite()),
    })
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    fn supports_profiles(&self) -> bool {
        true
    }

    async fn get_price_range(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        // Compact output covers the last 100 trading days
        let body = self
            .query("TIME_SERIES_DAILY", symbol, &[("outputsize", "compact")])
            .await?;
        parse_time_series(symbol, &body, from, to)
    }

    async fn get_profile(&self, symbol: &str) -> Result<CompanyProfile, CoreError> {
        let body = self.query("OVERVIEW", symbol, &[]).await?;
        parse_overview(symbol, &body)
    }
}
