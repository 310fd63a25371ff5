use chrono::{FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;

/// Default location of the transaction CSV, relative to the working directory.
pub const DEFAULT_CSV_PATH: &str = "transactions.csv";

/// Number of calendar days before yesterday searched for the latest close.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 5;

/// US equity market offset from UTC (Eastern Standard Time).
pub const DEFAULT_MARKET_UTC_OFFSET_HOURS: i32 = -5;

/// Runtime configuration, passed explicitly to the services that need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path of the transaction CSV file.
    pub csv_path: String,

    /// Optional API keys for providers that require them.
    /// Keys: provider name ("polygon", "alphavantage").
    /// Values: the API key string.
    pub api_keys: HashMap<String, String>,

    /// How many days before yesterday to search for the latest daily bar
    /// (covers weekends and market holidays).
    pub lookback_days: i64,

    /// UTC offset, in whole hours, used to decide the current market date.
    pub market_utc_offset_hours: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            csv_path: DEFAULT_CSV_PATH.to_string(),
            api_keys: HashMap::new(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            market_utc_offset_hours: DEFAULT_MARKET_UTC_OFFSET_HOURS,
        }
    }
}

impl Settings {
    /// Build settings from process environment variables.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `POLYGON_API_KEY` (or legacy `API_KEY`) | Polygon key |
    /// | `ALPHAVANTAGE_API_KEY` | Alpha Vantage key |
    /// | `PORTFOLIO_CSV` | transaction file path |
    /// | `QUOTE_LOOKBACK_DAYS` | quote search window |
    /// | `MARKET_UTC_OFFSET_HOURS` | market date offset |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Self::default();

        if let Some(key) = get("POLYGON_API_KEY").or_else(|| get("API_KEY")) {
            settings.api_keys.insert("polygon".into(), key);
        }
        if let Some(key) = get("ALPHAVANTAGE_API_KEY") {
            settings.api_keys.insert("alphavantage".into(), key);
        }
        if let Some(path) = get("PORTFOLIO_CSV") {
            settings.csv_path = path;
        }
        if let Some(days) = get("QUOTE_LOOKBACK_DAYS") {
            settings.lookback_days = days.parse().map_err(|e| {
                CoreError::Config(format!("QUOTE_LOOKBACK_DAYS must be an integer: {e}"))
            })?;
        }
        if let Some(offset) = get("MARKET_UTC_OFFSET_HOURS") {
            settings.market_utc_offset_hours = offset.parse().map_err(|e| {
                CoreError::Config(format!("MARKET_UTC_OFFSET_HOURS must be an integer: {e}"))
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check that numeric settings are in range.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=60).contains(&self.lookback_days) {
            return Err(CoreError::Config(format!(
                "lookback_days {} out of range (expected 1..=60)",
                self.lookback_days
            )));
        }
        if !(-12..=14).contains(&self.market_utc_offset_hours) {
            return Err(CoreError::Config(format!(
                "market_utc_offset_hours {} out of range (expected -12..=14)",
                self.market_utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Current calendar date at the configured market offset.
    pub fn market_today(&self) -> NaiveDate {
        let now = Utc::now();
        FixedOffset::east_opt(self.market_utc_offset_hours * 3600)
            .map(|offset| now.with_timezone(&offset).date_naive())
            .unwrap_or_else(|| now.date_naive())
    }

    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }
}
