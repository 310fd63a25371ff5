use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily close (date → price) as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Latest known price for a symbol, supplied once per refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    /// Market date the price reflects
    pub as_of_date: NaiveDate,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: f64, as_of_date: NaiveDate) -> Self {
        Self {
            symbol: super::transaction::normalize_symbol(&symbol.into()),
            price,
            as_of_date,
        }
    }

    /// A quote is usable only when its price is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Result of asking the quote source for a symbol's price.
///
/// Callers treat `AlreadyCurrent` and `Unavailable` the same way: no new
/// data this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    /// A fresh price was fetched
    Updated(PriceQuote),
    /// The symbol was already refreshed on this market date
    AlreadyCurrent,
    /// Every provider failed; carries the last error message
    Unavailable(String),
}

/// Company metadata used to enrich transactions (sector, industry, beta).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub beta: Option<f64>,
}
