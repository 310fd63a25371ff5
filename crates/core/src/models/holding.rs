use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Where a holding's `current_price` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    /// A valid quote supplied for this refresh
    Quote,
    /// The last price persisted for the symbol
    LastKnown,
    /// No price was ever fetched; the weighted average buy price stands in
    BuyPrice,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::Quote => write!(f, "Quote"),
            PriceSource::LastKnown => write!(f, "Last known"),
            PriceSource::BuyPrice => write!(f, "Buy price"),
        }
    }
}

/// Aggregated position for one symbol.
///
/// Derived metrics that can be undefined (zero denominator, unknown inputs)
/// are `Option`s; `None` means "no value" and is rendered as N/A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingAggregate {
    pub symbol: String,

    /// Net shares held (sum of signed transaction quantities)
    pub total_quantity: f64,

    /// Average cost per share of the shares still held
    pub weighted_average_buy_price: f64,

    pub current_price: f64,

    pub price_source: PriceSource,

    /// `total_quantity * current_price`
    pub total_value: f64,

    /// `total_quantity * weighted_average_buy_price`
    pub cost_basis: f64,

    /// `total_value - cost_basis`
    pub gain_loss: f64,

    /// `(current_price - wavg) / wavg * 100`, `None` when `wavg == 0`
    pub percent_change: Option<f64>,

    /// This holding's share of the portfolio value, `None` when the
    /// portfolio value is zero
    pub allocation_pct: Option<f64>,

    /// Earliest transaction date for the symbol
    pub earliest_date: NaiveDate,

    pub sector: Option<String>,
    pub industry: Option<String>,
    pub beta: Option<f64>,
}

/// Portfolio-level totals for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Sum of every holding's `total_value`
    pub total_value: f64,

    /// Sum of every holding's `cost_basis`
    pub total_cost: f64,

    /// `total_value - total_cost`
    pub total_gain_loss: f64,

    /// `total_gain_loss / total_cost * 100`, `None` when `total_cost == 0`
    pub total_return_pct: Option<f64>,

    /// Value-weighted beta over holdings with a known beta
    pub weighted_beta: Option<f64>,

    pub holdings_count: usize,
}

impl Default for PortfolioSummary {
    fn default() -> Self {
        Self {
            total_value: 0.0,
            total_cost: 0.0,
            total_gain_loss: 0.0,
            total_return_pct: None,
            weighted_beta: None,
            holdings_count: 0,
        }
    }
}

/// Full output of one aggregation pass.
#[derive(Debug, Default, Serialize)]
pub struct Aggregation {
    /// Holdings in first-seen symbol order
    pub holdings: Vec<HoldingAggregate>,

    pub summary: PortfolioSummary,

    /// Symbols excluded and quotes rejected during this pass
    #[serde(skip)]
    pub issues: Vec<CoreError>,
}

impl Aggregation {
    /// Look up a holding by symbol (case-insensitive).
    pub fn get(&self, symbol: &str) -> Option<&HoldingAggregate> {
        let upper = symbol.trim().to_uppercase();
        self.holdings.iter().find(|h| h.symbol == upper)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.holdings.iter().map(|h| h.symbol.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
