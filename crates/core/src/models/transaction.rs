use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single buy or sell entered by the user.
///
/// Transactions are never mutated once created. A negative `quantity`
/// records a sale; for sales the `buy_price` is ignored by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Trade date (daily granularity)
    pub date: NaiveDate,

    /// Ticker symbol, uppercased (e.g., "AAPL", "MSFT")
    pub symbol: String,

    /// Signed number of shares; fractional shares are allowed
    pub quantity: f64,

    /// Price paid per share, in the portfolio currency
    pub buy_price: f64,

    #[serde(default)]
    pub sector: Option<String>,

    #[serde(default)]
    pub industry: Option<String>,

    /// Market beta of the security, `None` when unknown
    #[serde(default)]
    pub beta: Option<f64>,
}

impl Transaction {
    pub fn new(date: NaiveDate, symbol: impl Into<String>, quantity: f64, buy_price: f64) -> Self {
        Self {
            date,
            symbol: normalize_symbol(&symbol.into()),
            quantity,
            buy_price,
            sector: None,
            industry: None,
            beta: None,
        }
    }

    /// Attach sector/industry/beta metadata. A NaN beta is stored as unknown.
    pub fn with_profile(
        mut self,
        sector: Option<String>,
        industry: Option<String>,
        beta: Option<f64>,
    ) -> Self {
        self.sector = sector;
        self.industry = industry;
        self.beta = beta.filter(|b| b.is_finite());
        self
    }

    /// `true` for purchases (positive quantity).
    pub fn is_buy(&self) -> bool {
        self.quantity > 0.0
    }

    /// `true` for sales (negative quantity).
    pub fn is_sell(&self) -> bool {
        self.quantity < 0.0
    }

    /// `true` when sector, industry and beta are all filled in.
    pub fn has_profile(&self) -> bool {
        self.sector.is_some() && self.industry.is_some() && self.beta.is_some()
    }
}

/// One persisted ledger row: the transaction plus the last price fetched for
/// its symbol and the market date that fetch happened on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub transaction: Transaction,

    /// Most recent known price for the symbol (the buy price until the
    /// first successful fetch)
    pub current_price: f64,

    /// Market date of the last successful quote fetch, `None` if never fetched
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
}

impl TransactionRow {
    /// A freshly entered row: its current price starts at the buy price.
    pub fn new(transaction: Transaction) -> Self {
        let current_price = transaction.buy_price;
        Self {
            transaction,
            current_price,
            last_updated: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.transaction.symbol
    }
}

/// Trim and uppercase a ticker symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
