pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDate;
use models::{
    chart::TreemapTile,
    holding::Aggregation,
    price::{PriceQuote, QuoteOutcome},
    settings::Settings,
    transaction::{normalize_symbol, Transaction, TransactionRow},
};
use providers::registry::QuoteProviderRegistry;
use services::{
    aggregation_service::AggregationService, chart_service::ChartService,
    portfolio_service::PortfolioService, quote_service::QuoteService,
};
use std::collections::HashMap;
use storage::manager::{LoadedLedger, TransactionStore};
use tracing::{info, warn};

use errors::CoreError;

/// What one quote refresh did, per symbol.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Fresh quotes, keyed by symbol
    pub quotes: HashMap<String, PriceQuote>,

    /// Symbols already refreshed on this market date
    pub current: Vec<String>,

    /// Symbols no provider could price, with the last error message
    pub failed: Vec<(String, String)>,
}

impl RefreshReport {
    pub fn updated(&self) -> usize {
        self.quotes.len()
    }
}

/// Main entry point for the stock portfolio core library.
/// Holds the transaction ledger and all services needed to operate on it.
#[must_use]
pub struct PortfolioTracker {
    rows: Vec<TransactionRow>,
    settings: Settings,
    portfolio_service: PortfolioService,
    quote_service: QuoteService,
    aggregation_service: AggregationService,
    chart_service: ChartService,
    /// Rows skipped while loading the ledger.
    load_issues: Vec<CoreError>,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("rows", &self.rows.len())
            .field("settings", &self.settings)
            .field("providers", &self.quote_service.provider_names())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl PortfolioTracker {
    /// Create an empty ledger.
    pub fn create_new(settings: Settings) -> Self {
        Self::build(LoadedLedger::default(), settings)
    }

    /// Load a ledger from CSV text.
    /// Use this where the caller handles file I/O.
    pub fn load_from_str(data: &str, settings: Settings) -> Result<Self, CoreError> {
        let ledger = TransactionStore::load_from_str(data)?;
        Ok(Self::build(ledger, settings))
    }

    /// Serialize the ledger to CSV text in the current layout.
    /// Clears the unsaved-changes flag on success.
    pub fn save_to_string(&mut self) -> Result<String, CoreError> {
        let data = TransactionStore::save_to_string(&self.rows)?;
        self.dirty = false;
        Ok(data)
    }

    /// Load from a CSV file on disk (native only). A missing file gives an
    /// empty ledger.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, settings: Settings) -> Result<Self, CoreError> {
        let ledger = TransactionStore::load_from_file(path)?;
        Ok(Self::build(ledger, settings))
    }

    /// Overwrite the CSV file on disk (native only).
    /// Clears the unsaved-changes flag on success.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(&mut self, path: &str) -> Result<(), CoreError> {
        TransactionStore::save_to_file(&self.rows, path)?;
        self.dirty = false;
        Ok(())
    }

    /// Replace the provider registry (custom or mock providers).
    pub fn with_registry(mut self, registry: QuoteProviderRegistry) -> Self {
        self.quote_service =
            QuoteService::new(registry).with_lookback_days(self.settings.lookback_days);
        self
    }

    // ── Ledger ──────────────────────────────────────────────────────

    /// Record a purchase (positive quantity) or sale (negative quantity).
    /// Returns the new row's index.
    pub fn add_transaction(
        &mut self,
        date: NaiveDate,
        symbol: &str,
        quantity: f64,
        price: f64,
    ) -> Result<usize, CoreError> {
        let today = self.settings.market_today();
        let transaction = Transaction::new(date, symbol, quantity, price);
        let index = self
            .portfolio_service
            .add_transaction(&mut self.rows, transaction, today)?;
        self.dirty = true;
        Ok(index)
    }

    /// Remove the row at `index`. Fails if a later sale depends on it.
    pub fn remove_transaction(&mut self, index: usize) -> Result<TransactionRow, CoreError> {
        let removed = self
            .portfolio_service
            .remove_transaction(&mut self.rows, index)?;
        self.dirty = true;
        Ok(removed)
    }

    /// Every ledger row, in file order.
    #[must_use]
    pub fn rows(&self) -> &[TransactionRow] {
        &self.rows
    }

    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        self.portfolio_service.transactions(&self.rows)
    }

    /// Rows of one symbol (case-insensitive), in file order.
    #[must_use]
    pub fn rows_for_symbol(&self, symbol: &str) -> Vec<&TransactionRow> {
        let upper = normalize_symbol(symbol);
        self.rows.iter().filter(|r| r.symbol() == upper).collect()
    }

    /// Distinct symbols, in first-seen order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.portfolio_service.symbols(&self.rows)
    }

    /// Last fetched price per symbol.
    #[must_use]
    pub fn last_known_prices(&self) -> HashMap<String, f64> {
        self.portfolio_service.last_known_prices(&self.rows)
    }

    /// Rows that could not be decoded when the ledger was loaded.
    #[must_use]
    pub fn load_issues(&self) -> &[CoreError] {
        &self.load_issues
    }

    // ── Quotes & Profiles ───────────────────────────────────────────

    /// Fetch the latest price of every symbol not yet refreshed on `today`
    /// and write it onto that symbol's rows.
    ///
    /// Failures never abort the refresh; they are collected in the report
    /// and the symbol keeps its last-known price.
    pub async fn refresh_quotes(&mut self, today: NaiveDate) -> RefreshReport {
        let mut report = RefreshReport::default();

        for symbol in self.portfolio_service.symbols(&self.rows) {
            let last_updated = self.portfolio_service.last_updated(&self.rows, &symbol);
            match self
                .quote_service
                .fetch_quote(&symbol, last_updated, today)
                .await
            {
                QuoteOutcome::Updated(quote) => {
                    self.portfolio_service
                        .apply_quote(&mut self.rows, &quote, today);
                    self.dirty = true;
                    report.quotes.insert(symbol, quote);
                }
                QuoteOutcome::AlreadyCurrent => report.current.push(symbol),
                QuoteOutcome::Unavailable(message) => report.failed.push((symbol, message)),
            }
        }

        info!(
            updated = report.updated(),
            current = report.current.len(),
            failed = report.failed.len(),
            "quote refresh finished"
        );
        report
    }

    /// Backfill sector, industry and beta for symbols missing them.
    /// Returns the symbols whose rows changed.
    pub async fn refresh_profiles(&mut self) -> Vec<String> {
        let mut enriched = Vec::new();
        if !self.quote_service.has_profile_provider() {
            return enriched;
        }

        for symbol in self.portfolio_service.symbols_missing_profile(&self.rows) {
            match self.quote_service.fetch_profile(&symbol).await {
                Ok(profile) => {
                    if self.portfolio_service.apply_profile(&mut self.rows, &profile) > 0 {
                        self.dirty = true;
                        enriched.push(symbol);
                    }
                }
                Err(e) => warn!(%symbol, error = %e, "failed to fetch company profile"),
            }
        }
        enriched
    }

    /// Refresh quotes, then aggregate with them.
    pub async fn refresh(&mut self, today: NaiveDate) -> (RefreshReport, Aggregation) {
        let report = self.refresh_quotes(today).await;
        let aggregation = self.aggregate_with(&report.quotes);
        (report, aggregation)
    }

    /// Refresh quotes and backfill company profiles, then aggregate so the
    /// result already carries the fetched sector, industry and beta.
    /// Returns the symbols whose profiles were filled in.
    pub async fn refresh_with_profiles(
        &mut self,
        today: NaiveDate,
    ) -> (RefreshReport, Vec<String>, Aggregation) {
        let report = self.refresh_quotes(today).await;
        let enriched = self.refresh_profiles().await;
        let aggregation = self.aggregate_with(&report.quotes);
        (report, enriched, aggregation)
    }

    // ── Aggregation & Charts ────────────────────────────────────────

    /// Aggregate offline, valuing every holding at its last-known price.
    #[must_use]
    pub fn aggregate(&self) -> Aggregation {
        self.aggregate_with(&HashMap::new())
    }

    /// Aggregate with `quotes` taking precedence over last-known prices.
    #[must_use]
    pub fn aggregate_with(&self, quotes: &HashMap<String, PriceQuote>) -> Aggregation {
        let transactions = self.portfolio_service.transactions(&self.rows);
        let last_known = self.portfolio_service.last_known_prices(&self.rows);
        self.aggregation_service
            .aggregate(&transactions, quotes, &last_known)
    }

    /// Treemap tiles for the current holdings, filling `width` × `height`.
    #[must_use]
    pub fn treemap(&self, width: f64, height: f64) -> Vec<TreemapTile> {
        self.chart_service
            .treemap(&self.aggregate(), width, height)
    }

    /// Current holdings and summary as pretty JSON.
    pub fn export_aggregation_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(&self.aggregate())
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize holdings: {e}")))
    }

    // ── Settings & Dirty State ──────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Names of the quote providers in use, in priority order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.quote_service.provider_names()
    }

    #[must_use]
    pub fn has_quote_providers(&self) -> bool {
        self.quote_service.has_providers()
    }

    /// Returns `true` if the ledger has been modified since the last save or
    /// load, or was loaded from an older layout that the next save migrates.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(ledger: LoadedLedger, settings: Settings) -> Self {
        let dirty = ledger.needs_migration();
        if dirty {
            info!(
                from = ?ledger.version,
                "transaction file uses an older layout; next save upgrades it"
            );
        }

        Self {
            rows: ledger.rows,
            quote_service: QuoteService::from_settings(&settings),
            settings,
            portfolio_service: PortfolioService::new(),
            aggregation_service: AggregationService::new(),
            chart_service: ChartService::new(),
            load_issues: ledger.skipped,
            dirty,
        }
    }
}
