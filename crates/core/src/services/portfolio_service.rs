use chrono::NaiveDate;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::price::{CompanyProfile, PriceQuote};
use crate::models::transaction::{normalize_symbol, Transaction, TransactionRow};
use crate::services::aggregation_service::QUANTITY_EPSILON;

/// Longest ticker accepted on entry (covers suffixed symbols like `BRK.B`).
const MAX_SYMBOL_LEN: usize = 12;

/// Manages the transaction ledger: validation, add/remove, and applying
/// fetched quotes and profiles back onto the persisted rows.
///
/// Pure business logic, no I/O.
pub struct PortfolioService;

impl PortfolioService {
    pub fn new() -> Self {
        Self
    }

    /// Append a transaction to the ledger and return its row index.
    ///
    /// The new row's current price starts at its buy price with no update
    /// marker; the next refresh replaces it.
    pub fn add_transaction(
        &self,
        rows: &mut Vec<TransactionRow>,
        transaction: Transaction,
        today: NaiveDate,
    ) -> Result<usize, CoreError> {
        self.validate_transaction(rows, &transaction, today)?;
        rows.push(TransactionRow::new(transaction));
        Ok(rows.len() - 1)
    }

    /// Remove the row at `index`.
    ///
    /// Removing a purchase that later sales depend on is rejected and the
    /// ledger is left unchanged.
    pub fn remove_transaction(
        &self,
        rows: &mut Vec<TransactionRow>,
        index: usize,
    ) -> Result<TransactionRow, CoreError> {
        if index >= rows.len() {
            return Err(CoreError::RowNotFound(index));
        }

        let removed = rows.remove(index);
        if removed.transaction.is_buy() {
            if let Err(e) = self.validate_consistency(rows, removed.symbol()) {
                rows.insert(index, removed);
                return Err(e);
            }
        }
        Ok(removed)
    }

    /// Validate a transaction before it enters the ledger.
    ///
    /// Rules:
    /// - Symbol must be non-empty, at most 12 characters, letters/digits/`.`/`-`
    /// - Quantity must be finite and non-zero
    /// - Purchases need a finite, positive price; sales a finite, non-negative one
    /// - Date may not be more than one day in the future
    /// - A sale can't exceed the shares held on its date, nor leave a later
    ///   sale short
    pub fn validate_transaction(
        &self,
        rows: &[TransactionRow],
        transaction: &Transaction,
        today: NaiveDate,
    ) -> Result<(), CoreError> {
        let symbol = &transaction.symbol;
        if symbol.is_empty() {
            return Err(CoreError::ValidationError("Symbol must not be empty".into()));
        }
        if symbol.len() > MAX_SYMBOL_LEN
            || !symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(CoreError::ValidationError(format!(
                "Invalid symbol '{symbol}': use up to {MAX_SYMBOL_LEN} letters, digits, '.' or '-'"
            )));
        }

        if !transaction.quantity.is_finite() || transaction.quantity == 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Quantity must be a non-zero number, got {}",
                transaction.quantity
            )));
        }

        let price = transaction.buy_price;
        if transaction.is_buy() && !(price.is_finite() && price > 0.0) {
            return Err(CoreError::ValidationError(format!(
                "Purchase price must be positive, got {price}"
            )));
        }
        if transaction.is_sell() && !(price.is_finite() && price >= 0.0) {
            return Err(CoreError::ValidationError(format!(
                "Sale price must be zero or positive, got {price}"
            )));
        }

        // Allow +1 day tolerance for timezone differences
        if let Some(tomorrow) = today.succ_opt() {
            if transaction.date > tomorrow {
                return Err(CoreError::ValidationError(format!(
                    "Transaction date {} is in the future",
                    transaction.date
                )));
            }
        }

        if transaction.is_sell() {
            let held = self.holding_quantity(rows, symbol, transaction.date);
            if held + transaction.quantity < -QUANTITY_EPSILON {
                return Err(CoreError::ValidationError(format!(
                    "Cannot sell {} {}: only {} on {}",
                    -transaction.quantity, symbol, held, transaction.date
                )));
            }

            // A backdated sale must not leave a later sale short
            let upper = normalize_symbol(symbol);
            let existing = rows
                .iter()
                .map(|r| &r.transaction)
                .filter(|tx| tx.symbol == upper);
            let candidate = existing.chain(std::iter::once(transaction));
            if let Some((later, held)) = first_oversell(candidate) {
                return Err(CoreError::ValidationError(format!(
                    "Cannot sell {} {} on {}: the sale of {} on {} would exceed the {:.4} held",
                    -transaction.quantity,
                    symbol,
                    transaction.date,
                    -later.quantity,
                    later.date,
                    held,
                )));
            }
        }

        Ok(())
    }

    /// Net shares of `symbol` held at the end of `as_of`.
    pub fn holding_quantity(&self, rows: &[TransactionRow], symbol: &str, as_of: NaiveDate) -> f64 {
        let upper = normalize_symbol(symbol);
        rows.iter()
            .filter(|r| r.transaction.symbol == upper && r.transaction.date <= as_of)
            .map(|r| r.transaction.quantity)
            .sum()
    }

    /// The bare transactions, in ledger order.
    pub fn transactions(&self, rows: &[TransactionRow]) -> Vec<Transaction> {
        rows.iter().map(|r| r.transaction.clone()).collect()
    }

    /// Distinct symbols in first-seen order.
    pub fn symbols(&self, rows: &[TransactionRow]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        rows.iter()
            .filter(|r| seen.insert(r.symbol()))
            .map(|r| r.symbol().to_string())
            .collect()
    }

    /// Most recent update marker among a symbol's rows.
    pub fn last_updated(&self, rows: &[TransactionRow], symbol: &str) -> Option<NaiveDate> {
        let upper = normalize_symbol(symbol);
        rows.iter()
            .filter(|r| r.transaction.symbol == upper)
            .filter_map(|r| r.last_updated)
            .max()
    }

    /// Last fetched price per symbol, taken from the row with the newest
    /// update marker (the later row wins a tie). Symbols that were never
    /// fetched are absent.
    pub fn last_known_prices(&self, rows: &[TransactionRow]) -> HashMap<String, f64> {
        let mut freshest: HashMap<String, (NaiveDate, f64)> = HashMap::new();
        for row in rows {
            let Some(marker) = row.last_updated else {
                continue;
            };
            let entry = freshest
                .entry(row.symbol().to_string())
                .or_insert((marker, row.current_price));
            if marker >= entry.0 {
                *entry = (marker, row.current_price);
            }
        }
        freshest
            .into_iter()
            .map(|(symbol, (_, price))| (symbol, price))
            .collect()
    }

    /// Write a fetched quote onto every row of its symbol, stamping the
    /// rows with `fetched_on`. Returns the number of rows updated.
    pub fn apply_quote(
        &self,
        rows: &mut [TransactionRow],
        quote: &PriceQuote,
        fetched_on: NaiveDate,
    ) -> usize {
        let mut updated = 0;
        for row in rows.iter_mut().filter(|r| r.transaction.symbol == quote.symbol) {
            row.current_price = quote.price;
            row.last_updated = Some(fetched_on);
            updated += 1;
        }
        updated
    }

    /// Fill missing sector/industry/beta on every row of the profile's
    /// symbol. Values already present are kept. Returns the number of rows
    /// changed.
    pub fn apply_profile(&self, rows: &mut [TransactionRow], profile: &CompanyProfile) -> usize {
        let upper = normalize_symbol(&profile.symbol);
        let mut changed = 0;
        for row in rows.iter_mut().filter(|r| r.transaction.symbol == upper) {
            let tx = &row.transaction;
            let enriched = tx.clone().with_profile(
                tx.sector.clone().or_else(|| profile.sector.clone()),
                tx.industry.clone().or_else(|| profile.industry.clone()),
                tx.beta.or(profile.beta),
            );
            if enriched != row.transaction {
                row.transaction = enriched;
                changed += 1;
            }
        }
        changed
    }

    /// Symbols with at least one row lacking sector, industry or beta.
    pub fn symbols_missing_profile(&self, rows: &[TransactionRow]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for row in rows {
            if !row.transaction.has_profile() && !missing.iter().any(|s| s == row.symbol()) {
                missing.push(row.symbol().to_string());
            }
        }
        missing
    }

    /// Check that no sale of `symbol` would leave a negative position on
    /// its date. Used after removing a purchase.
    fn validate_consistency(&self, rows: &[TransactionRow], symbol: &str) -> Result<(), CoreError> {
        let dated = rows
            .iter()
            .map(|r| &r.transaction)
            .filter(|tx| tx.symbol == symbol);

        match first_oversell(dated) {
            Some((tx, held)) => Err(CoreError::ValidationError(format!(
                "Removing this purchase would make the sale of {} {} on {} invalid \
                 (only {:.4} would be held)",
                -tx.quantity, symbol, tx.date, held,
            ))),
            None => Ok(()),
        }
    }
}

/// First sale that sells more shares than are held when it is replayed,
/// with the quantity held just before it. Transactions replay in date
/// order with purchases ahead of sales on the same date.
fn first_oversell<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Option<(&'a Transaction, f64)> {
    let mut dated: Vec<&Transaction> = transactions.into_iter().collect();
    dated.sort_by_key(|tx| (tx.date, tx.is_sell()));

    let mut held = 0.0;
    for tx in dated {
        let before = held;
        held += tx.quantity;
        if tx.is_sell() && held < -QUANTITY_EPSILON {
            return Some((tx, before));
        }
    }
    None
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
