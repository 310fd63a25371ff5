use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::holding::{Aggregation, HoldingAggregate, PortfolioSummary, PriceSource};
use crate::models::price::PriceQuote;
use crate::models::transaction::{normalize_symbol, Transaction};

/// Net quantities within this distance of zero count as a closed position.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Turns the transaction ledger plus the latest quotes into per-symbol
/// holdings and portfolio totals.
///
/// Pure computation: no I/O, no clock, no state kept between calls, so the
/// same inputs always produce the same `Aggregation`. Bad input for one
/// symbol (or one quote) is recorded in `Aggregation::issues` and the rest
/// of the portfolio is still aggregated.
pub struct AggregationService;

/// Per-symbol position reduced from its transactions, before pricing.
struct Position {
    total_quantity: f64,
    average_cost: f64,
    earliest_date: NaiveDate,
    sector: Option<String>,
    industry: Option<String>,
    beta: Option<f64>,
}

impl AggregationService {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate `transactions` into holdings.
    ///
    /// Price resolution per symbol:
    /// 1. a valid entry in `quotes` (price finite and > 0);
    /// 2. otherwise the caller's `last_known` price for the symbol;
    /// 3. otherwise the weighted average buy price (nothing fetched yet).
    ///
    /// Holdings come out in first-seen symbol order so layouts built on top
    /// of them stay stable between refreshes.
    pub fn aggregate(
        &self,
        transactions: &[Transaction],
        quotes: &HashMap<String, PriceQuote>,
        last_known: &HashMap<String, f64>,
    ) -> Aggregation {
        let mut issues = Vec::new();

        // 1. Group by symbol, remembering first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&Transaction>> = HashMap::new();
        for tx in transactions {
            let symbol = normalize_symbol(&tx.symbol);
            groups
                .entry(symbol.clone())
                .or_insert_with(|| {
                    order.push(symbol);
                    Vec::new()
                })
                .push(tx);
        }

        let quotes = normalize_keys(quotes);
        let last_known = normalize_keys(last_known);

        // 2–4. Reduce, price and value each symbol
        let mut holdings = Vec::with_capacity(order.len());
        for symbol in &order {
            let position = match Self::reduce_position(symbol, &groups[symbol]) {
                Ok(Some(position)) => position,
                Ok(None) => {
                    debug!(%symbol, "position closed, omitted from holdings");
                    continue;
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "excluding symbol from aggregation");
                    issues.push(e);
                    continue;
                }
            };

            let quote = match quotes.get(symbol) {
                Some(quote) if quote.is_valid() => Some(quote.price),
                Some(quote) => {
                    warn!(%symbol, price = quote.price, "rejecting malformed quote");
                    issues.push(CoreError::MalformedQuote {
                        symbol: symbol.clone(),
                        price: quote.price,
                    });
                    None
                }
                None => None,
            };

            let (current_price, price_source) = match quote {
                Some(price) => (price, PriceSource::Quote),
                None => match last_known.get(symbol) {
                    Some(&&price) if price.is_finite() && price > 0.0 => {
                        (price, PriceSource::LastKnown)
                    }
                    _ => (position.average_cost, PriceSource::BuyPrice),
                },
            };

            let total_value = position.total_quantity * current_price;
            let cost_basis = position.total_quantity * position.average_cost;
            let percent_change = if position.average_cost != 0.0 {
                Some((current_price - position.average_cost) / position.average_cost * 100.0)
            } else {
                None
            };

            debug!(
                %symbol,
                quantity = position.total_quantity,
                buy_price = position.average_cost,
                current_price,
                source = %price_source,
                pct_change = ?percent_change,
                "aggregated holding"
            );

            holdings.push(HoldingAggregate {
                symbol: symbol.clone(),
                total_quantity: position.total_quantity,
                weighted_average_buy_price: position.average_cost,
                current_price,
                price_source,
                total_value,
                cost_basis,
                gain_loss: total_value - cost_basis,
                percent_change,
                allocation_pct: None, // filled below
                earliest_date: position.earliest_date,
                sector: position.sector,
                industry: position.industry,
                beta: position.beta,
            });
        }

        // 5–6. Portfolio totals
        let summary = Self::summarize(&holdings);

        for holding in &mut holdings {
            holding.allocation_pct = if summary.total_value != 0.0 {
                Some(holding.total_value / summary.total_value * 100.0)
            } else {
                None
            };
        }

        Aggregation {
            holdings,
            summary,
            issues,
        }
    }

    /// Reduce one symbol's transactions to a net position.
    ///
    /// Cost basis uses the average-cost method: purchases blend into the
    /// running average, sales remove shares at that average and leave it
    /// unchanged. Transactions are replayed in date order (purchases before
    /// sales on equal dates). For purchase-only groups the result equals
    /// `Σ(qty·price) / Σqty`.
    ///
    /// Returns `Ok(None)` for a position that sales closed out exactly.
    fn reduce_position(
        symbol: &str,
        transactions: &[&Transaction],
    ) -> Result<Option<Position>, CoreError> {
        let invalid = |reason: String| CoreError::InvalidTransaction {
            symbol: symbol.to_string(),
            reason,
        };

        for tx in transactions {
            if !tx.quantity.is_finite() {
                return Err(invalid(format!("quantity {} on {} is not finite", tx.quantity, tx.date)));
            }
            if tx.is_buy() && !(tx.buy_price.is_finite() && tx.buy_price > 0.0) {
                return Err(invalid(format!(
                    "purchase on {} has non-positive price {}",
                    tx.date, tx.buy_price
                )));
            }
        }

        if transactions.iter().all(|tx| tx.quantity == 0.0) {
            return Err(invalid("every transaction has zero quantity".into()));
        }

        let mut ordered: Vec<&Transaction> = transactions.to_vec();
        // Same-date purchases replay before sales
        ordered.sort_by_key(|tx| (tx.date, tx.is_sell()));

        let mut held = 0.0;
        let mut average_cost = 0.0;
        let mut sector = None;
        let mut industry = None;
        let mut beta = None;

        for tx in &ordered {
            if tx.is_buy() {
                let new_held = held + tx.quantity;
                average_cost = if held > QUANTITY_EPSILON {
                    (average_cost * held + tx.quantity * tx.buy_price) / new_held
                } else {
                    tx.buy_price
                };
                held = new_held;
            } else if tx.is_sell() {
                held += tx.quantity;
                if held.abs() <= QUANTITY_EPSILON {
                    held = 0.0;
                    average_cost = 0.0;
                }
            }

            // Most recent known metadata wins
            if tx.sector.is_some() {
                sector = tx.sector.clone();
            }
            if tx.industry.is_some() {
                industry = tx.industry.clone();
            }
            if let Some(b) = tx.beta.filter(|b| b.is_finite()) {
                beta = Some(b);
            }
        }

        let total_quantity: f64 = transactions.iter().map(|tx| tx.quantity).sum();

        if total_quantity.abs() <= QUANTITY_EPSILON {
            return Ok(None);
        }
        if total_quantity < 0.0 {
            return Err(invalid(format!(
                "net quantity {total_quantity} is negative (more shares sold than bought)"
            )));
        }

        // `ordered` is non-empty here, so a minimum date always exists
        let earliest_date = ordered
            .iter()
            .map(|tx| tx.date)
            .min()
            .ok_or_else(|| invalid("no transactions".into()))?;

        Ok(Some(Position {
            total_quantity,
            average_cost,
            earliest_date,
            sector,
            industry,
            beta,
        }))
    }

    /// Portfolio totals and value-weighted beta.
    ///
    /// Holdings with an unknown beta are left out of both the numerator and
    /// the denominator of the beta average.
    fn summarize(holdings: &[HoldingAggregate]) -> PortfolioSummary {
        let total_value: f64 = holdings.iter().map(|h| h.total_value).sum();
        let total_cost: f64 = holdings.iter().map(|h| h.cost_basis).sum();
        let total_gain_loss = total_value - total_cost;

        let (beta_weighted_sum, beta_value) = holdings
            .iter()
            .filter_map(|h| h.beta.map(|b| (b * h.total_value, h.total_value)))
            .fold((0.0, 0.0), |(num, den), (n, d)| (num + n, den + d));

        let weighted_beta = if total_value != 0.0 && beta_value != 0.0 {
            Some(beta_weighted_sum / beta_value)
        } else {
            None
        };

        PortfolioSummary {
            total_value,
            total_cost,
            total_gain_loss,
            total_return_pct: if total_cost != 0.0 {
                Some(total_gain_loss / total_cost * 100.0)
            } else {
                None
            },
            weighted_beta,
            holdings_count: holdings.len(),
        }
    }
}

impl Default for AggregationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-key a symbol map with normalized (trimmed, uppercased) symbols.
fn normalize_keys<V>(map: &HashMap<String, V>) -> HashMap<String, &V> {
    map.iter()
        .map(|(symbol, value)| (normalize_symbol(symbol), value))
        .collect()
}
