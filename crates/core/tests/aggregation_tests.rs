// ═══════════════════════════════════════════════════════════════════
// Aggregation Tests: weighted average cost, percent change, weighted
// beta, price fallback, invalid input handling
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use std::collections::HashMap;

use stock_portfolio_core::errors::CoreError;
use stock_portfolio_core::models::holding::{Aggregation, PriceSource};
use stock_portfolio_core::models::price::PriceQuote;
use stock_portfolio_core::models::transaction::Transaction;
use stock_portfolio_core::services::aggregation_service::AggregationService;

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn tx(d: &str, symbol: &str, quantity: f64, price: f64) -> Transaction {
    Transaction::new(date(d), symbol, quantity, price)
}

fn tx_beta(d: &str, symbol: &str, quantity: f64, price: f64, beta: f64) -> Transaction {
    tx(d, symbol, quantity, price).with_profile(None, None, Some(beta))
}

fn quotes(prices: &[(&str, f64)]) -> HashMap<String, PriceQuote> {
    prices
        .iter()
        .map(|(symbol, price)| {
            (
                symbol.to_string(),
                PriceQuote::new(*symbol, *price, date("2024-06-03")),
            )
        })
        .collect()
}

fn no_last_known() -> HashMap<String, f64> {
    HashMap::new()
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn run(transactions: &[Transaction], q: &[(&str, f64)]) -> Aggregation {
    AggregationService::new().aggregate(transactions, &quotes(q), &no_last_known())
}

// ═══════════════════════════════════════════════════════════════════
// Reference scenarios
// ═══════════════════════════════════════════════════════════════════

mod scenarios {
    use super::*;

    #[test]
    fn single_purchase_with_quote() {
        let agg = run(&[tx("2024-01-01", "AAPL", 10.0, 150.0)], &[("AAPL", 160.0)]);

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.total_quantity, 10.0));
        assert!(approx_eq(h.weighted_average_buy_price, 150.0));
        assert!(approx_eq(h.current_price, 160.0));
        assert!(approx_eq(h.total_value, 1600.0));
        assert!(approx_eq(h.percent_change.unwrap(), 100.0 / 15.0));
        assert_eq!(h.price_source, PriceSource::Quote);
        assert!(agg.issues.is_empty());
    }

    #[test]
    fn partial_sale_keeps_average_cost() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 150.0),
                tx("2024-02-01", "AAPL", -5.0, 0.0),
            ],
            &[("AAPL", 160.0)],
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.total_quantity, 5.0));
        assert!(approx_eq(h.weighted_average_buy_price, 150.0));
        assert!(approx_eq(h.total_value, 800.0));
        assert!(approx_eq(h.cost_basis, 750.0));
        assert!(approx_eq(h.gain_loss, 50.0));
        assert!(approx_eq(h.percent_change.unwrap(), 100.0 / 15.0));
    }

    #[test]
    fn weighted_beta_over_two_holdings() {
        let agg = run(
            &[
                tx_beta("2024-01-01", "AAPL", 10.0, 100.0, 1.2),
                tx_beta("2024-01-01", "MSFT", 10.0, 100.0, 0.8),
            ],
            &[("AAPL", 100.0), ("MSFT", 100.0)],
        );

        assert!(approx_eq(agg.summary.total_value, 2000.0));
        assert!(approx_eq(agg.summary.weighted_beta.unwrap(), 1.0));
    }

    #[test]
    fn all_betas_unknown_is_undefined() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-01-01", "MSFT", 10.0, 100.0),
            ],
            &[("AAPL", 100.0), ("MSFT", 100.0)],
        );

        assert!(agg.summary.weighted_beta.is_none());
        assert!(approx_eq(agg.summary.total_value, 2000.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Weighted average buy price
// ═══════════════════════════════════════════════════════════════════

mod weighted_average {
    use super::*;

    #[test]
    fn blends_purchases_by_quantity() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-03-01", "AAPL", 30.0, 200.0),
            ],
            &[("AAPL", 175.0)],
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.weighted_average_buy_price, 175.0));
        assert!(approx_eq(h.percent_change.unwrap(), 0.0));
    }

    #[test]
    fn fractional_shares() {
        let agg = run(
            &[
                tx("2024-01-01", "VOO", 0.5, 400.0),
                tx("2024-01-02", "VOO", 1.5, 440.0),
            ],
            &[("VOO", 450.0)],
        );

        let h = agg.get("VOO").unwrap();
        assert!(approx_eq(h.total_quantity, 2.0));
        assert!(approx_eq(h.weighted_average_buy_price, 430.0));
    }

    #[test]
    fn sale_then_purchase_blends_remaining_shares() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-02-01", "AAPL", -5.0, 120.0),
                tx("2024-03-01", "AAPL", 5.0, 200.0),
            ],
            &[("AAPL", 150.0)],
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.total_quantity, 10.0));
        assert!(approx_eq(h.weighted_average_buy_price, 150.0));
    }

    #[test]
    fn closing_a_position_resets_the_average() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-02-01", "AAPL", -10.0, 130.0),
                tx("2024-03-01", "AAPL", 5.0, 200.0),
            ],
            &[("AAPL", 210.0)],
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.total_quantity, 5.0));
        assert!(approx_eq(h.weighted_average_buy_price, 200.0));
    }

    #[test]
    fn replays_in_date_order_not_input_order() {
        // Sale listed before the purchase it draws from
        let agg = run(
            &[
                tx("2024-02-01", "AAPL", -5.0, 0.0),
                tx("2024-01-01", "AAPL", 10.0, 150.0),
            ],
            &[("AAPL", 160.0)],
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.total_quantity, 5.0));
        assert!(approx_eq(h.weighted_average_buy_price, 150.0));
        assert_eq!(h.earliest_date, date("2024-01-01"));
    }

    #[test]
    fn earliest_date_is_first_transaction() {
        let agg = run(
            &[
                tx("2024-05-01", "AAPL", 1.0, 100.0),
                tx("2023-11-15", "AAPL", 1.0, 100.0),
            ],
            &[],
        );
        assert_eq!(agg.get("AAPL").unwrap().earliest_date, date("2023-11-15"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Price resolution
// ═══════════════════════════════════════════════════════════════════

mod price_resolution {
    use super::*;

    #[test]
    fn missing_quote_uses_last_known_price() {
        let last_known = HashMap::from([("AAPL".to_string(), 170.0)]);
        let agg = AggregationService::new().aggregate(
            &[tx("2024-01-01", "AAPL", 10.0, 150.0)],
            &HashMap::new(),
            &last_known,
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.current_price, 170.0));
        assert_eq!(h.price_source, PriceSource::LastKnown);
        assert!(agg.issues.is_empty());
    }

    #[test]
    fn never_fetched_falls_back_to_buy_price() {
        let agg = run(&[tx("2024-01-01", "AAPL", 10.0, 150.0)], &[]);

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.current_price, 150.0));
        assert_eq!(h.price_source, PriceSource::BuyPrice);
        assert!(approx_eq(h.percent_change.unwrap(), 0.0));
        assert!(approx_eq(h.gain_loss, 0.0));
    }

    #[test]
    fn quote_wins_over_last_known() {
        let last_known = HashMap::from([("AAPL".to_string(), 170.0)]);
        let agg = AggregationService::new().aggregate(
            &[tx("2024-01-01", "AAPL", 10.0, 150.0)],
            &quotes(&[("AAPL", 180.0)]),
            &last_known,
        );
        assert!(approx_eq(agg.get("AAPL").unwrap().current_price, 180.0));
    }

    #[test]
    fn zero_quote_is_rejected_and_falls_back() {
        let last_known = HashMap::from([("AAPL".to_string(), 170.0)]);
        let agg = AggregationService::new().aggregate(
            &[tx("2024-01-01", "AAPL", 10.0, 150.0)],
            &quotes(&[("AAPL", 0.0)]),
            &last_known,
        );

        let h = agg.get("AAPL").unwrap();
        assert!(approx_eq(h.current_price, 170.0));
        assert_eq!(h.price_source, PriceSource::LastKnown);
        assert!(matches!(
            agg.issues.as_slice(),
            [CoreError::MalformedQuote { symbol, .. }] if symbol == "AAPL"
        ));
    }

    #[test]
    fn nan_and_negative_quotes_are_rejected() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 1.0, 100.0),
                tx("2024-01-01", "MSFT", 1.0, 200.0),
            ],
            &[("AAPL", f64::NAN), ("MSFT", -3.0)],
        );

        assert_eq!(agg.issues.len(), 2);
        assert_eq!(agg.get("AAPL").unwrap().price_source, PriceSource::BuyPrice);
        assert_eq!(agg.get("MSFT").unwrap().price_source, PriceSource::BuyPrice);
        assert!(agg.summary.total_value.is_finite());
    }

    #[test]
    fn invalid_last_known_is_ignored() {
        let last_known = HashMap::from([("AAPL".to_string(), f64::INFINITY)]);
        let agg = AggregationService::new().aggregate(
            &[tx("2024-01-01", "AAPL", 10.0, 150.0)],
            &HashMap::new(),
            &last_known,
        );
        assert_eq!(agg.get("AAPL").unwrap().price_source, PriceSource::BuyPrice);
    }

    #[test]
    fn quote_keys_are_case_insensitive() {
        let agg = run(&[tx("2024-01-01", "aapl", 10.0, 150.0)], &[("Aapl", 165.0)]);
        let h = agg.get("AAPL").unwrap();
        assert_eq!(h.symbol, "AAPL");
        assert!(approx_eq(h.current_price, 165.0));
    }

    #[test]
    fn quote_for_unknown_symbol_is_ignored() {
        let agg = run(&[tx("2024-01-01", "AAPL", 1.0, 150.0)], &[("TSLA", 200.0)]);
        assert_eq!(agg.symbols(), vec!["AAPL"]);
        assert!(agg.issues.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Invalid and degenerate input
// ═══════════════════════════════════════════════════════════════════

mod invalid_input {
    use super::*;

    #[test]
    fn empty_input_gives_empty_aggregation() {
        let agg = run(&[], &[]);
        assert!(agg.is_empty());
        assert_eq!(agg.summary.holdings_count, 0);
        assert!(approx_eq(agg.summary.total_value, 0.0));
        assert!(agg.summary.total_return_pct.is_none());
        assert!(agg.summary.weighted_beta.is_none());
    }

    #[test]
    fn zero_quantity_only_symbol_is_excluded() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 0.0, 150.0),
                tx("2024-01-01", "MSFT", 1.0, 300.0),
            ],
            &[("AAPL", 160.0), ("MSFT", 310.0)],
        );

        assert!(agg.get("AAPL").is_none());
        assert!(agg.get("MSFT").is_some());
        assert!(matches!(
            agg.issues.as_slice(),
            [CoreError::InvalidTransaction { symbol, .. }] if symbol == "AAPL"
        ));
    }

    #[test]
    fn closed_position_is_omitted_without_issue() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 150.0),
                tx("2024-02-01", "AAPL", -10.0, 170.0),
            ],
            &[("AAPL", 160.0)],
        );

        assert!(agg.is_empty());
        assert!(agg.issues.is_empty());
    }

    #[test]
    fn oversold_symbol_is_invalid() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 5.0, 150.0),
                tx("2024-02-01", "AAPL", -8.0, 170.0),
            ],
            &[("AAPL", 160.0)],
        );

        assert!(agg.get("AAPL").is_none());
        assert!(matches!(
            agg.issues.as_slice(),
            [CoreError::InvalidTransaction { .. }]
        ));
    }

    #[test]
    fn non_positive_purchase_price_is_invalid() {
        let agg = run(&[tx("2024-01-01", "AAPL", 5.0, 0.0)], &[("AAPL", 160.0)]);
        assert!(agg.is_empty());
        assert_eq!(agg.issues.len(), 1);
    }

    #[test]
    fn non_finite_quantity_is_invalid() {
        let agg = run(
            &[tx("2024-01-01", "AAPL", f64::NAN, 100.0)],
            &[("AAPL", 160.0)],
        );
        assert!(agg.is_empty());
        assert_eq!(agg.issues.len(), 1);
    }

    #[test]
    fn one_bad_symbol_does_not_hide_the_rest() {
        let agg = run(
            &[
                tx("2024-01-01", "BAD", 0.0, 1.0),
                tx("2024-01-01", "AAPL", 10.0, 150.0),
            ],
            &[("AAPL", 160.0)],
        );

        assert_eq!(agg.summary.holdings_count, 1);
        assert!(approx_eq(agg.summary.total_value, 1600.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Portfolio summary
// ═══════════════════════════════════════════════════════════════════

mod summary {
    use super::*;

    #[test]
    fn totals_and_return() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-01-01", "MSFT", 5.0, 200.0),
            ],
            &[("AAPL", 120.0), ("MSFT", 180.0)],
        );

        assert!(approx_eq(agg.summary.total_value, 2100.0));
        assert!(approx_eq(agg.summary.total_cost, 2000.0));
        assert!(approx_eq(agg.summary.total_gain_loss, 100.0));
        assert!(approx_eq(agg.summary.total_return_pct.unwrap(), 5.0));
        assert_eq!(agg.summary.holdings_count, 2);
    }

    #[test]
    fn weighted_beta_ignores_unknown_betas() {
        let agg = run(
            &[
                tx_beta("2024-01-01", "AAPL", 10.0, 100.0, 1.5),
                tx("2024-01-01", "MSFT", 30.0, 100.0),
            ],
            &[("AAPL", 100.0), ("MSFT", 100.0)],
        );
        assert!(approx_eq(agg.summary.weighted_beta.unwrap(), 1.5));
    }

    #[test]
    fn weighted_beta_weights_by_value() {
        let agg = run(
            &[
                tx_beta("2024-01-01", "AAPL", 30.0, 100.0, 2.0),
                tx_beta("2024-01-01", "KO", 10.0, 100.0, 0.4),
            ],
            &[("AAPL", 100.0), ("KO", 100.0)],
        );
        // (2.0 * 3000 + 0.4 * 1000) / 4000
        assert!(approx_eq(agg.summary.weighted_beta.unwrap(), 1.6));
    }

    #[test]
    fn latest_known_beta_is_used() {
        let agg = run(
            &[
                tx_beta("2024-01-01", "AAPL", 1.0, 100.0, 1.1),
                tx_beta("2024-02-01", "AAPL", 1.0, 100.0, 1.3),
                tx("2024-03-01", "AAPL", 1.0, 100.0),
            ],
            &[("AAPL", 100.0)],
        );
        assert_eq!(agg.get("AAPL").unwrap().beta, Some(1.3));
    }

    #[test]
    fn allocation_sums_to_one_hundred() {
        let agg = run(
            &[
                tx("2024-01-01", "AAPL", 3.0, 100.0),
                tx("2024-01-01", "MSFT", 1.0, 100.0),
            ],
            &[("AAPL", 100.0), ("MSFT", 100.0)],
        );

        assert!(approx_eq(agg.get("AAPL").unwrap().allocation_pct.unwrap(), 75.0));
        assert!(approx_eq(agg.get("MSFT").unwrap().allocation_pct.unwrap(), 25.0));
        let total: f64 = agg.holdings.iter().filter_map(|h| h.allocation_pct).sum();
        assert!(approx_eq(total, 100.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Determinism
// ═══════════════════════════════════════════════════════════════════

mod determinism {
    use super::*;

    fn ledger() -> Vec<Transaction> {
        vec![
            tx_beta("2024-01-01", "AAPL", 10.0, 150.0, 1.2),
            tx("2024-01-05", "MSFT", 4.0, 300.0),
            tx("2024-02-01", "AAPL", 5.0, 180.0),
            tx("2024-03-01", "AAPL", -3.0, 190.0),
            tx_beta("2024-03-02", "KO", 20.0, 60.0, 0.6),
            tx("2024-04-01", "MSFT", 2.0, 330.0),
        ]
    }

    fn prices() -> Vec<(&'static str, f64)> {
        vec![("AAPL", 200.0), ("MSFT", 320.0), ("KO", 58.0)]
    }

    #[test]
    fn holdings_follow_first_seen_order() {
        let agg = run(&ledger(), &prices());
        assert_eq!(agg.symbols(), vec!["AAPL", "MSFT", "KO"]);
    }

    #[test]
    fn same_input_same_output() {
        let a = run(&ledger(), &prices());
        let b = run(&ledger(), &prices());
        assert_eq!(a.holdings, b.holdings);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn same_date_purchase_and_sale_in_either_order() {
        let sale_first = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-02-01", "AAPL", -10.0, 0.0),
                tx("2024-02-01", "AAPL", 10.0, 200.0),
            ],
            &[("AAPL", 180.0)],
        );
        let purchase_first = run(
            &[
                tx("2024-01-01", "AAPL", 10.0, 100.0),
                tx("2024-02-01", "AAPL", 10.0, 200.0),
                tx("2024-02-01", "AAPL", -10.0, 0.0),
            ],
            &[("AAPL", 180.0)],
        );

        for agg in [&sale_first, &purchase_first] {
            let h = agg.get("AAPL").unwrap();
            assert!(agg.issues.is_empty());
            assert!(approx_eq(h.total_quantity, 10.0));
            assert!(approx_eq(h.weighted_average_buy_price, 150.0));
            assert!(approx_eq(h.percent_change.unwrap(), 20.0));
        }
    }

    #[test]
    fn reordering_transactions_changes_nothing_but_order() {
        let original = run(&ledger(), &prices());
        let mut reversed_ledger = ledger();
        reversed_ledger.reverse();
        let reversed = run(&reversed_ledger, &prices());

        assert_eq!(reversed.symbols(), vec!["MSFT", "KO", "AAPL"]);
        for holding in &original.holdings {
            let other = reversed.get(&holding.symbol).unwrap();
            assert!(approx_eq(holding.total_quantity, other.total_quantity));
            assert!(approx_eq(
                holding.weighted_average_buy_price,
                other.weighted_average_buy_price
            ));
            assert!(approx_eq(holding.total_value, other.total_value));
        }
        assert!(approx_eq(
            original.summary.total_value,
            reversed.summary.total_value
        ));
        assert!(approx_eq(
            original.summary.weighted_beta.unwrap(),
            reversed.summary.weighted_beta.unwrap()
        ));
    }
}
