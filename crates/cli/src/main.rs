use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use stock_portfolio_core::models::holding::{Aggregation, PortfolioSummary};
use stock_portfolio_core::models::settings::Settings;
use stock_portfolio_core::{PortfolioTracker, RefreshReport};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "portfolio", about = "Track a stock portfolio from a CSV ledger")]
struct Args {
    /// Transaction CSV file
    #[arg(long, global = true, env = "PORTFOLIO_CSV")]
    csv: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a purchase, or a sale with a negative quantity
    Add {
        symbol: String,
        #[arg(allow_hyphen_values = true)]
        quantity: f64,
        price: f64,
        /// Trade date (YYYY-MM-DD), defaults to today's market date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Remove the transaction at INDEX (as shown by `list`)
    Remove { index: usize },
    /// List every transaction
    List,
    /// Show holdings at their last-known prices
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Fetch the latest quotes, save them, and show holdings
    Refresh {
        /// Skip the sector/industry/beta lookup
        #[arg(long)]
        no_profiles: bool,
    },
    /// Print treemap tiles for the current holdings
    Treemap {
        #[arg(long, default_value = "100")]
        width: f64,
        #[arg(long, default_value = "60")]
        height: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}=info,stock_portfolio_core=info", env!("CARGO_CRATE_NAME")).into()
        }))
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(csv) = args.csv {
        settings.csv_path = csv;
    }
    let path = settings.csv_path.clone();

    let mut tracker = PortfolioTracker::load_from_file(&path, settings)
        .with_context(|| format!("failed to load {path}"))?;
    for issue in tracker.load_issues() {
        warn!(%issue, "skipped row");
    }
    debug!(?tracker, "ledger loaded");

    match args.command {
        Commands::Add {
            symbol,
            quantity,
            price,
            date,
        } => {
            let date = date.unwrap_or_else(|| tracker.settings().market_today());
            let index = tracker.add_transaction(date, &symbol, quantity, price)?;
            tracker.save_to_file(&path)?;
            let side = if quantity > 0.0 { "BUY".green() } else { "SELL".red() };
            println!(
                "{side} {} {} @ ${price:.2} on {date} (row {index})",
                quantity.abs(),
                symbol.to_uppercase()
            );
        }
        Commands::Remove { index } => {
            let removed = tracker.remove_transaction(index)?;
            tracker.save_to_file(&path)?;
            let tx = &removed.transaction;
            println!(
                "Removed row {index}: {} {} {} @ ${:.2}",
                tx.date, tx.symbol, tx.quantity, tx.buy_price
            );
        }
        Commands::List => print_rows(&tracker),
        Commands::Show { json } => {
            if json {
                println!("{}", tracker.export_aggregation_json()?);
            } else {
                print_aggregation(&tracker.aggregate());
            }
        }
        Commands::Refresh { no_profiles } => {
            let today = tracker.settings().market_today();
            if !tracker.has_quote_providers() {
                warn!("no quote providers configured; showing last-known prices");
            }
            let (report, aggregation) = if no_profiles {
                tracker.refresh(today).await
            } else {
                let (report, enriched, aggregation) = tracker.refresh_with_profiles(today).await;
                if !enriched.is_empty() {
                    println!("Profiles updated: {}", enriched.join(", "));
                }
                (report, aggregation)
            };
            if tracker.has_unsaved_changes() {
                tracker.save_to_file(&path)?;
            }
            print_report(&report);
            print_aggregation(&aggregation);
        }
        Commands::Treemap { width, height } => {
            for tile in tracker.treemap(width, height) {
                println!(
                    "{:<8} x={:>8.2} y={:>8.2} w={:>8.2} h={:>8.2} {}",
                    tile.symbol,
                    tile.rect.x,
                    tile.rect.y,
                    tile.rect.dx,
                    tile.rect.dy,
                    tile.color.to_hex()
                );
            }
        }
    }

    Ok(())
}

fn print_rows(tracker: &PortfolioTracker) {
    println!(
        "{:>4}  {:<10}  {:<8}  {:>12}  {:>10}  {:>10}  {:<10}",
        "#", "Date", "Symbol", "Quantity", "Price", "Current", "Updated"
    );
    for (index, row) in tracker.rows().iter().enumerate() {
        let tx = &row.transaction;
        let updated = row
            .last_updated
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{index:>4}  {:<10}  {:<8}  {:>12.4}  {:>10.2}  {:>10.2}  {:<10}",
            tx.date, tx.symbol, tx.quantity, tx.buy_price, row.current_price, updated
        );
    }
}

fn print_report(report: &RefreshReport) {
    println!(
        "Quotes: {} updated, {} already current, {} failed",
        report.updated(),
        report.current.len(),
        report.failed.len()
    );
    for (symbol, message) in &report.failed {
        println!("  {} {symbol}: {message}", "failed".red());
    }
}

fn print_aggregation(aggregation: &Aggregation) {
    if aggregation.is_empty() {
        println!("No holdings.");
        return;
    }

    println!(
        "{:<8}  {:>12}  {:>10}  {:>10}  {:>12}  {:>9}  {:>7}  {:<10}  {:<11}",
        "Symbol", "Quantity", "Avg Buy", "Current", "Value", "Change", "Beta", "Source", "Since"
    );
    for h in &aggregation.holdings {
        println!(
            "{:<8}  {:>12.4}  {:>10.2}  {:>10.2}  {:>12.2}  {:>9}  {:>7}  {:<10}  {:<11}",
            h.symbol,
            h.total_quantity,
            h.weighted_average_buy_price,
            h.current_price,
            h.total_value,
            pct(h.percent_change),
            h.beta.map(|b| format!("{b:.2}")).unwrap_or_else(|| "N/A".into()),
            h.price_source.to_string(),
            h.earliest_date,
        );
    }
    print_summary(&aggregation.summary);
}

fn print_summary(summary: &PortfolioSummary) {
    println!();
    println!("Total value:  ${:.2}", summary.total_value);
    println!("Total cost:   ${:.2}", summary.total_cost);
    println!(
        "Gain/loss:    {} ({})",
        signed(summary.total_gain_loss, format!("${:.2}", summary.total_gain_loss)),
        pct(summary.total_return_pct)
    );
    println!(
        "Beta:         {}",
        summary
            .weighted_beta
            .map(|b| format!("{b:.2}"))
            .unwrap_or_else(|| "N/A".into())
    );
}

/// Percent change, colored by sign; undefined renders as N/A.
fn pct(value: Option<f64>) -> ColoredString {
    match value {
        Some(p) => signed(p, format!("{p:.2}%")),
        None => "N/A".normal(),
    }
}

fn signed(value: f64, text: String) -> ColoredString {
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}
