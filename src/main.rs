use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use recycle_ledger::{
    build, summarize, summarize_by_operator, CatalogStore, Category, CategoryMap, LedgerConfig,
    LedgerStore, PriceCatalog, RecordFilter, RecordMeta, Summary,
};

/// Waste-bank transaction ledger and valuation engine
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Directory holding waste_prices.json and ledger.db
    /// (defaults to $RECYCLE_LEDGER_DATA_DIR or ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the price catalog with margins
    Prices,

    /// Record one deposit
    Record {
        /// Weights in kg, e.g. `Paper=20 PET_Bottles=5`
        #[arg(required = true, value_parser = parse_pair)]
        weights: Vec<(Category, f64)>,

        /// Payout rate override, e.g. `--rate Paper=2500` (defaults to catalog buy rate)
        #[arg(long = "rate", value_parser = parse_pair)]
        rates: Vec<(Category, f64)>,

        #[arg(long)]
        depositor: String,

        #[arg(long)]
        operator: String,

        #[arg(long, default_value = "Unit Pusat")]
        site: String,

        /// Deposit date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List recorded transactions
    List {
        #[arg(long)]
        operator: Option<String>,
    },

    /// Mark-to-market summary at current catalog prices
    Report {
        #[arg(long)]
        operator: Option<String>,

        /// One summary per operator
        #[arg(long)]
        by_operator: bool,
    },

    /// Import a legacy CSV logbook
    ImportCsv { path: PathBuf },
}

fn parse_pair(s: &str) -> Result<(Category, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=VALUE, got '{}'", s))?;
    let category: Category = name.parse().map_err(|e| format!("{}", e))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    Ok((category, value))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match cli.data_dir {
        Some(dir) => LedgerConfig::new(dir),
        None => LedgerConfig::from_env(),
    };
    config.ensure_dirs().context("Failed to create data directory")?;

    let catalog_store = CatalogStore::new(config.catalog_path());
    let ledger = LedgerStore::new(config.ledger_path());

    match cli.command {
        Command::Prices => run_prices(&catalog_store),
        Command::Record {
            weights,
            rates,
            depositor,
            operator,
            site,
            date,
        } => {
            let meta = RecordMeta::new(
                date.unwrap_or_else(|| Local::now().date_naive()),
                &depositor,
                &operator,
                &site,
            );
            run_record(&catalog_store, &ledger, weights, rates, meta)
        }
        Command::List { operator } => run_list(&ledger, operator),
        Command::Report {
            operator,
            by_operator,
        } => run_report(&catalog_store, &ledger, operator, by_operator),
        Command::ImportCsv { path } => {
            let count = ledger
                .import_legacy_csv(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!("✓ Imported {} transactions", count);
            println!("✓ Ledger now holds {} transactions", ledger.count()?);
            Ok(())
        }
    }
}

fn run_prices(catalog_store: &CatalogStore) -> Result<()> {
    let catalog = catalog_store.load().context("Failed to load price catalog")?;

    println!(
        "{:<16} {:<20} {:>10} {:>10} {:>10} {:>8}",
        "Category", "", "Buy/kg", "Sell/kg", "Margin", "Margin%"
    );
    for (category, entry) in catalog.iter() {
        println!(
            "{:<16} {:<20} {:>10} {:>10} {:>10} {:>7.1}%",
            category.as_str(),
            category.label(),
            entry.buy,
            entry.sell,
            entry.margin(),
            entry.margin_percent()
        );
    }
    println!();
    println!("Average margin:           {:.1}%", catalog.average_margin_percent());
    println!("Potential profit / tonne: Rp {:.0}", catalog.potential_profit_per_tonne());
    println!("Catalog fingerprint:      {}", catalog.fingerprint());

    Ok(())
}

fn run_record(
    catalog_store: &CatalogStore,
    ledger: &LedgerStore,
    weights: Vec<(Category, f64)>,
    rates: Vec<(Category, f64)>,
    meta: RecordMeta,
) -> Result<()> {
    let catalog = catalog_store.load().context("Failed to load price catalog")?;

    let weights: CategoryMap = weights.into_iter().collect();
    let rates: CategoryMap = rates.into_iter().collect();

    let record = build(&weights, &rates, &catalog, meta).context("Rejected deposit")?;
    ledger.append(&record).context("Failed to save transaction")?;

    println!("✅ Transaction {} saved", record.id());
    println!("   Paid to depositor:   Rp {:.0} ({:.1} kg)", record.total_paid(), record.total_weight());
    println!("   Resale estimate:     Rp {:.0}", record.total_resale_revenue());
    println!(
        "   Gross profit:        Rp {:.0} ({:.1}% margin)",
        record.gross_profit(),
        record.margin_percent()
    );

    Ok(())
}

fn run_list(ledger: &LedgerStore, operator: Option<String>) -> Result<()> {
    let filter = RecordFilter { operator };
    let records = ledger.all(&filter).context("Failed to read ledger")?;

    if records.is_empty() {
        println!("No transactions recorded yet.");
        return Ok(());
    }

    for record in &records {
        let paid = if record.has_recorded_financials() {
            format!("Rp {:.0}", record.total_paid())
        } else {
            "n/a (legacy)".to_string()
        };
        println!(
            "{}  {:<24} {:<12} {:>8.1} kg  {}",
            record.date(),
            record.depositor(),
            record.operator(),
            record.total_weight(),
            paid
        );
    }
    println!("\n{} transactions", records.len());

    Ok(())
}

fn run_report(
    catalog_store: &CatalogStore,
    ledger: &LedgerStore,
    operator: Option<String>,
    by_operator: bool,
) -> Result<()> {
    let catalog = catalog_store.load().context("Failed to load price catalog")?;
    let records = ledger
        .all(&RecordFilter { operator })
        .context("Failed to read ledger")?;

    if by_operator {
        for (operator, summary) in summarize_by_operator(&records, &catalog) {
            println!("{}: {}", operator, summary.headline());
        }
        return Ok(());
    }

    let summary = summarize(&records, &catalog);
    print_summary(&summary, &catalog);

    let legacy = records.iter().filter(|r| !r.has_recorded_financials()).count();
    if legacy > 0 {
        println!("\n⚠️  {} legacy transactions have no recorded cost (counted as 0)", legacy);
    }

    Ok(())
}

fn print_summary(summary: &Summary, catalog: &PriceCatalog) {
    println!("📊 {}", summary.headline());
    println!();
    println!("{:<16} {:>10} {:>10} {:>14}", "Category", "kg", "Sell/kg", "Value");
    for row in summary.category_breakdown(catalog) {
        if row.weight > 0.0 {
            println!(
                "{:<16} {:>10.1} {:>10.0} {:>14.0}",
                row.category.as_str(),
                row.weight,
                row.sell_rate,
                row.market_value
            );
        }
    }
    println!();
    println!("Historical cost:          Rp {:.0}", summary.historical_cost);
    println!("Current market value:     Rp {:.0}", summary.current_market_value);
    println!("Net position:             Rp {:.0}", summary.net_position);
    println!("Recorded resale estimate: Rp {:.0}", summary.recorded_resale_estimate);
    println!("Revaluation since entry:  Rp {:.0}", summary.revaluation_gain());
}
