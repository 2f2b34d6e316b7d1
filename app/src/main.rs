// In app/src/main.rs

use anyhow::{Context, Result};
use api_client::{PriceSource, QuoteFetcher};
use app_config::Settings;
use clap::{Parser, Subcommand};
use core_types::{Symbol, round_money};
use database::Db;
use engine::QuoteRefresher;
use execution::TradeLedger;
use market_data::{Clock, QuoteStore, SystemClock};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use web_server::AppState;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A margin-trading ledger with a cached quote feed.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the quote refresher and the HTTP API until interrupted.
    Run,

    /// Fetches one price from the upstream provider and prints it.
    Quote {
        /// The symbol to quote (e.g., "EUR/USD", "BTC/USD", "AAPL").
        symbol: String,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = app_config::load_settings().context("failed to load settings")?;
    init_tracing(&settings.app.log_level);

    tracing::info!(environment = %settings.app.environment, "Starting ledger application");

    match cli.command {
        Commands::Run => run_app(settings).await?,
        Commands::Quote { symbol } => handle_quote(&settings, &symbol).await?,
    }

    tracing::info!("Ledger application has finished successfully.");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let level = tracing::Level::from_str(log_level).unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("tower_http", tracing::Level::INFO)
            .with_default(level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();
}

// --- "Run" Subcommand Logic ---

/// Wires the quote store, ledger, refresher and web server, and runs until Ctrl-C.
async fn run_app(settings: Settings) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (events_tx, _) = broadcast::channel(events::EVENT_CHANNEL_CAPACITY);

    let fetcher: Arc<dyn PriceSource> = Arc::new(QuoteFetcher::from_settings(&settings.quotes)?);
    let quotes = QuoteStore::with_events(
        fetcher,
        clock.clone(),
        Duration::from_secs(settings.quotes.cache_ttl_secs),
        events_tx.clone(),
    );

    let db = Db::seeded(&settings.accounts, clock.now());
    let ledger = TradeLedger::from_settings(&settings.ledger, db, quotes.clone(), clock, events_tx);

    let shutdown = CancellationToken::new();
    let refresher = QuoteRefresher::from_settings(quotes, &settings.quotes, shutdown.clone());
    tracing::info!(
        symbols = refresher.watch_list().len(),
        "Watch-list loaded."
    );
    let refresher_handle = refresher.spawn();

    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        web_server::run(&settings.server, AppState::new(ledger), server_shutdown).await
    });

    tracing::info!("Quote refresher and web server are running. Press Ctrl-C to stop.");

    // Either an interrupt or the server stopping on its own ends the run.
    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested.");
            shutdown.cancel();
            (&mut server_handle).await
        }
        result = &mut server_handle => {
            tracing::error!(?result, "Web server task has terminated unexpectedly.");
            shutdown.cancel();
            result
        }
    };

    refresher_handle.await.context("quote refresher panicked")?;
    server_result.context("web server panicked")??;

    Ok(())
}

// --- "Quote" Subcommand Logic ---

async fn handle_quote(settings: &Settings, raw: &str) -> Result<()> {
    let symbol = Symbol::parse(raw)?;
    let fetcher = QuoteFetcher::from_settings(&settings.quotes)?;

    tracing::info!(symbol = %symbol, asset_class = ?symbol.asset_class(), "Fetching quote.");
    let price = fetcher.fetch(&symbol).await?;

    println!("{symbol}\t{price}\t(~{})", round_money(price));
    Ok(())
}
