// In crates/engine/src/refresher.rs

use app_config::QuoteSettings;
use core_types::Symbol;
use futures::future;
use market_data::QuoteStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Outcome of one pass over the watch-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<Symbol>,
    pub failed: Vec<Symbol>,
}

/// A background task that keeps a fixed watch-list of symbols warm in the quote store.
///
/// The loop ticks once immediately and then every `interval`. Cancelling the token stops
/// further rounds; a round already in progress runs to completion, and each fetch in it
/// is bounded by the fetcher's own timeout and retry limit.
pub struct QuoteRefresher {
    store: QuoteStore,
    watch_list: Vec<Symbol>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl QuoteRefresher {
    pub fn new(
        store: QuoteStore,
        watch_list: Vec<Symbol>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            watch_list,
            interval,
            shutdown,
        }
    }

    /// Builds a refresher from the quote settings. Blank watch-list entries are skipped.
    pub fn from_settings(
        store: QuoteStore,
        settings: &QuoteSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let watch_list = settings
            .watch_list
            .iter()
            .filter_map(|raw| match Symbol::parse(raw) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    tracing::warn!(entry = %raw, error = %e, "Ignoring watch-list entry.");
                    None
                }
            })
            .collect();

        Self::new(
            store,
            watch_list,
            Duration::from_secs(settings.refresh_interval_secs()),
            shutdown,
        )
    }

    pub fn watch_list(&self) -> &[Symbol] {
        &self.watch_list
    }

    /// Spawns the refresh loop onto the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs until the shutdown token is cancelled.
    pub async fn run(&self) {
        tracing::info!(
            symbols = self.watch_list.len(),
            interval_secs = self.interval.as_secs(),
            "Quote refresher started."
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.refresh_all().await;
                    if !report.failed.is_empty() {
                        tracing::warn!(failed = ?report.failed, "Some watch-list quotes could not be refreshed.");
                    }
                }
            }
        }

        tracing::info!("Quote refresher stopped.");
    }

    /// Refreshes every watch-listed symbol concurrently, regardless of cache freshness.
    pub async fn refresh_all(&self) -> RefreshReport {
        let outcomes = future::join_all(self.watch_list.iter().map(|symbol| async move {
            (symbol.clone(), self.store.refresh(symbol).await)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(quote) => {
                    tracing::debug!(symbol = %symbol, price = %quote.price, "Watch-list quote refreshed.");
                    report.refreshed.push(symbol);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Watch-list refresh failed.");
                    report.failed.push(symbol);
                }
            }
        }
        report
    }

    /// Caller-triggered refresh for a single symbol, on the watch-list or not.
    pub async fn refresh_symbol(&self, symbol: &Symbol) -> market_data::Result<core_types::Quote> {
        self.store.refresh(symbol).await
    }
}
