// In crates/market-data/src/store.rs

use crate::{Clock, QuoteError, Result};
use api_client::PriceSource;
use core_types::{Quote, Symbol};
use events::LedgerEvent;
use futures::future::{BoxFuture, FutureExt, Shared};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

type SharedFetch = Shared<BoxFuture<'static, Result<Quote>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

/// Per-symbol cache state: the last good quote and the fetch currently running, if any.
#[derive(Default)]
struct Slot {
    quote: Option<Quote>,
    in_flight: Option<InFlight>,
}

struct Inner {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    /// Held only for map bookkeeping, never across an await.
    slots: Mutex<HashMap<Symbol, Slot>>,
    next_fetch_id: AtomicU64,
    events: Option<broadcast::Sender<LedgerEvent>>,
}

impl Inner {
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<Symbol, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the outcome of fetch `id`. A failure leaves the previous quote in place.
    ///
    /// A slot that ends up with neither a quote nor a running fetch is dropped, so
    /// symbols that never resolve do not accumulate.
    fn settle(&self, symbol: &Symbol, id: u64, outcome: &Result<Quote>) {
        {
            let mut slots = self.lock_slots();
            let slot = slots.entry(symbol.clone()).or_default();
            if slot.in_flight.as_ref().is_some_and(|f| f.id == id) {
                slot.in_flight = None;
            }
            if let Ok(quote) = outcome {
                slot.quote = Some(quote.clone());
            }
            if slot.quote.is_none() && slot.in_flight.is_none() {
                slots.remove(symbol);
            }
        }

        match outcome {
            Ok(quote) => {
                tracing::debug!(symbol = %symbol, price = %quote.price, "Quote stored.");
                if let Some(tx) = &self.events {
                    let _ = tx.send(LedgerEvent::QuoteUpdated(quote.clone()));
                }
            }
            Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Quote fetch failed."),
        }
    }
}

/// A time-bounded cache of market prices in front of a `PriceSource`.
///
/// Cheap to clone; all clones share one cache. Concurrent lookups of the same
/// missing or expired symbol share a single upstream fetch and its outcome, while
/// lookups of other symbols proceed independently.
#[derive(Clone)]
pub struct QuoteStore {
    inner: Arc<Inner>,
}

impl QuoteStore {
    pub fn new(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::build(source, clock, ttl, None)
    }

    /// Like `new`, also publishing a `QuoteUpdated` event for every stored quote.
    pub fn with_events(
        source: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        events: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self::build(source, clock, ttl, Some(events))
    }

    fn build(
        source: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        events: Option<broadcast::Sender<LedgerEvent>>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5_200));
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                ttl,
                slots: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Returns the price for `symbol`, fetching it when the cached quote is missing or expired.
    pub async fn get(&self, symbol: &Symbol) -> Result<Decimal> {
        self.get_quote(symbol).await.map(|quote| quote.price)
    }

    /// Returns the full quote for `symbol`, fetching it when missing or expired.
    ///
    /// A failed fetch is reported as an error even if an expired quote is still held.
    pub async fn get_quote(&self, symbol: &Symbol) -> Result<Quote> {
        let fetch = {
            let mut slots = self.inner.lock_slots();
            let now = self.inner.clock.now();
            let cached = slots
                .get(symbol)
                .and_then(|slot| slot.quote.as_ref())
                .filter(|q| q.is_fresh(now, self.inner.ttl));

            if let Some(quote) = cached {
                tracing::debug!(symbol = %symbol, "Quote cache hit.");
                return Ok(quote.clone());
            }
            // The slot is populated with an in-flight fetch before the lock is released.
            let slot = slots.entry(symbol.clone()).or_default();
            self.join_or_start(symbol, slot)
        };
        fetch.await
    }

    /// Fetches `symbol` regardless of freshness and republishes it.
    ///
    /// Joins a fetch that is already running instead of starting a second one.
    pub async fn refresh(&self, symbol: &Symbol) -> Result<Quote> {
        let fetch = {
            let mut slots = self.inner.lock_slots();
            let slot = slots.entry(symbol.clone()).or_default();
            self.join_or_start(symbol, slot)
        };
        fetch.await
    }

    /// The last stored quote for `symbol`, fresh or not. Never fetches.
    pub fn cached(&self, symbol: &Symbol) -> Option<Quote> {
        self.inner
            .lock_slots()
            .get(symbol)
            .and_then(|slot| slot.quote.clone())
    }

    fn join_or_start(&self, symbol: &Symbol, slot: &mut Slot) -> SharedFetch {
        if let Some(in_flight) = &slot.in_flight {
            tracing::debug!(symbol = %symbol, "Joining in-flight quote fetch.");
            return in_flight.fetch.clone();
        }

        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let symbol = symbol.clone();
        tracing::debug!(symbol = %symbol, fetch_id = id, "Starting quote fetch.");

        let fetch = async move {
            let outcome = match inner.source.fetch(&symbol).await {
                Ok(price) => Ok(Quote::new(symbol.clone(), price, inner.clock.now())),
                Err(e) => Err(QuoteError::Unavailable {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                }),
            };
            inner.settle(&symbol, id, &outcome);
            outcome
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            fetch: fetch.clone(),
        });
        fetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::future::join_all;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    /// Answers `100 + n` on the n-th call, after an optional delay.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        fn with_delay(delay: Duration) -> Self {
            Self { delay, ..Default::default() }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn fetch(&self, symbol: &Symbol) -> api_client::Result<Decimal> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol.as_str() == "SLOW" {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            } else if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(api_client::Error::MissingPrice);
            }
            Ok(dec!(100) + Decimal::from(n))
        }
    }

    fn store_with(source: Arc<CountingSource>) -> (QuoteStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = QuoteStore::new(source, clock.clone(), Duration::from_secs(300));
        (store, clock)
    }

    fn aapl() -> Symbol {
        Symbol("AAPL".to_string())
    }

    #[tokio::test]
    async fn test_fresh_quote_served_from_cache_until_ttl() {
        let source = Arc::new(CountingSource::default());
        let (store, clock) = store_with(source.clone());

        assert_eq!(store.get(&aapl()).await.unwrap(), dec!(100));
        assert_eq!(source.calls(), 1);

        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(store.get(&aapl()).await.unwrap(), dec!(100));
        assert_eq!(source.calls(), 1);

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(store.get(&aapl()).await.unwrap(), dec!(101));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_fetch() {
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
        let (store, _clock) = store_with(source.clone());
        let symbol = aapl();

        let results = join_all((0..16).map(|_| store.get(&symbol))).await;

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|r| r.as_ref().ok() == Some(&dec!(100))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_across_tasks_share_one_fetch() {
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
        let (store, _clock) = store_with(source.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get(&aapl()).await })
            })
            .collect();
        let prices: Vec<Decimal> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(source.calls(), 1);
        assert!(prices.iter().all(|p| *p == dec!(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_then_retried_by_next_caller() {
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
        source.failing.store(true, Ordering::SeqCst);
        let (store, _clock) = store_with(source.clone());
        let symbol = aapl();

        let results = join_all((0..4).map(|_| store.get(&symbol))).await;

        assert_eq!(source.calls(), 1);
        for result in &results {
            assert!(matches!(result, Err(QuoteError::Unavailable { symbol, .. }) if symbol.as_str() == "AAPL"));
        }

        source.failing.store(false, Ordering::SeqCst);
        assert_eq!(store.get(&symbol).await.unwrap(), dec!(101));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_quote_is_not_served_when_refetch_fails() {
        let source = Arc::new(CountingSource::default());
        let (store, clock) = store_with(source.clone());
        store.get(&aapl()).await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(301));

        assert!(store.get(&aapl()).await.is_err());
        assert_eq!(store.cached(&aapl()).map(|q| q.price), Some(dec!(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_symbol_does_not_block_others() {
        let source = Arc::new(CountingSource::default());
        let (store, _clock) = store_with(source.clone());

        let slow_store = store.clone();
        let slow = tokio::spawn(async move { slow_store.get(&Symbol("SLOW".into())).await });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(1), store.get(&aapl())).await;

        assert!(matches!(fast, Ok(Ok(_))));
        assert!(!slow.is_finished());
        slow.abort();
    }

    #[tokio::test]
    async fn test_unresolvable_symbols_leave_no_slots_behind() {
        let source = Arc::new(CountingSource::default());
        source.failing.store(true, Ordering::SeqCst);
        let (store, _clock) = store_with(source.clone());

        for i in 0..1_000 {
            assert!(store.get(&Symbol(format!("BOGUS{i}"))).await.is_err());
        }
        assert!(store.refresh(&Symbol("BOGUS".into())).await.is_err());

        assert_eq!(source.calls(), 1_001);
        assert!(store.inner.lock_slots().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_slot_with_old_quote() {
        let source = Arc::new(CountingSource::default());
        let (store, clock) = store_with(source.clone());
        store.get(&aapl()).await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(301));
        assert!(store.get(&aapl()).await.is_err());

        assert_eq!(store.inner.lock_slots().len(), 1);
        assert!(store.cached(&aapl()).is_some());
    }

    #[tokio::test]
    async fn test_refresh_bypasses_ttl() {
        let source = Arc::new(CountingSource::default());
        let (store, _clock) = store_with(source.clone());

        store.get(&aapl()).await.unwrap();
        let refreshed = store.refresh(&aapl()).await.unwrap();

        assert_eq!(refreshed.price, dec!(101));
        assert_eq!(store.get(&aapl()).await.unwrap(), dec!(101));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_stored_quotes_are_published() {
        let (tx, mut rx) = broadcast::channel(8);
        let source = Arc::new(CountingSource::default());
        let clock = Arc::new(ManualClock::default());
        let store = QuoteStore::with_events(source, clock, Duration::from_secs(300), tx);

        store.get(&aapl()).await.unwrap();

        match rx.recv().await.unwrap() {
            LedgerEvent::QuoteUpdated(quote) => assert_eq!(quote.price, dec!(100)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
