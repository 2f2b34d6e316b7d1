// In crates/api-client/src/retry.rs

use crate::{ApiClient, Error, PriceEndpoint, PriceSource, Result};
use app_config::QuoteSettings;
use async_trait::async_trait;
use core_types::Symbol;
use rust_decimal::Decimal;
use std::time::Duration;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never zero.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn from_settings(settings: &QuoteSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.backoff_base_ms),
        )
    }

    /// The pause after failed attempt `attempt` (counted from zero): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Wraps a single-shot endpoint with the retry policy.
///
/// The backoff sleeps only the calling task; it holds no locks of its own.
#[derive(Debug, Clone)]
pub struct QuoteFetcher<E = ApiClient> {
    endpoint: E,
    policy: RetryPolicy,
}

impl<E: PriceEndpoint> QuoteFetcher<E> {
    pub fn new(endpoint: E, policy: RetryPolicy) -> Self {
        Self { endpoint, policy }
    }
}

impl QuoteFetcher<ApiClient> {
    /// Builds the HTTP-backed fetcher from the quote settings.
    pub fn from_settings(settings: &QuoteSettings) -> Result<Self> {
        Ok(Self::new(
            ApiClient::new(settings)?,
            RetryPolicy::from_settings(settings),
        ))
    }
}

#[async_trait]
impl<E: PriceEndpoint> PriceSource for QuoteFetcher<E> {
    async fn fetch(&self, symbol: &Symbol) -> Result<Decimal> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            let error = match self.endpoint.request_price(symbol).await {
                Ok(price) => {
                    if attempt > 0 {
                        tracing::info!(symbol = %symbol, attempt = attempt + 1, "Price request succeeded after retry.");
                    }
                    return Ok(price);
                }
                Err(e) => e,
            };

            if attempt + 1 >= max_attempts {
                tracing::error!(symbol = %symbol, attempts = max_attempts, error = %error, "Price request retries exhausted.");
                return Err(Error::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                symbol = %symbol,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Price request failed. Retrying..."
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a fixed script of outcomes; `None` is a failed attempt.
    struct ScriptedEndpoint {
        script: Mutex<VecDeque<Option<Decimal>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedEndpoint {
        fn new(script: impl IntoIterator<Item = Option<Decimal>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceEndpoint for ScriptedEndpoint {
        async fn request_price(&self, _symbol: &Symbol) -> Result<Decimal> {
            self.calls.lock().unwrap().push(Instant::now());
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(price) => Ok(price),
                None => Err(Error::MissingPrice),
            }
        }
    }

    fn symbol() -> Symbol {
        Symbol("EUR/USD".to_string())
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(5));

        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::from_millis(1)).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_stops_at_max_attempts() {
        let fetcher = QuoteFetcher::new(
            ScriptedEndpoint::new(std::iter::repeat_n(None, 10)),
            RetryPolicy::new(5, Duration::from_millis(100)),
        );

        let result = fetcher.fetch(&symbol()).await;

        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert!(matches!(*last, Error::MissingPrice));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }

        let calls = fetcher.endpoint.call_times();
        assert_eq!(calls.len(), 5);

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
        assert!(gaps.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let fetcher = QuoteFetcher::new(
            ScriptedEndpoint::new([None, None, Some(dec!(1.0842))]),
            RetryPolicy::new(5, Duration::from_millis(100)),
        );

        let price = fetcher.fetch(&symbol()).await.unwrap();

        assert_eq!(price, dec!(1.0842));
        assert_eq!(fetcher.endpoint.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let fetcher = QuoteFetcher::new(
            ScriptedEndpoint::new([Some(dec!(190.1))]),
            RetryPolicy::new(5, Duration::from_secs(5)),
        );
        let started = Instant::now();

        fetcher.fetch(&symbol()).await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
