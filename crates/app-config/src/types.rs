// In crates/app-config/src/types.rs

use crate::{Error, Result};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    pub server: ServerSettings,
    /// Settings for the upstream price provider and the quote cache.
    pub quotes: QuoteSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Accounts created in the in-memory store at startup.
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

impl Settings {
    /// Rejects combinations the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.quotes.max_attempts == 0 {
            return Err(Error::Invalid("quotes.max_attempts must be at least 1".into()));
        }
        if self.quotes.cache_ttl_secs == 0 {
            return Err(Error::Invalid("quotes.cache_ttl_secs must be positive".into()));
        }
        if self.quotes.refresh_interval_secs == Some(0) {
            return Err(Error::Invalid("quotes.refresh_interval_secs must be positive".into()));
        }
        if self.quotes.request_timeout_secs == 0 {
            return Err(Error::Invalid("quotes.request_timeout_secs must be positive".into()));
        }
        if self.ledger.forex_lot_size == 0 {
            return Err(Error::Invalid("ledger.forex_lot_size must be positive".into()));
        }
        if let Some(tier) = self.ledger.margin_tiers.iter().find(|t| t.margin_per_unit == 0) {
            return Err(Error::Invalid(format!(
                "margin tier {} has a zero margin per unit",
                tier.rate
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct QuoteSettings {
    /// The REST base URL of the price provider.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// The API key sent with every price request.
    pub api_key: String,
    /// Per-request timeout; a timeout counts as a failed attempt.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total attempts per fetch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before retry `n` (counted from zero) is `backoff_base_ms * 2^n`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Symbols kept warm by the background refresher.
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,
    /// Refresh period of the watch-list. Falls back to the cache TTL.
    pub refresh_interval_secs: Option<u64>,
}

impl QuoteSettings {
    pub fn refresh_interval_secs(&self) -> u64 {
        self.refresh_interval_secs.unwrap_or(self.cache_ttl_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LedgerSettings {
    /// Contract multiplier applied to currency-pair quantities when computing PnL.
    #[serde(default = "default_forex_lot_size")]
    pub forex_lot_size: u32,
    /// Overrides the built-in margin tier table when non-empty.
    #[serde(default)]
    pub margin_tiers: Vec<MarginTierSetting>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            forex_lot_size: default_forex_lot_size(),
            margin_tiers: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MarginTierSetting {
    pub rate: u32,
    pub margin_per_unit: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SeedAccount {
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub balance: u64,
    #[serde(default = "default_margin_rate")]
    pub margin_rate: u32,
}

/// Helper functions for serde defaults
fn default_base_url() -> String { "https://api.twelvedata.com".to_string() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_backoff_base_ms() -> u64 { 5_000 }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_watch_list() -> Vec<String> {
    vec!["BTC/USD".to_string(), "EUR/USD".to_string(), "AAPL".to_string()]
}
fn default_forex_lot_size() -> u32 { 1 }
fn default_margin_rate() -> u32 { 1 }
