// In crates/api-client/src/lib.rs

use app_config::QuoteSettings;
use async_trait::async_trait;
use core_types::Symbol;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

pub mod error;
pub mod retry;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use retry::{QuoteFetcher, RetryPolicy};
pub use types::ApiClient;

/// One request for a symbol's price, with no retry of its own.
#[async_trait]
pub trait PriceEndpoint: Send + Sync {
    async fn request_price(&self, symbol: &Symbol) -> Result<Decimal>;
}

/// A complete price lookup, including whatever retry policy the implementation applies.
///
/// This is the seam the quote store is built on; tests substitute scripted sources.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbol: &Symbol) -> Result<Decimal>;
}

impl ApiClient {
    /// Constructs a new ApiClient from the quote settings.
    pub fn new(settings: &QuoteSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;

        Ok(ApiClient {
            http_client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceEndpoint for ApiClient {
    /// Fetches the latest price for one symbol.
    ///
    /// This corresponds to the `GET /price?symbol=..&apikey=..` endpoint.
    async fn request_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!("{}/price", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(Error::RequestFailed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let text = response.text().await.map_err(Error::RequestFailed)?;
        let value: Value = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;

        parse_price_body(&value)
    }
}

/// Extracts a usable price from a provider response body.
///
/// The provider reports some failures with a 2xx status and a `code`/`message`
/// body, so that shape is checked first. An empty, absent, or non-positive `price`
/// is an error, never a zero price.
pub fn parse_price_body(value: &Value) -> Result<Decimal> {
    if let (Some(code), None) = (value.get("code").and_then(Value::as_i64), value.get("price")) {
        let msg = value
            .get("message")
            .or_else(|| value.get("msg"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(Error::ApiError { code, msg });
    }

    let raw = match value.get("price") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(Error::MissingPrice),
    };

    let price = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| Error::InvalidPrice(raw.clone()))?;

    if price <= Decimal::ZERO {
        return Err(Error::InvalidPrice(raw));
    }

    Ok(price)
}
