// In crates/core-types/src/asset.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The character that splits a pair symbol into base and quote legs (e.g. "EUR/USD").
pub const PAIR_SEPARATOR: char = '/';

/// ISO 4217 codes recognised as fiat legs of a currency pair.
///
/// Three-letter digital asset tickers such as `BTC` or `ETH` are not listed,
/// so `BTC/USD` classifies as a digital asset rather than a currency pair.
const FIAT_CODES: &[&str] = &[
    "AED", "ARS", "AUD", "BRL", "CAD", "CHF", "CLP", "CNH", "CNY", "COP", "CZK", "DKK", "EGP",
    "EUR", "GBP", "GHS", "HKD", "HUF", "IDR", "ILS", "INR", "JPY", "KES", "KRW", "MXN", "MYR",
    "NGN", "NOK", "NZD", "PEN", "PHP", "PLN", "RON", "RUB", "SAR", "SEK", "SGD", "THB", "TRY",
    "TWD", "USD", "ZAR",
];

/// The broad asset category of a traded symbol, used to pick quoting conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    CurrencyPair,
    DigitalAsset,
    Unknown,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetClass::Equity => "equity",
            AssetClass::CurrencyPair => "currency_pair",
            AssetClass::DigitalAsset => "digital_asset",
            AssetClass::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Derives the asset class of a symbol from its lexical shape.
///
/// * `EUR/USD` -> `CurrencyPair` (two fiat codes around the separator)
/// * `BTC/USD` -> `DigitalAsset` (separator present, not a fiat pair)
/// * `AAPL`    -> `Equity` (no separator)
///
/// Matching ignores case and surrounding whitespace. A blank symbol is `Unknown`.
pub fn classify(symbol: &str) -> AssetClass {
    let normalized = symbol.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return AssetClass::Unknown;
    }

    match normalized.split_once(PAIR_SEPARATOR) {
        Some((base, quote)) if is_fiat_code(base) && is_fiat_code(quote) => AssetClass::CurrencyPair,
        Some(_) => AssetClass::DigitalAsset,
        None => AssetClass::Equity,
    }
}

fn is_fiat_code(leg: &str) -> bool {
    leg.len() == 3
        && leg.chars().all(|c| c.is_ascii_alphabetic())
        && FIAT_CODES.contains(&leg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_fiat_pairs() {
        assert_eq!(classify("EUR/USD"), AssetClass::CurrencyPair);
        assert_eq!(classify("gbp/jpy"), AssetClass::CurrencyPair);
        assert_eq!(classify("  usd/chf \n"), AssetClass::CurrencyPair);
    }

    #[test]
    fn test_classifies_digital_assets() {
        assert_eq!(classify("BTC/USD"), AssetClass::DigitalAsset);
        assert_eq!(classify("eth/eur"), AssetClass::DigitalAsset);
        assert_eq!(classify("USDT/USD"), AssetClass::DigitalAsset);
        assert_eq!(classify("/USD"), AssetClass::DigitalAsset);
    }

    #[test]
    fn test_classifies_equities_and_blanks() {
        assert_eq!(classify("AAPL"), AssetClass::Equity);
        assert_eq!(classify(" msft "), AssetClass::Equity);
        assert_eq!(classify(""), AssetClass::Unknown);
        assert_eq!(classify("   "), AssetClass::Unknown);
    }
}
