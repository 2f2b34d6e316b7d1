// In crates/market-data/src/error.rs

use core_types::Symbol;
use thiserror::Error;

/// A quote that could not be produced. `Clone` so one outcome can be handed to
/// every caller waiting on the same fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Price for {symbol} is unavailable: {reason}")]
    Unavailable { symbol: Symbol, reason: String },
}

pub type Result<T> = std::result::Result<T, QuoteError>;
