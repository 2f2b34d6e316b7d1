// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(#[from] core_types::Error),

    #[error("Missing value for {field}")]
    MissingInput { field: &'static str },

    #[error("Value '{value}' for {field} is not a number")]
    NotANumber { field: &'static str, value: String },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("Margin rate {0} is not in the tier table")]
    UnknownMarginRate(u32),

    #[error("Insufficient margin: {required} required, {available} available")]
    InsufficientMargin { required: Decimal, available: Decimal },
}

pub type Result<T> = std::result::Result<T, Error>;
