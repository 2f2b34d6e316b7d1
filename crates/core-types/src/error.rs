// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown trade side '{0}', expected 'buy' or 'sell'")]
    InvalidSide(String),

    #[error("Unknown trade status '{0}'")]
    InvalidStatus(String),

    #[error("Symbol must not be empty")]
    EmptySymbol,
}

pub type Result<T> = std::result::Result<T, Error>;
