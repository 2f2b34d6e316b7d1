// In crates/execution/src/error.rs

use core_types::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Quote(#[from] market_data::QuoteError),

    #[error("Insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("Account {actor} is not allowed to {action}")]
    Forbidden { actor: AccountId, action: &'static str },
}

impl From<risk::Error> for Error {
    fn from(e: risk::Error) -> Self {
        match e {
            risk::Error::InsufficientMargin { required, available } => {
                Error::InsufficientFunds { required, available }
            }
            other => Error::Validation(other.to_string()),
        }
    }
}

impl From<core_types::Error> for Error {
    fn from(e: core_types::Error) -> Self {
        Error::Validation(e.to_string())
    }
}

impl From<database::Error> for Error {
    fn from(e: database::Error) -> Self {
        match e {
            database::Error::AccountNotFound(id) => Error::NotFound { entity: "Account", id },
            // A position owned by someone else is reported as absent.
            database::Error::PositionNotFound(id)
            | database::Error::ForeignPosition { position: id, .. } => {
                Error::NotFound { entity: "Position", id }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
