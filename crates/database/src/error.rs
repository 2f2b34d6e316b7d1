// In crates/database/src/error.rs

use core_types::{AccountId, PositionId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("Position {0} not found")]
    PositionNotFound(PositionId),
    #[error("Position {position} does not belong to account {account}")]
    ForeignPosition {
        position: PositionId,
        account: AccountId,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
