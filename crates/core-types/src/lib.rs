// In crates/core-types/src/lib.rs

pub mod asset;
pub mod error;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use asset::{AssetClass, classify};
pub use error::{Error, Result};
pub use types::{
    Account, AccountId, AccountKind, AccountTotals, FundMovement, FundsKind, MovementId,
    Position, PositionId, Quote, Side, Symbol, TradeStatus, round_money,
};
