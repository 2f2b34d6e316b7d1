// In crates/execution/src/lib.rs

pub mod error;
pub mod ledger;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use ledger::TradeLedger;
pub use types::{AccountValuation, AmendPosition, CloseOutcome, OpenPosition, Revaluation};
