// In crates/risk/src/lib.rs

pub mod error;
pub mod margin;
pub mod pnl;

// Re-export public types
pub use error::{Error, Result};
pub use margin::MarginTiers;
pub use pnl::PnlEngine;
