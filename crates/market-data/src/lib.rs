// In crates/market-data/src/lib.rs

pub mod clock;
pub mod error;
pub mod store;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{QuoteError, Result};
pub use store::QuoteStore;
