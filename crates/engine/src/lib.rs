// In crates/engine/src/lib.rs

pub mod refresher;

pub use refresher::{QuoteRefresher, RefreshReport};
