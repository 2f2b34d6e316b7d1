// In crates/execution/src/types.rs

use core_types::{AccountId, Position};
use events::RevaluationWarning;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A client's request to open a position, as received from a caller.
///
/// `symbol` and `side` are raw text and are validated by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: String,
    pub quantity: Decimal,
}

/// New figures for an open position, set by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AmendPosition {
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Result of a close request. Both variants are successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "position", rename_all = "snake_case")]
pub enum CloseOutcome {
    Closed(Position),
    /// The position was closed before; nothing was changed.
    AlreadyClosed(Position),
}

impl CloseOutcome {
    pub fn position(&self) -> &Position {
        match self {
            CloseOutcome::Closed(p) | CloseOutcome::AlreadyClosed(p) => p,
        }
    }

    pub fn was_noop(&self) -> bool {
        matches!(self, CloseOutcome::AlreadyClosed(_))
    }
}

/// A position after a revaluation attempt, with the reason it kept its old figures, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Revaluation {
    pub position: Position,
    pub warning: Option<RevaluationWarning>,
}

/// Mark-to-market view of one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountValuation {
    pub account_id: AccountId,
    pub positions: Vec<Position>,
    pub warnings: Vec<RevaluationWarning>,
    pub unrealized_pnl: Decimal,
    /// The stored balance. Never replaced by the PnL sum.
    pub balance: Decimal,
    /// `balance + unrealized_pnl`.
    pub equity: Decimal,
}
