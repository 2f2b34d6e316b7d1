// In crates/core-types/src/types.rs

use crate::{AssetClass, Error, Result, classify};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AccountId = u64;
pub type PositionId = u64;
pub type MovementId = u64;

/// A traded instrument, normalised to trimmed upper case (e.g. "EUR/USD", "AAPL").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Normalises a raw symbol, rejecting blank input.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(Error::EmptySymbol);
        }
        Ok(Symbol(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn asset_class(&self) -> AssetClass {
        classify(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(Error::InvalidSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl FromStr for TradeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(TradeStatus::Open),
            "closed" => Ok(TradeStatus::Closed),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// A timestamped price observation. Replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: Symbol, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            observed_at,
        }
    }

    /// A quote is fresh while strictly less than `ttl` has elapsed since it was observed.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.observed_at < ttl
    }
}

/// A leveraged exposure to a symbol, owned by the account that opened it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Last mark price while open; the closing quote once closed.
    pub current_price: Decimal,
    /// The margin-rate selector the position was opened with.
    pub margin_rate: u32,
    pub margin_used: Decimal,
    /// Unrealized while open, realized and frozen once closed. Kept at full precision.
    pub pnl: Decimal,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn asset_class(&self) -> AssetClass {
        self.symbol.asset_class()
    }
}

/// Whether an account is an ordinary client or an operator with back-office rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Regular,
    Admin,
}

impl AccountKind {
    /// Deposits and withdrawals are booked by operators only.
    pub fn can_manage_funds(&self) -> bool {
        matches!(self, AccountKind::Admin)
    }

    pub fn can_amend_positions(&self) -> bool {
        matches!(self, AccountKind::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    pub total_balance: Decimal,
    /// Selector into the margin tier table.
    pub margin_rate: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundsKind {
    Deposit,
    Withdrawal,
}

/// A booked deposit or withdrawal against an account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundMovement {
    pub id: MovementId,
    pub account_id: AccountId,
    pub kind: FundsKind,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A read-only aggregate of an account's trading and funding activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountTotals {
    pub open_count: usize,
    pub closed_count: usize,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_pnl: Decimal,
    pub balance: Decimal,
}

/// Rounds a currency amount to cents for display. Internal arithmetic never calls this.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
