// In crates/web-server/src/types.rs

use core_types::{AccountId, AccountTotals, FundMovement, Position, PositionId, Symbol, round_money};
use execution::AccountValuation;
use events::RevaluationWarning;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

/// A currency amount rendered as a string with exactly two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Money(pub Decimal);

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut cents = round_money(self.0);
        cents.rescale(2);
        serializer.collect_str(&cents)
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub symbol: Symbol,
    pub price: Decimal,
}

/// A position as shown to clients. Prices keep full precision; money is in cents.
#[derive(Debug, Serialize)]
pub struct PositionView {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub margin_rate: u32,
    pub margin_used: Money,
    pub pnl: Money,
    pub status: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl From<&Position> for PositionView {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id,
            account_id: p.account_id,
            symbol: p.symbol.clone(),
            side: p.side.to_string(),
            quantity: p.quantity,
            entry_price: p.entry_price,
            current_price: p.current_price,
            margin_rate: p.margin_rate,
            margin_used: Money(p.margin_used),
            pnl: Money(p.pnl),
            status: if p.is_open() { "open" } else { "closed" }.to_string(),
            opened_at: p.opened_at.to_rfc3339(),
            closed_at: p.closed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    /// False when the trade had already been closed and nothing changed.
    pub closed_now: bool,
    pub position: PositionView,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub account_id: AccountId,
    pub positions: Vec<PositionView>,
    pub warnings: Vec<RevaluationWarning>,
    pub unrealized_pnl: Money,
    pub balance: Money,
    pub equity: Money,
}

impl From<AccountValuation> for DashboardResponse {
    fn from(v: AccountValuation) -> Self {
        Self {
            account_id: v.account_id,
            positions: v.positions.iter().map(PositionView::from).collect(),
            warnings: v.warnings,
            unrealized_pnl: Money(v.unrealized_pnl),
            balance: Money(v.balance),
            equity: Money(v.equity),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub open_count: usize,
    pub closed_count: usize,
    pub total_deposits: Money,
    pub total_withdrawals: Money,
    pub total_pnl: Money,
    pub balance: Money,
}

impl From<AccountTotals> for TotalsResponse {
    fn from(t: AccountTotals) -> Self {
        Self {
            open_count: t.open_count,
            closed_count: t.closed_count,
            total_deposits: Money(t.total_deposits),
            total_withdrawals: Money(t.total_withdrawals),
            total_pnl: Money(t.total_pnl),
            balance: Money(t.balance),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundsAction {
    Deposit,
    Withdraw,
}

#[derive(Debug, Deserialize)]
pub struct FundsRequest {
    pub action: FundsAction,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct FundsResponse {
    pub movement: FundMovement,
}

#[derive(Debug, Deserialize)]
pub struct MarginRateRequest {
    pub margin_rate: u32,
}
