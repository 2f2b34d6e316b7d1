// In crates/execution/src/ledger.rs

use crate::types::{AccountValuation, AmendPosition, CloseOutcome, OpenPosition, Revaluation};
use crate::{Error, Result};
use app_config::LedgerSettings;
use core_types::{
    Account, AccountId, AccountTotals, FundMovement, FundsKind, Position, PositionId, Side,
    Symbol, TradeStatus,
};
use database::Db;
use events::{LedgerEvent, RevaluationWarning};
use market_data::{Clock, QuoteStore};
use risk::{MarginTiers, PnlEngine};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The margin and balance engine.
///
/// Every balance or position write happens inside one account transaction, so two
/// operations on the same account never interleave. Quotes are fetched before the
/// transaction begins: a failed fetch aborts the operation with nothing written, and
/// no account is held locked during upstream retries.
#[derive(Clone)]
pub struct TradeLedger {
    db: Db,
    quotes: QuoteStore,
    pnl: PnlEngine,
    tiers: MarginTiers,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<LedgerEvent>,
}

impl TradeLedger {
    pub fn new(
        db: Db,
        quotes: QuoteStore,
        pnl: PnlEngine,
        tiers: MarginTiers,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self {
            db,
            quotes,
            pnl,
            tiers,
            clock,
            events,
        }
    }

    pub fn from_settings(
        settings: &LedgerSettings,
        db: Db,
        quotes: QuoteStore,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self::new(
            db,
            quotes,
            PnlEngine::from_settings(settings),
            MarginTiers::from_settings(settings),
            clock,
            events,
        )
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn quotes(&self) -> &QuoteStore {
        &self.quotes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Current price for a raw symbol, served from the quote cache when fresh.
    pub async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let symbol = Symbol::parse(symbol)?;
        Ok(self.quotes.get(&symbol).await?)
    }

    /// Opens a position for `account_id` at the current quote and reserves its margin.
    pub async fn open_position(&self, account_id: AccountId, request: OpenPosition) -> Result<Position> {
        let symbol = Symbol::parse(&request.symbol)?;
        let side: Side = request.side.parse()?;
        if request.quantity <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        // Reject unknown accounts and selectors before touching the network.
        let snapshot = self.db.account(account_id).await?;
        self.tiers.required_margin(snapshot.margin_rate, request.quantity)?;

        let price = self.quotes.get(&symbol).await?;

        let mut tx = self.db.begin(account_id).await?;
        let account = tx.account().clone();
        let required = self.tiers.required_margin(account.margin_rate, request.quantity)?;
        self.tiers.ensure_covered(required, account.total_balance)?;

        tx.account_mut().total_balance -= required;
        let position = tx.insert_position(Position {
            id: 0,
            account_id,
            symbol,
            side,
            quantity: request.quantity,
            entry_price: price,
            current_price: price,
            margin_rate: account.margin_rate,
            margin_used: required,
            pnl: Decimal::ZERO,
            status: TradeStatus::Open,
            opened_at: self.clock.now(),
            closed_at: None,
        });
        tx.commit();

        tracing::info!(
            trade_id = position.id,
            account_id,
            symbol = %position.symbol,
            side = %position.side,
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            margin_used = %required,
            "Trade opened."
        );
        let _ = self.events.send(LedgerEvent::TradeOpened(position.clone()));
        Ok(position)
    }

    /// Marks an open position to the current quote. Never fails the caller.
    ///
    /// When no quote can be had the position keeps its last price and PnL.
    pub async fn revalue_position(&self, position: &Position) -> Position {
        self.revalue(position).await.position
    }

    /// Like [`revalue_position`](Self::revalue_position), also reporting why figures were kept.
    pub async fn revalue(&self, position: &Position) -> Revaluation {
        if !position.is_open() {
            return Revaluation {
                position: position.clone(),
                warning: None,
            };
        }

        let price = match self.quotes.get(&position.symbol).await {
            Ok(price) => price,
            Err(e) => return self.kept(position.clone(), e.to_string()),
        };

        match self.apply_mark(position, price).await {
            Ok(updated) => {
                // A concurrent close wins; its own event has already been sent.
                if updated.is_open() {
                    let _ = self.events.send(LedgerEvent::TradeRevalued(updated.clone()));
                }
                Revaluation {
                    position: updated,
                    warning: None,
                }
            }
            Err(e) => self.kept(position.clone(), e.to_string()),
        }
    }

    /// Revalues every open position of an account. One failing symbol never stops the rest.
    pub async fn revalue_account(&self, account_id: AccountId) -> Result<AccountValuation> {
        // An unknown id is an error, not an empty dashboard.
        self.db.account(account_id).await?;
        let open = self.db.positions_for(account_id, Some(TradeStatus::Open));

        let mut positions = Vec::with_capacity(open.len());
        let mut warnings = Vec::new();
        for position in &open {
            let revaluation = self.revalue(position).await;
            warnings.extend(revaluation.warning);
            positions.push(revaluation.position);
        }

        let unrealized_pnl = positions
            .iter()
            .filter(|p| p.is_open())
            .try_fold(Decimal::ZERO, |total, p| checked_sum(total, p.pnl))?;
        let balance = self.db.account(account_id).await?.total_balance;

        Ok(AccountValuation {
            account_id,
            positions,
            warnings,
            unrealized_pnl,
            balance,
            equity: checked_sum(balance, unrealized_pnl)?,
        })
    }

    /// Closes a position at the current quote and books its PnL to the account.
    ///
    /// Closing a closed position changes nothing and reports `AlreadyClosed`.
    pub async fn close_position(&self, position_id: PositionId) -> Result<CloseOutcome> {
        let position = self.db.position(position_id)?;
        if !position.is_open() {
            tracing::debug!(trade_id = position_id, "Close ignored; trade already closed.");
            return Ok(CloseOutcome::AlreadyClosed(position));
        }

        let price = self.quotes.get(&position.symbol).await?;

        let mut tx = self.db.begin(position.account_id).await?;
        let mut position = tx.position(position_id)?;
        if !position.is_open() {
            // Lost a race with another close while fetching.
            return Ok(CloseOutcome::AlreadyClosed(position));
        }

        let pnl = self.pnl.mark(&position, price)?;
        position.current_price = price;
        position.pnl = pnl;
        position.status = TradeStatus::Closed;
        position.closed_at = Some(self.clock.now());

        let balance = checked_sum(tx.account().total_balance, pnl)?;
        tx.account_mut().total_balance = balance;
        tx.update_position(position.clone())?;
        tx.commit();

        tracing::info!(
            trade_id = position.id,
            account_id = position.account_id,
            symbol = %position.symbol,
            exit_price = %price,
            pnl = %pnl,
            "Trade closed."
        );
        let _ = self.events.send(LedgerEvent::TradeClosed(position.clone()));
        Ok(CloseOutcome::Closed(position))
    }

    /// Read-only aggregate of an account's positions and fund movements.
    ///
    /// Balance, positions and movements are read under one transaction, which is
    /// dropped without committing.
    pub async fn compute_account_totals(&self, account_id: AccountId) -> Result<AccountTotals> {
        let tx = self.db.begin(account_id).await?;
        let balance = tx.account().total_balance;
        let positions = tx.positions(None);
        let movements = tx.movements();
        drop(tx);

        let open_count = positions.iter().filter(|p| p.is_open()).count();
        let movement_total = |kind: FundsKind| -> Decimal {
            movements
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.amount)
                .sum()
        };
        Ok(AccountTotals {
            open_count,
            closed_count: positions.len() - open_count,
            total_deposits: movement_total(FundsKind::Deposit),
            total_withdrawals: movement_total(FundsKind::Withdrawal),
            total_pnl: positions.iter().map(|p| p.pnl).sum(),
            balance,
        })
    }

    /// Credits `amount` to an account on behalf of an operator.
    pub async fn deposit(&self, actor: AccountId, account_id: AccountId, amount: Decimal) -> Result<FundMovement> {
        self.move_funds(actor, account_id, FundsKind::Deposit, amount).await
    }

    /// Debits `amount` from an account on behalf of an operator. Never overdraws.
    pub async fn withdraw(&self, actor: AccountId, account_id: AccountId, amount: Decimal) -> Result<FundMovement> {
        self.move_funds(actor, account_id, FundsKind::Withdrawal, amount).await
    }

    async fn move_funds(
        &self,
        actor: AccountId,
        account_id: AccountId,
        kind: FundsKind,
        amount: Decimal,
    ) -> Result<FundMovement> {
        let actor_account = self.db.account(actor).await?;
        if !actor_account.kind.can_manage_funds() {
            return Err(Error::Forbidden {
                actor,
                action: "move funds",
            });
        }
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!("amount must be positive, got {amount}")));
        }

        let mut tx = self.db.begin(account_id).await?;
        let balance = tx.account().total_balance;
        let new_balance = match kind {
            FundsKind::Deposit => checked_sum(balance, amount)?,
            FundsKind::Withdrawal => {
                if balance < amount {
                    return Err(Error::InsufficientFunds {
                        required: amount,
                        available: balance,
                    });
                }
                balance - amount
            }
        };
        tx.account_mut().total_balance = new_balance;
        let movement = tx.record_movement(kind, amount, self.clock.now());
        tx.commit();

        tracing::info!(actor, account_id, kind = ?kind, amount = %amount, balance = %new_balance, "Funds moved.");
        let _ = self.events.send(LedgerEvent::FundsMoved {
            movement: movement.clone(),
            balance: new_balance,
        });
        Ok(movement)
    }

    /// Operator edit of an open position's quantity and entry price.
    ///
    /// The PnL is recomputed at the latest quote, or at the previous current price when
    /// no quote can be had. Reserved margin is left as it was.
    pub async fn amend_position(
        &self,
        actor: AccountId,
        position_id: PositionId,
        amendment: AmendPosition,
    ) -> Result<Position> {
        let actor_account = self.db.account(actor).await?;
        if !actor_account.kind.can_amend_positions() {
            return Err(Error::Forbidden {
                actor,
                action: "amend positions",
            });
        }

        let position = self.db.position(position_id)?;
        if !position.is_open() {
            return Err(Error::Validation(format!("trade {position_id} is closed")));
        }

        let latest = match self.quotes.get(&position.symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!(trade_id = position_id, error = %e, "Amending without a fresh quote.");
                None
            }
        };

        let mut tx = self.db.begin(position.account_id).await?;
        let mut position = tx.position(position_id)?;
        if !position.is_open() {
            return Err(Error::Validation(format!("trade {position_id} is closed")));
        }

        position.quantity = amendment.quantity;
        position.entry_price = amendment.entry_price;
        if let Some(price) = latest {
            position.current_price = price;
        }
        position.pnl = self.pnl.mark(&position, position.current_price)?;
        tx.update_position(position.clone())?;
        tx.commit();

        tracing::info!(
            actor,
            trade_id = position.id,
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            pnl = %position.pnl,
            "Trade amended."
        );
        let _ = self.events.send(LedgerEvent::TradeRevalued(position.clone()));
        Ok(position)
    }

    /// Changes the margin-rate selector used for the account's future trades.
    pub async fn set_margin_rate(&self, account_id: AccountId, margin_rate: u32) -> Result<Account> {
        self.tiers.margin_per_unit(margin_rate)?;

        let mut tx = self.db.begin(account_id).await?;
        tx.account_mut().margin_rate = margin_rate;
        let account = tx.account().clone();
        tx.commit();

        tracing::info!(account_id, margin_rate, "Margin rate updated.");
        Ok(account)
    }

    /// Writes a new mark inside the account transaction, if the position is still open.
    async fn apply_mark(&self, position: &Position, price: Decimal) -> Result<Position> {
        let mut tx = self.db.begin(position.account_id).await?;
        let mut current = tx.position(position.id)?;
        if !current.is_open() {
            return Ok(current);
        }

        current.pnl = self.pnl.mark(&current, price)?;
        current.current_price = price;
        tx.update_position(current.clone())?;
        tx.commit();

        tracing::debug!(trade_id = current.id, price = %price, pnl = %current.pnl, "Trade revalued.");
        Ok(current)
    }

    fn kept(&self, position: Position, reason: String) -> Revaluation {
        tracing::warn!(trade_id = position.id, symbol = %position.symbol, reason = %reason, "Revaluation skipped.");
        let warning = RevaluationWarning {
            position_id: position.id,
            symbol: position.symbol.clone(),
            reason,
        };
        let _ = self.events.send(LedgerEvent::RevaluationFailed(warning.clone()));
        Revaluation {
            position,
            warning: Some(warning),
        }
    }
}

fn checked_sum(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance.checked_add(amount).ok_or_else(|| {
        Error::Validation(format!("balance {balance} plus {amount} is out of range"))
    })
}
