// In crates/database/src/lib.rs

use app_config::SeedAccount;
use chrono::{DateTime, Utc};
use core_types::{
    Account, AccountId, FundMovement, FundsKind, MovementId, Position, PositionId, TradeStatus,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

pub mod error;
pub mod tx;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use tx::AccountTx;
pub use types::NewAccount;

/// The record store behind the ledger: accounts, positions and fund movements keyed by id.
///
/// Every account sits behind its own async mutex. Balance and position writes happen
/// only inside an [`AccountTx`], which holds that mutex until it commits or is dropped,
/// so transactions on one account are serialised while different accounts never contend.
#[derive(Debug, Clone, Default)]
pub struct Db(Arc<Tables>);

#[derive(Debug, Default)]
struct Tables {
    accounts: DashMap<AccountId, Arc<Mutex<Account>>>,
    positions: DashMap<PositionId, Position>,
    movements: DashMap<MovementId, FundMovement>,
    next_account_id: AtomicU64,
    next_position_id: AtomicU64,
    next_movement_id: AtomicU64,
}

impl Db {
    /// An empty store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A store pre-populated with the configured accounts.
    pub fn seeded(accounts: &[SeedAccount], now: DateTime<Utc>) -> Self {
        let db = Self::in_memory();
        for seed in accounts {
            let account = db.create_account(NewAccount::from_seed(seed), now);
            tracing::info!(account_id = account.id, name = %account.name, kind = ?account.kind, "Seeded account.");
        }
        db
    }

    pub fn create_account(&self, new: NewAccount, now: DateTime<Utc>) -> Account {
        let id = self.0.next_account_id.fetch_add(1, Ordering::Relaxed) + 1;
        let account = Account {
            id,
            name: new.name,
            kind: new.kind,
            total_balance: new.balance,
            margin_rate: new.margin_rate,
            created_at: now,
        };
        self.0
            .accounts
            .insert(id, Arc::new(Mutex::new(account.clone())));
        account
    }

    /// A committed snapshot of the account. Waits for any open transaction on it.
    pub async fn account(&self, id: AccountId) -> Result<Account> {
        let cell = self.account_cell(id)?;
        let account = cell.lock().await.clone();
        Ok(account)
    }

    pub fn position(&self, id: PositionId) -> Result<Position> {
        self.0
            .positions
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or(Error::PositionNotFound(id))
    }

    /// Committed positions of an account, optionally filtered by status, in id order.
    pub fn positions_for(&self, account_id: AccountId, status: Option<TradeStatus>) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .0
            .positions
            .iter()
            .filter(|p| p.account_id == account_id && status.is_none_or(|s| p.status == s))
            .map(|p| p.value().clone())
            .collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub fn movements_for(&self, account_id: AccountId) -> Vec<FundMovement> {
        let mut movements: Vec<FundMovement> = self
            .0
            .movements
            .iter()
            .filter(|m| m.account_id == account_id)
            .map(|m| m.value().clone())
            .collect();
        movements.sort_by_key(|m| m.id);
        movements
    }

    /// Opens a transaction on one account, waiting for any transaction already open on it.
    pub async fn begin(&self, account_id: AccountId) -> Result<AccountTx> {
        let cell = self.account_cell(account_id)?;
        let guard = cell.lock_owned().await;
        Ok(AccountTx::new(self.clone(), guard))
    }

    fn account_cell(&self, id: AccountId) -> Result<Arc<Mutex<Account>>> {
        // Clone the handle out so no map shard guard is held while awaiting the lock.
        self.0
            .accounts
            .get(&id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or(Error::AccountNotFound(id))
    }

    fn allocate_position_id(&self) -> PositionId {
        self.0.next_position_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn allocate_movement_id(&self) -> MovementId {
        self.0.next_movement_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn write_position(&self, position: Position) {
        self.0.positions.insert(position.id, position);
    }

    fn write_movement(&self, movement: FundMovement) {
        self.0.movements.insert(movement.id, movement);
    }

    /// Sum of committed movements of one kind for an account.
    pub fn movement_total(&self, account_id: AccountId, kind: FundsKind) -> Decimal {
        self.0
            .movements
            .iter()
            .filter(|m| m.account_id == account_id && m.kind == kind)
            .map(|m| m.amount)
            .sum()
    }
}
