// In crates/database/src/tx.rs

use crate::{Db, Error, Result};
use chrono::{DateTime, Utc};
use core_types::{Account, FundMovement, FundsKind, Position, PositionId, TradeStatus};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::OwnedMutexGuard;

/// An exclusive unit of work on one account.
///
/// Changes are staged on a working copy and become visible only on [`commit`](Self::commit).
/// Dropping the transaction without committing discards them.
pub struct AccountTx {
    db: Db,
    guard: OwnedMutexGuard<Account>,
    working: Account,
    staged_positions: BTreeMap<PositionId, Position>,
    staged_movements: Vec<FundMovement>,
}

impl AccountTx {
    pub(crate) fn new(db: Db, guard: OwnedMutexGuard<Account>) -> Self {
        let working = guard.clone();
        Self {
            db,
            guard,
            working,
            staged_positions: BTreeMap::new(),
            staged_movements: Vec::new(),
        }
    }

    pub fn account(&self) -> &Account {
        &self.working
    }

    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.working
    }

    /// Reads a position of this account, including changes staged in this transaction.
    pub fn position(&self, id: PositionId) -> Result<Position> {
        let position = match self.staged_positions.get(&id) {
            Some(staged) => staged.clone(),
            None => self.db.position(id)?,
        };
        self.ensure_owned(&position)?;
        Ok(position)
    }

    /// All positions of this account as this transaction sees them, in id order.
    pub fn positions(&self, status: Option<TradeStatus>) -> Vec<Position> {
        let mut merged: BTreeMap<PositionId, Position> = self
            .db
            .positions_for(self.working.id, None)
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        merged.extend(self.staged_positions.iter().map(|(id, p)| (*id, p.clone())));

        merged
            .into_values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .collect()
    }

    /// Movements of this account, including those staged in this transaction.
    pub fn movements(&self) -> Vec<FundMovement> {
        let mut movements = self.db.movements_for(self.working.id);
        movements.extend(self.staged_movements.iter().cloned());
        movements
    }

    /// Stages a new position. The store assigns its id and owner.
    pub fn insert_position(&mut self, mut position: Position) -> Position {
        position.id = self.db.allocate_position_id();
        position.account_id = self.working.id;
        self.staged_positions.insert(position.id, position.clone());
        position
    }

    pub fn update_position(&mut self, position: Position) -> Result<()> {
        self.ensure_owned(&position)?;
        self.staged_positions.insert(position.id, position);
        Ok(())
    }

    pub fn record_movement(
        &mut self,
        kind: FundsKind,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> FundMovement {
        let movement = FundMovement {
            id: self.db.allocate_movement_id(),
            account_id: self.working.id,
            kind,
            amount,
            created_at: at,
        };
        self.staged_movements.push(movement.clone());
        movement
    }

    /// Publishes every staged change and releases the account.
    pub fn commit(self) {
        let AccountTx {
            db,
            mut guard,
            working,
            staged_positions,
            staged_movements,
        } = self;

        for position in staged_positions.into_values() {
            db.write_position(position);
        }
        for movement in staged_movements {
            db.write_movement(movement);
        }
        *guard = working;
    }

    fn ensure_owned(&self, position: &Position) -> Result<()> {
        if position.account_id != self.working.id {
            return Err(Error::ForeignPosition {
                position: position.id,
                account: self.working.id,
            });
        }
        Ok(())
    }
}
