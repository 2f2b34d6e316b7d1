// In crates/database/src/types.rs

use app_config::SeedAccount;
use core_types::AccountKind;
use rust_decimal::Decimal;

/// The fields a caller supplies when registering an account; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub margin_rate: u32,
}

impl NewAccount {
    pub fn regular(name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            name: name.into(),
            kind: AccountKind::Regular,
            balance,
            margin_rate: 1,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AccountKind::Admin,
            balance: Decimal::ZERO,
            margin_rate: 1,
        }
    }

    pub fn with_margin_rate(mut self, margin_rate: u32) -> Self {
        self.margin_rate = margin_rate;
        self
    }

    pub fn from_seed(seed: &SeedAccount) -> Self {
        Self {
            name: seed.name.clone(),
            kind: if seed.admin { AccountKind::Admin } else { AccountKind::Regular },
            balance: Decimal::from(seed.balance),
            margin_rate: seed.margin_rate,
        }
    }
}
