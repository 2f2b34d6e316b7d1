// In crates/risk/src/pnl.rs

use crate::{Error, Result};
use app_config::LedgerSettings;
use core_types::{AssetClass, Position, Side};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Profit-and-loss arithmetic for a position, in exact decimals.
///
/// Results are never rounded here; rounding to cents happens only where figures are
/// displayed, so repeated revaluation does not accumulate rounding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnlEngine {
    /// Contract multiplier applied to currency-pair quantities.
    forex_lot_size: Decimal,
}

impl Default for PnlEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PnlEngine {
    pub fn new(forex_lot_size: u32) -> Self {
        Self {
            forex_lot_size: Decimal::from(forex_lot_size.max(1)),
        }
    }

    pub fn from_settings(settings: &LedgerSettings) -> Self {
        Self::new(settings.forex_lot_size)
    }

    /// Computes PnL for a position of `quantity` units.
    ///
    /// * buy:  `(current - entry) * quantity`
    /// * sell: `(entry - current) * quantity`
    ///
    /// Currency-pair quantities are first scaled by the lot size.
    pub fn compute(
        &self,
        side: Side,
        entry_price: Decimal,
        current_price: Decimal,
        quantity: Decimal,
        asset_class: AssetClass,
    ) -> Result<Decimal> {
        ensure_positive("entry_price", entry_price)?;
        ensure_positive("current_price", current_price)?;
        ensure_positive("quantity", quantity)?;

        let units = match asset_class {
            AssetClass::CurrencyPair => quantity
                .checked_mul(self.forex_lot_size)
                .ok_or(Error::Overflow("lot-scaled quantity"))?,
            _ => quantity,
        };

        let move_per_unit = match side {
            Side::Buy => current_price - entry_price,
            Side::Sell => entry_price - current_price,
        };

        move_per_unit.checked_mul(units).ok_or(Error::Overflow("pnl"))
    }

    /// Validating front door for untyped input (form fields, stored text).
    ///
    /// A missing or non-numeric value is an error; nothing defaults to zero.
    pub fn compute_raw(
        &self,
        side: Option<&str>,
        entry_price: Option<&str>,
        current_price: Option<&str>,
        quantity: Option<&str>,
        asset_class: AssetClass,
    ) -> Result<Decimal> {
        let side: Side = side.ok_or(Error::MissingInput { field: "side" })?.parse()?;
        let entry_price = parse_decimal("entry_price", entry_price)?;
        let current_price = parse_decimal("current_price", current_price)?;
        let quantity = parse_decimal("quantity", quantity)?;

        self.compute(side, entry_price, current_price, quantity, asset_class)
    }

    /// Marks `position` to `current_price`.
    pub fn mark(&self, position: &Position, current_price: Decimal) -> Result<Decimal> {
        self.compute(
            position.side,
            position.entry_price,
            current_price,
            position.quantity,
            position.asset_class(),
        )
    }
}

fn ensure_positive(field: &'static str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(Error::NonPositive { field, value });
    }
    Ok(())
}

fn parse_decimal(field: &'static str, raw: Option<&str>) -> Result<Decimal> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(Error::MissingInput { field })?;
    Decimal::from_str(raw).map_err(|_| Error::NotANumber {
        field,
        value: raw.to_string(),
    })
}
