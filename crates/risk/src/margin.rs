// In crates/risk/src/margin.rs

use crate::{Error, Result};
use app_config::LedgerSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Maps a margin-rate selector to the margin reserved per unit of quantity.
///
/// Configuration data; never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginTiers {
    tiers: BTreeMap<u32, Decimal>,
}

impl Default for MarginTiers {
    /// The house table: 1 -> 100, 2 -> 200, 5 -> 500, 10 -> 1000.
    fn default() -> Self {
        Self {
            tiers: BTreeMap::from([
                (1, dec!(100)),
                (2, dec!(200)),
                (5, dec!(500)),
                (10, dec!(1000)),
            ]),
        }
    }
}

impl MarginTiers {
    pub fn new(tiers: impl IntoIterator<Item = (u32, Decimal)>) -> Self {
        Self {
            tiers: tiers.into_iter().collect(),
        }
    }

    /// Uses the configured tiers when any are given, the house table otherwise.
    pub fn from_settings(settings: &LedgerSettings) -> Self {
        if settings.margin_tiers.is_empty() {
            return Self::default();
        }
        Self::new(
            settings
                .margin_tiers
                .iter()
                .map(|t| (t.rate, Decimal::from(t.margin_per_unit))),
        )
    }

    pub fn margin_per_unit(&self, rate: u32) -> Result<Decimal> {
        self.tiers
            .get(&rate)
            .copied()
            .ok_or(Error::UnknownMarginRate(rate))
    }

    /// `margin_per_unit(rate) * quantity`.
    pub fn required_margin(&self, rate: u32, quantity: Decimal) -> Result<Decimal> {
        if quantity <= Decimal::ZERO {
            return Err(Error::NonPositive {
                field: "quantity",
                value: quantity,
            });
        }
        self.margin_per_unit(rate)?
            .checked_mul(quantity)
            .ok_or(Error::Overflow("required margin"))
    }

    /// Vetoes a reservation the balance cannot cover. A non-positive balance never can.
    pub fn ensure_covered(&self, required: Decimal, available: Decimal) -> Result<()> {
        if available <= Decimal::ZERO || available < required {
            tracing::debug!(%required, %available, "Margin check vetoed the trade.");
            return Err(Error::InsufficientMargin {
                required,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_config::MarginTierSetting;

    #[test]
    fn test_house_table() {
        let tiers = MarginTiers::default();

        assert_eq!(tiers.margin_per_unit(1), Ok(dec!(100)));
        assert_eq!(tiers.margin_per_unit(2), Ok(dec!(200)));
        assert_eq!(tiers.margin_per_unit(5), Ok(dec!(500)));
        assert_eq!(tiers.margin_per_unit(10), Ok(dec!(1000)));
        assert_eq!(tiers.margin_per_unit(3), Err(Error::UnknownMarginRate(3)));
    }

    #[test]
    fn test_required_margin_scales_with_quantity() {
        let tiers = MarginTiers::default();

        assert_eq!(tiers.required_margin(5, dec!(2.5)), Ok(dec!(1250.0)));
        assert!(matches!(
            tiers.required_margin(5, dec!(-1)),
            Err(Error::NonPositive { field: "quantity", .. })
        ));
    }

    #[test]
    fn test_ensure_covered() {
        let tiers = MarginTiers::default();

        assert!(tiers.ensure_covered(dec!(200), dec!(200)).is_ok());
        assert!(tiers.ensure_covered(dec!(200), dec!(199.99)).is_err());
        assert!(tiers.ensure_covered(dec!(0), dec!(0)).is_err());
    }

    #[test]
    fn test_settings_override_house_table() {
        let settings = LedgerSettings {
            forex_lot_size: 1,
            margin_tiers: vec![MarginTierSetting { rate: 3, margin_per_unit: 300 }],
        };
        let tiers = MarginTiers::from_settings(&settings);

        assert_eq!(tiers.margin_per_unit(3), Ok(dec!(300)));
        assert!(tiers.margin_per_unit(1).is_err());
    }
}
