// --- Ledger Event Structures ---

use core_types::{FundMovement, Position, PositionId, Quote, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

/// Buffer size of the ledger broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A revaluation that could not complete; the position kept its last known price and PnL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevaluationWarning {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub reason: String,
}

/// The top-level ledger event enum broadcast to observers.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum LedgerEvent {
    QuoteUpdated(Quote),
    TradeOpened(Position),
    TradeRevalued(Position),
    TradeClosed(Position),
    RevaluationFailed(RevaluationWarning),
    FundsMoved {
        movement: FundMovement,
        balance: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let quote = Quote::new(
            Symbol("AAPL".into()),
            Decimal::from_str("190.25").unwrap(),
            Utc::now(),
        );
        let json = serde_json::to_value(LedgerEvent::QuoteUpdated(quote)).unwrap();

        assert_eq!(json["type"], "QuoteUpdated");
        assert_eq!(json["payload"]["symbol"], "AAPL");
        assert_eq!(json["payload"]["price"], "190.25");
    }
}
