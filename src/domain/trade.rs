//! Trade records and the per-run trade log.

use crate::domain::ast::TradeAction;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub action: TradeAction,
    pub message: Option<String>,
    pub quantity: Option<f64>,
    /// Most recent close at the moment the record was emitted.
    pub reference_price: f64,
    /// Position in the log, starting at 0.
    pub sequence: usize,
}

/// Append-only log owned by one interpreter.
#[derive(Debug, Clone, Default)]
pub struct TradeLog {
    records: Vec<TradeRecord>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(
        &mut self,
        action: TradeAction,
        message: Option<String>,
        quantity: Option<f64>,
        reference_price: f64,
    ) -> &TradeRecord {
        let sequence = self.records.len();
        self.records.push(TradeRecord {
            action,
            message,
            quantity,
            reference_price,
            sequence,
        });
        &self.records[sequence]
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn position(&self) -> PositionSummary {
        PositionSummary::from_trades(&self.records)
    }
}

/// Net quantity traded so far. Records without a quantity count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionSummary {
    pub quantity: f64,
    pub buy_quantity: f64,
    pub sell_quantity: f64,
    pub trades_count: usize,
}

impl PositionSummary {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let mut summary = PositionSummary {
            trades_count: trades.len(),
            ..Default::default()
        };
        for trade in trades {
            let qty = trade.quantity.unwrap_or(0.0);
            match trade.action {
                TradeAction::Buy => summary.buy_quantity += qty,
                TradeAction::Sell => summary.sell_quantity += qty,
            }
        }
        summary.quantity = summary.buy_quantity - summary.sell_quantity;
        summary
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_assigns_sequence() {
        let mut log = TradeLog::new();
        log.emit(TradeAction::Buy, Some("entry".into()), Some(100.0), 105.0);
        let second = log.emit(TradeAction::Sell, None, None, 106.0);
        assert_eq!(second.sequence, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].message.as_deref(), Some("entry"));
    }

    #[test]
    fn clear_restarts_sequence() {
        let mut log = TradeLog::new();
        log.emit(TradeAction::Buy, None, None, 1.0);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.emit(TradeAction::Buy, None, None, 1.0).sequence, 0);
    }

    #[test]
    fn position_nets_buys_and_sells() {
        let mut log = TradeLog::new();
        log.emit(TradeAction::Buy, None, Some(100.0), 10.0);
        log.emit(TradeAction::Buy, None, Some(50.0), 11.0);
        log.emit(TradeAction::Sell, None, Some(30.0), 12.0);
        log.emit(TradeAction::Sell, Some("no size".into()), None, 12.0);

        let pos = log.position();
        assert!((pos.quantity - 120.0).abs() < f64::EPSILON);
        assert!((pos.buy_quantity - 150.0).abs() < f64::EPSILON);
        assert!((pos.sell_quantity - 30.0).abs() < f64::EPSILON);
        assert_eq!(pos.trades_count, 4);
        assert!(!pos.is_flat());
    }

    #[test]
    fn empty_log_is_flat() {
        let pos = TradeLog::new().position();
        assert!(pos.is_flat());
        assert_eq!(pos.trades_count, 0);
    }
}
