use crate::models::position::StraddlePosition;
use rust_decimal::Decimal;
use tracing::info;

/// Running realized PnL for the session.
///
/// Only exits (final, kill-switch, time, roll) move the total; entries never do.
#[derive(Debug, Clone, Default)]
pub struct PnlLedger {
    realized: Decimal,
    closed_trades: u32,
    winning_trades: u32,
}

impl PnlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realized(&self) -> Decimal {
        self.realized
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.closed_trades as f64
    }

    /// Close `pos` at the given exit prices and book the result.
    /// Returns the PnL of this close.
    pub fn realize(&mut self, pos: &StraddlePosition, ce_exit: Decimal, pe_exit: Decimal, quantity: u32) -> Decimal {
        let pnl = pos.pnl_at(ce_exit, pe_exit, quantity);
        self.realized += pnl;
        self.closed_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        }
        pnl
    }

    pub fn log_summary(&self) {
        info!(
            "=== P&L SUMMARY === realized={:.2} trades={} win_rate={:.1}%",
            self.realized,
            self.closed_trades,
            self.win_rate() * 100.0,
        );
    }
}
