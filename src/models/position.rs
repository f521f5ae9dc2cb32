use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKind {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionKind {
    /// Exchange instrument_type code.
    pub fn code(&self) -> &'static str {
        match self {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One long option contract of the straddle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub symbol: String,
    pub entry_price: Decimal,
}

/// Both legs bought at the same strike.
///
/// Every field is mandatory: the engine holds `Option<StraddlePosition>`,
/// so a position is either fully populated or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StraddlePosition {
    pub strike: i64,
    pub call: Leg,
    pub put: Leg,
    pub opened_at: DateTime<Utc>,
}

impl StraddlePosition {
    pub fn new(strike: i64, call: Leg, put: Leg) -> Self {
        Self {
            strike,
            call,
            put,
            opened_at: Utc::now(),
        }
    }

    /// Mark-to-market PnL at the given leg prices.
    pub fn pnl_at(&self, call_price: Decimal, put_price: Decimal, quantity: u32) -> Decimal {
        (call_price - self.call.entry_price + put_price - self.put.entry_price) * Decimal::from(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn straddle() -> StraddlePosition {
        StraddlePosition::new(
            22500,
            Leg { symbol: "NFO:NIFTY24JAN22500CE".into(), entry_price: dec!(100) },
            Leg { symbol: "NFO:NIFTY24JAN22500PE".into(), entry_price: dec!(90) },
        )
    }

    #[test]
    fn test_pnl_at() {
        let pos = straddle();
        assert_eq!(pos.pnl_at(dec!(110), dec!(85), 65), dec!(325));
        assert_eq!(pos.pnl_at(dec!(100), dec!(90), 65), Decimal::ZERO);
        assert_eq!(pos.pnl_at(dec!(80), dec!(90), 65), dec!(-1300));
    }

    #[test]
    fn test_pnl_exact_on_tick_prices() {
        let pos = StraddlePosition::new(
            22500,
            Leg { symbol: "NFO:CE".into(), entry_price: dec!(50.05) },
            Leg { symbol: "NFO:PE".into(), entry_price: dec!(123.45) },
        );
        assert_eq!(pos.pnl_at(dec!(50.10), dec!(123.40), 65), Decimal::ZERO);
    }
}
