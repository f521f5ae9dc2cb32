use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which venue actually carried an order. Recorded on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderEngine {
    Paper,
    Stocko,
    Kite,
}

impl OrderEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEngine::Paper => "PAPER",
            OrderEngine::Stocko => "STOCKO",
            OrderEngine::Kite => "KITE",
        }
    }
}

impl fmt::Display for OrderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leg the venue accepted.
///
/// `price` is `None` when the order went through but its fill price could
/// not be read back; the leg must still be treated as filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegFill {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Option<Decimal>,
    pub engine: OrderEngine,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Exchange price from a feed float, kept to paise. `None` for NaN/inf.
pub fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64_retain(value).map(|d| d.round_dp(2))
}

/// Split `EXCHANGE:TRADINGSYMBOL` into its parts.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (exchange, tradingsymbol) = symbol.split_once(':')?;
    if exchange.is_empty() || tradingsymbol.is_empty() {
        return None;
    }
    Some((exchange, tradingsymbol))
}
