pub mod instruments;
pub mod kite;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Last price plus previous session close for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: f64,
    pub prev_close: f64,
}

/// Market data the engine reads each tick.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn last_traded_price(&self, symbol: &str) -> anyhow::Result<f64>;

    async fn quote(&self, symbol: &str) -> anyhow::Result<Quote>;
}
