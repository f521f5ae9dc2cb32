use crate::error::ExecutionError;
use crate::execution::{fill_price, ExecutionGateway};
use crate::feeds::PriceSource;
use crate::models::order::{split_symbol, LegFill, OrderEngine, OrderSide};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Simulated execution: every order fills in full at the current LTP.
pub struct PaperGateway {
    prices: Arc<dyn PriceSource>,
}

impl PaperGateway {
    pub fn new(prices: Arc<dyn PriceSource>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn place_leg(&self, symbol: &str, side: OrderSide, quantity: u32) -> Result<LegFill, ExecutionError> {
        if split_symbol(symbol).is_none() {
            return Err(ExecutionError::BadSymbol(symbol.to_string()));
        }
        let price = fill_price(self.prices.as_ref(), symbol).await?;

        info!(symbol, %side, quantity, %price, "Paper fill");

        Ok(LegFill {
            symbol: symbol.to_string(),
            side,
            quantity,
            price: Some(price),
            engine: OrderEngine::Paper,
            order_id: None,
            timestamp: Utc::now(),
        })
    }

    fn engine(&self) -> OrderEngine {
        OrderEngine::Paper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::Quote;
    use rust_decimal::Decimal;

    struct FixedPrice(f64);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn last_traded_price(&self, symbol: &str) -> anyhow::Result<f64> {
            if symbol.ends_with("PE") {
                anyhow::bail!("no quote for {symbol}");
            }
            Ok(self.0)
        }

        async fn quote(&self, _symbol: &str) -> anyhow::Result<Quote> {
            Ok(Quote { last_price: self.0, prev_close: self.0 })
        }
    }

    #[tokio::test]
    async fn test_fills_at_ltp() {
        let gw = PaperGateway::new(Arc::new(FixedPrice(101.5)));
        let fill = gw.place_leg("NFO:NIFTY24JAN22500CE", OrderSide::Buy, 65).await.unwrap();
        assert_eq!(fill.price, Some(Decimal::new(10150, 2)));
        assert_eq!(fill.quantity, 65);
        assert_eq!(fill.engine, OrderEngine::Paper);
    }

    #[tokio::test]
    async fn test_missing_price_is_an_error() {
        let gw = PaperGateway::new(Arc::new(FixedPrice(101.5)));
        let err = gw.place_leg("NFO:NIFTY24JAN22500PE", OrderSide::Sell, 65).await.unwrap_err();
        assert!(matches!(err, ExecutionError::FillPrice { .. }));
    }

    #[tokio::test]
    async fn test_rejects_bare_symbol() {
        let gw = PaperGateway::new(Arc::new(FixedPrice(1.0)));
        let err = gw.place_leg("NIFTY24JAN22500CE", OrderSide::Buy, 65).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BadSymbol(_)));
    }
}
