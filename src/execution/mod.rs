pub mod kite;
pub mod paper;
pub mod stocko;

use crate::config::{EngineChoice, ExecutionConfig, TradeMode};
use crate::error::ExecutionError;
use crate::feeds::kite::KiteClient;
use crate::feeds::PriceSource;
use crate::models::order::{to_price, LegFill, OrderEngine, OrderSide};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Places one option leg at market and reports its fill.
///
/// `Err` means the venue did not take the order. Once the venue has
/// accepted it the result is `Ok`, with `price: None` if the fill price
/// could not be read back.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_leg(&self, symbol: &str, side: OrderSide, quantity: u32) -> Result<LegFill, ExecutionError>;

    fn engine(&self) -> OrderEngine;
}

/// Pick the gateway for the configured mode and engine.
///
/// PAPER always simulates. LIVE with AUTO prefers Stocko when an order
/// URL is configured and falls back to Kite.
pub fn build_gateway(
    config: &ExecutionConfig,
    kite: Arc<KiteClient>,
    prices: Arc<dyn PriceSource>,
    timeout: Duration,
) -> Result<Arc<dyn ExecutionGateway>> {
    if config.mode == TradeMode::Paper {
        return Ok(Arc::new(paper::PaperGateway::new(prices)));
    }

    let stocko_url = config.stocko_order_url.clone();
    let use_stocko = match config.engine {
        EngineChoice::Stocko => true,
        EngineChoice::Auto => stocko_url.is_some(),
        EngineChoice::Kite => false,
    };

    match (use_stocko, stocko_url) {
        (true, Some(url)) => Ok(Arc::new(stocko::StockoGateway::new(
            url,
            config.stocko_auth_token.clone().unwrap_or_default(),
            prices,
            timeout,
        )?)),
        (true, None) => anyhow::bail!("Stocko selected but STOCKO_ORDER_URL is not configured"),
        (false, _) => Ok(Arc::new(kite::KiteGateway::new(kite, prices))),
    }
}

/// Post-order fill price. Market orders are reported at the LTP right
/// after acceptance, which is what both brokers' simple order APIs allow.
pub(crate) async fn fill_price(prices: &dyn PriceSource, symbol: &str) -> Result<Decimal, ExecutionError> {
    let ltp = prices
        .last_traded_price(symbol)
        .await
        .map_err(|source| ExecutionError::FillPrice {
            symbol: symbol.to_string(),
            source,
        })?;
    to_price(ltp).ok_or_else(|| ExecutionError::FillPrice {
        symbol: symbol.to_string(),
        source: anyhow::anyhow!("non-finite LTP {ltp}"),
    })
}

/// Fill price for an order the broker already accepted. A failed read
/// leaves the price unknown; it never turns the order into a rejection.
pub(crate) async fn accepted_fill_price(prices: &dyn PriceSource, symbol: &str, side: OrderSide) -> Option<Decimal> {
    match fill_price(prices, symbol).await {
        Ok(price) => Some(price),
        Err(e) => {
            warn!("{side} {symbol} accepted but fill price unknown: {e}");
            None
        }
    }
}
