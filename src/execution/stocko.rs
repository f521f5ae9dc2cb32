use crate::error::ExecutionError;
use crate::execution::{accepted_fill_price, ExecutionGateway};
use crate::feeds::PriceSource;
use crate::models::order::{split_symbol, LegFill, OrderEngine, OrderSide};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Live orders through a Stocko order endpoint (JSON, bearer token).
pub struct StockoGateway {
    order_url: String,
    auth_token: String,
    http: reqwest::Client,
    prices: Arc<dyn PriceSource>,
}

#[derive(Debug, Serialize)]
struct StockoOrder<'a> {
    exchange: &'a str,
    tradingsymbol: &'a str,
    transaction_type: &'a str,
    quantity: u32,
    order_type: &'a str,
    product: &'a str,
}

impl StockoGateway {
    pub fn new(
        order_url: String,
        auth_token: String,
        prices: Arc<dyn PriceSource>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Stocko HTTP client")?;
        Ok(Self {
            order_url,
            auth_token,
            http,
            prices,
        })
    }
}

#[async_trait]
impl ExecutionGateway for StockoGateway {
    async fn place_leg(&self, symbol: &str, side: OrderSide, quantity: u32) -> Result<LegFill, ExecutionError> {
        let (exchange, tradingsymbol) =
            split_symbol(symbol).ok_or_else(|| ExecutionError::BadSymbol(symbol.to_string()))?;

        let body = StockoOrder {
            exchange,
            tradingsymbol,
            transaction_type: side.as_str(),
            quantity,
            order_type: "MARKET",
            product: "MIS",
        };

        let resp = self
            .http
            .post(&self.order_url)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport {
                symbol: symbol.to_string(),
                side,
                source: e.into(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("Stocko order HTTP {status}: {text}");
            return Err(ExecutionError::Rejected {
                engine: "STOCKO",
                symbol: symbol.to_string(),
                side,
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let price = accepted_fill_price(self.prices.as_ref(), symbol, side).await;
        info!(symbol, %side, quantity, ?price, "Stocko order placed");

        Ok(LegFill {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            engine: OrderEngine::Stocko,
            order_id: None,
            timestamp: Utc::now(),
        })
    }

    fn engine(&self) -> OrderEngine {
        OrderEngine::Stocko
    }
}
