use crate::error::ExecutionError;
use crate::execution::{accepted_fill_price, ExecutionGateway};
use crate::feeds::kite::KiteClient;
use crate::feeds::PriceSource;
use crate::models::order::{split_symbol, LegFill, OrderEngine, OrderSide};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Live MARKET/MIS orders through Kite Connect `/orders/regular`.
pub struct KiteGateway {
    client: Arc<KiteClient>,
    prices: Arc<dyn PriceSource>,
}

#[derive(Debug, Serialize)]
struct PlaceOrderForm<'a> {
    exchange: &'a str,
    tradingsymbol: &'a str,
    transaction_type: &'a str,
    quantity: u32,
    product: &'a str,
    order_type: &'a str,
    validity: &'a str,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderData {
    order_id: String,
}

impl KiteGateway {
    pub fn new(client: Arc<KiteClient>, prices: Arc<dyn PriceSource>) -> Self {
        Self { client, prices }
    }
}

#[async_trait]
impl ExecutionGateway for KiteGateway {
    async fn place_leg(&self, symbol: &str, side: OrderSide, quantity: u32) -> Result<LegFill, ExecutionError> {
        let (exchange, tradingsymbol) =
            split_symbol(symbol).ok_or_else(|| ExecutionError::BadSymbol(symbol.to_string()))?;

        let form = PlaceOrderForm {
            exchange,
            tradingsymbol,
            transaction_type: side.as_str(),
            quantity,
            product: "MIS",
            order_type: "MARKET",
            validity: "DAY",
        };

        let resp = self
            .client
            .request(reqwest::Method::POST, "/orders/regular")
            .form(&form)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport {
                symbol: symbol.to_string(),
                side,
                source: e.into(),
            })?;

        let data: PlaceOrderData = KiteClient::decode(resp).await.map_err(|e| {
            error!("Kite order rejected: {side} {symbol}: {e}");
            ExecutionError::Rejected {
                engine: "KITE",
                symbol: symbol.to_string(),
                side,
                reason: e.to_string(),
            }
        })?;

        let price = accepted_fill_price(self.prices.as_ref(), symbol, side).await;
        info!(order_id = %data.order_id, symbol, %side, quantity, ?price, "Kite order placed");

        Ok(LegFill {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            engine: OrderEngine::Kite,
            order_id: Some(data.order_id),
            timestamp: Utc::now(),
        })
    }

    fn engine(&self) -> OrderEngine {
        OrderEngine::Kite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_form_encoding() {
        let form = PlaceOrderForm {
            exchange: "NFO",
            tradingsymbol: "NIFTY24JAN22500CE",
            transaction_type: OrderSide::Sell.as_str(),
            quantity: 65,
            product: "MIS",
            order_type: "MARKET",
            validity: "DAY",
        };
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["transaction_type"], "SELL");
        assert_eq!(json["quantity"], 65);
        assert_eq!(json["tradingsymbol"], "NIFTY24JAN22500CE");
    }
}
