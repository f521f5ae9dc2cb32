use crate::models::order::OrderSide;
use crate::models::position::OptionKind;
use thiserror::Error;

/// The venue did not take the order, so nothing is open at the broker.
/// An accepted order with an unknown fill price is not an error here.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("malformed symbol {0:?} (expected EXCHANGE:TRADINGSYMBOL)")]
    BadSymbol(String),
    #[error("{side} {symbol} rejected by {engine}: {reason}")]
    Rejected {
        engine: &'static str,
        symbol: String,
        side: OrderSide,
        reason: String,
    },
    #[error("{side} {symbol} transport error: {source}")]
    Transport {
        symbol: String,
        side: OrderSide,
        #[source]
        source: anyhow::Error,
    },
    #[error("fill price unavailable for {symbol}: {source}")]
    FillPrice {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no unexpired {kind} contract for {underlying} {strike}")]
    NoOption {
        underlying: String,
        strike: i64,
        kind: OptionKind,
    },
    #[error("no unexpired future for {0}")]
    NoFuture(String),
}

/// Errors surfaced by a single engine tick.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("price unavailable for {symbol}: {source}")]
    Price {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("order accepted for {0} but fill price unknown")]
    UnpricedFill(String),
}

impl EngineError {
    /// Transient errors are retried on the next tick without a cooldown.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Price { .. })
    }
}
