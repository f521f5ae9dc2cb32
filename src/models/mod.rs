pub mod candle;
pub mod event;
pub mod order;
pub mod position;
