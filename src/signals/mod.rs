pub mod atr;
pub mod strike;
