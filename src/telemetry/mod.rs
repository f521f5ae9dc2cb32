pub mod alerts;
pub mod journal;
pub mod pnl;
