pub mod snapshot;
pub mod straddle;
