pub mod config;
pub mod error;
pub mod execution;
pub mod feeds;
pub mod models;
pub mod risk;
pub mod signals;
pub mod storage;
pub mod strategies;
pub mod telemetry;
