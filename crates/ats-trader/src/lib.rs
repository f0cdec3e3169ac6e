//! Trader worker library: the Control Store client and the trading engine.
//!
//! The binary (`main.rs`) owns the cadence; [`engine::TradingEngine`] owns
//! one iteration of the pipeline; [`client::StoreClient`] is the only path
//! to the Control Store.

pub mod client;
pub mod engine;
