//! Core library for the spread-monitor project.
//!
//! Watches centralized venues and on-chain routers for price and funding-rate
//! gaps that survive fees, slippage and gas, and alerts a single operator.

pub mod aggregator;
pub mod alerts;
pub mod arbitrage;
pub mod cex;
pub mod config;
pub mod control;
pub mod dex;
pub mod errors;
pub mod models;
pub mod runtime;
pub mod scheduler;
pub mod utils;
