//! DEX integration: router quotes, token resolution and gas estimates.

pub mod calc;
pub mod client;
pub mod coingecko;
pub mod gas;
pub mod quote;
pub mod tokens;

pub use client::{ChainEndpoint, EvmClient, OnChainRouter};
pub use gas::{GasOracle, GasTable};
pub use quote::{DexPriceSource, DexQuote, DexQuoter};
pub use tokens::{TokenCatalog, TokenResolution, TokenResolver};
