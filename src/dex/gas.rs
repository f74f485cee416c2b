//! TTL-cached USD cost of one swap per chain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::arbitrage::cost::swap_gas_cost_usd;
use crate::errors::Result;
use crate::models::Chain;

/// Source of native-asset USD prices (e.g. CoinGecko `simple/price`).
#[async_trait]
pub trait NativePriceSource: Send + Sync {
    /// Prices for as many of `chains` as the source knows; missing chains fall back.
    async fn native_prices_usd(&self, chains: &[Chain]) -> Result<HashMap<Chain, f64>>;
}

/// Source of current gas unit prices in gwei (e.g. `eth_gasPrice`).
#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn gas_price_gwei(&self, chain: Chain) -> Result<f64>;
}

/// Static fallbacks for one chain, used independently per datum.
#[derive(Debug, Clone, Copy)]
pub struct GasFallback {
    pub gas_price_gwei: f64,
    pub native_price_usd: f64,
}

#[derive(Debug, Clone)]
pub struct GasConfig {
    pub ttl: Duration,
    pub swap_gas_units: u64,
    pub gas_multiplier: f64,
    pub fallbacks: HashMap<Chain, GasFallback>,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasEstimate {
    pub chain: Chain,
    pub gas_price_gwei: f64,
    pub native_price_usd: f64,
    pub usd_per_swap: f64,
}

/// Immutable set of estimates produced by one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct GasTable {
    estimates: BTreeMap<Chain, GasEstimate>,
    refreshed_at: Instant,
}

impl GasTable {
    pub fn new(estimates: Vec<GasEstimate>, refreshed_at: Instant) -> Self {
        Self {
            estimates: estimates.into_iter().map(|e| (e.chain, e)).collect(),
            refreshed_at,
        }
    }

    pub fn usd_for(&self, chain: Chain) -> f64 {
        self.estimates.get(&chain).map_or(0.0, |e| e.usd_per_swap)
    }

    pub fn get(&self, chain: Chain) -> Option<&GasEstimate> {
        self.estimates.get(&chain)
    }

    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }
}

/// Holds the latest [`GasTable`]. Readers always see a whole table; a refresh
/// swaps in a new one.
pub struct GasOracle {
    config: GasConfig,
    prices: Arc<dyn NativePriceSource>,
    gas_prices: Option<Arc<dyn GasPriceSource>>,
    table: watch::Sender<Option<Arc<GasTable>>>,
    refresh_lock: Mutex<()>,
}

impl GasOracle {
    pub fn new(
        config: GasConfig,
        prices: Arc<dyn NativePriceSource>,
        gas_prices: Option<Arc<dyn GasPriceSource>>,
    ) -> Self {
        let (table, _rx) = watch::channel(None);
        Self {
            config,
            prices,
            gas_prices,
            table,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Latest table, if any refresh has happened.
    pub fn current(&self) -> Option<Arc<GasTable>> {
        self.table.borrow().clone()
    }

    /// Refreshes unless the current table is younger than the TTL. Never fails:
    /// every missing datum is replaced by its fallback.
    pub async fn refresh(&self, now: Instant) -> Arc<GasTable> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(table) = self.current() {
            if now.saturating_duration_since(table.refreshed_at) < self.config.ttl {
                return table;
            }
        }

        let prices = match tokio::time::timeout(
            self.config.call_timeout,
            self.prices.native_prices_usd(&Chain::ALL),
        )
        .await
        {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => {
                warn!(error = %e, "[GAS] native price fetch failed, using fallbacks");
                HashMap::new()
            }
            Err(_) => {
                warn!("[GAS] native price fetch timed out, using fallbacks");
                HashMap::new()
            }
        };

        let mut estimates = Vec::with_capacity(Chain::ALL.len());
        for chain in Chain::ALL {
            let fallback = self.fallback(chain);
            let native_price_usd = prices
                .get(&chain)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0)
                .unwrap_or(fallback.native_price_usd);
            let gas_price_gwei = self.gas_price(chain).await.unwrap_or(fallback.gas_price_gwei);
            let usd_per_swap = swap_gas_cost_usd(
                gas_price_gwei,
                self.config.swap_gas_units as f64,
                self.config.gas_multiplier,
                native_price_usd,
            );
            estimates.push(GasEstimate {
                chain,
                gas_price_gwei,
                native_price_usd,
                usd_per_swap,
            });
        }

        let table = Arc::new(GasTable::new(estimates, now));
        info!(
            eth_usd = table.usd_for(Chain::Eth),
            bsc_usd = table.usd_for(Chain::Bsc),
            "[GAS] estimate refreshed"
        );
        self.table.send_replace(Some(table.clone()));
        table
    }

    fn fallback(&self, chain: Chain) -> GasFallback {
        self.config.fallbacks.get(&chain).copied().unwrap_or(GasFallback {
            gas_price_gwei: 0.0,
            native_price_usd: 0.0,
        })
    }

    async fn gas_price(&self, chain: Chain) -> Option<f64> {
        let source = self.gas_prices.as_ref()?;
        match tokio::time::timeout(self.config.call_timeout, source.gas_price_gwei(chain)).await {
            Ok(Ok(gwei)) if gwei.is_finite() && gwei > 0.0 => Some(gwei),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                debug!(%chain, error = %e, "[GAS] gas price read failed");
                None
            }
            Err(_) => {
                debug!(%chain, "[GAS] gas price read timed out");
                None
            }
        }
    }
}
