use std::sync::Arc;

use crate::arbitrage::cost::{CostModel, CostParameters};
use crate::dex::gas::GasTable;

/// Thresholds shared by the scanners.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Minimum effective spread for spot and DEX opportunities, in percent.
    pub min_effective_spread_pct: f64,
    /// Minimum funding-rate delta, in percent. Independent of the spread threshold.
    pub min_funding_delta_pct: f64,
    /// Minimum 24h settlement-asset volume per leg.
    pub min_volume_24h: f64,
    pub min_profit_usd: f64,
    /// Symbols considered per DEX pass, ranked by volume.
    pub dex_candidate_limit: usize,
    /// Symbols quoted on-chain concurrently.
    pub dex_concurrency: usize,
}

/// Everything a scanner reads for one tick. Built once and shared.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub settings: Arc<ScanSettings>,
    pub costs: Arc<CostParameters>,
    pub gas: Option<Arc<GasTable>>,
    pub capital_usd: f64,
}

impl ScanContext {
    pub fn cost_model(&self) -> CostModel<'_> {
        CostModel::new(&self.costs, self.gas.as_deref())
    }

    pub fn profit_usd(&self, effective_pct: f64) -> f64 {
        effective_pct / 100.0 * self.capital_usd
    }

    pub fn liquid(&self, volume: f64) -> bool {
        volume >= self.settings.min_volume_24h
    }

    /// Spread and profit gate applied by the spot and DEX scanners.
    pub fn passes(&self, effective_pct: f64, profit_usd: f64) -> bool {
        effective_pct >= self.settings.min_effective_spread_pct
            && profit_usd >= self.settings.min_profit_usd
    }
}
