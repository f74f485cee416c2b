//! Fee, slippage and gas normalisation of raw spreads.

use std::collections::HashMap;

use crate::dex::gas::GasTable;
use crate::models::Chain;

/// Which legs a trade crosses; decides which costs apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeMode {
    CexCex,
    CexDex(Chain),
}

/// Fee schedule and slippage assumption, all in percent.
#[derive(Debug, Clone)]
pub struct CostParameters {
    pub default_cex_fee_pct: f64,
    pub cex_fee_overrides: HashMap<String, f64>,
    pub dex_fee_pct: f64,
    pub slippage_pct: f64,
}

impl CostParameters {
    pub fn cex_fee_pct(&self, venue: &str) -> f64 {
        self.cex_fee_overrides
            .get(&venue.to_lowercase())
            .copied()
            .unwrap_or(self.default_cex_fee_pct)
    }
}

/// Percentage difference of two prices relative to their midpoint.
/// `None` when the midpoint is not positive.
pub fn raw_spread_pct(a: f64, b: f64) -> Option<f64> {
    let sum = a + b;
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    Some(((a - b) / (sum / 2.0) * 100.0).abs())
}

/// Gas cost of one swap in USD.
pub fn swap_gas_cost_usd(gas_gwei: f64, gas_units: f64, gas_multiplier: f64, native_usd: f64) -> f64 {
    gas_gwei * 1e-9 * gas_units * gas_multiplier * native_usd
}

/// Cost model bound to one tick's parameters and gas snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CostModel<'a> {
    params: &'a CostParameters,
    gas: Option<&'a GasTable>,
}

impl<'a> CostModel<'a> {
    pub fn new(params: &'a CostParameters, gas: Option<&'a GasTable>) -> Self {
        Self { params, gas }
    }

    /// Gas cost of a swap as a percentage of `capital`; zero without capital.
    pub fn gas_pct(&self, chain: Chain, capital: f64) -> f64 {
        let gas_usd = self.gas.map_or(0.0, |g| g.usd_for(chain));
        if capital > 0.0 && gas_usd > 0.0 {
            gas_usd / capital * 100.0
        } else {
            0.0
        }
    }

    /// Total modelled cost in percent. Never negative for validated parameters.
    pub fn total_cost_pct(&self, mode: TradeMode, venue: &str, capital: f64) -> f64 {
        let cex_fee = self.params.cex_fee_pct(venue);
        match mode {
            TradeMode::CexCex => 2.0 * cex_fee + self.params.slippage_pct,
            TradeMode::CexDex(chain) => {
                cex_fee
                    + self.params.dex_fee_pct
                    + self.params.slippage_pct
                    + self.gas_pct(chain, capital)
            }
        }
    }

    /// `raw_pct` minus total cost. Not clamped; callers apply the threshold.
    pub fn effective(&self, raw_pct: f64, mode: TradeMode, venue: &str, capital: f64) -> f64 {
        raw_pct - self.total_cost_pct(mode, venue, capital)
    }
}
