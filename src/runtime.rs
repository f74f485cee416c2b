//! Process-wide mutable settings changed by the operator between ticks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub capital_usd: f64,
    /// Every known venue, with its enabled flag.
    pub venues: BTreeMap<String, bool>,
}

impl RuntimeConfig {
    pub fn enabled_venues(&self) -> BTreeSet<String> {
        self.venues
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Shared handle. Readers take a full copy, so a tick never observes a
/// half-applied change.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl RuntimeHandle {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> RuntimeConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_capital(&self, amount: f64) -> Result<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AppError::Config(format!("capital must be a non-negative number, got {amount}")));
        }
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .capital_usd = amount;
        info!(capital_usd = amount, "[CONTROL] capital updated");
        Ok(amount)
    }

    pub fn enable_venue(&self, name: &str) -> Result<()> {
        self.set_venue(name, true)
    }

    pub fn disable_venue(&self, name: &str) -> Result<()> {
        self.set_venue(name, false)
    }

    fn set_venue(&self, name: &str, enabled: bool) -> Result<()> {
        let key = name.to_lowercase();
        let mut cfg = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(flag) = cfg.venues.get_mut(&key) else {
            return Err(AppError::Config(format!("unknown venue: {key}")));
        };
        *flag = enabled;
        info!(venue = %key, enabled, "[CONTROL] venue toggled");
        Ok(())
    }
}
