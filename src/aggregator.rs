//! Per-tick market snapshots across enabled venues.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cex::{FundingSupport, VenueAdapter};
use crate::errors::{AppError, Result, with_timeout};
use crate::models::{FundingBook, FundingSnapshot, TickerBook, TickerSnapshot};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Only `*/<settlement>` pairs are kept.
    pub settlement_asset: String,
    /// A funding set smaller than this is dropped for the pass.
    pub min_funding_entries: usize,
    pub call_timeout: Duration,
}

pub struct MarketAggregator {
    venues: Vec<Arc<dyn VenueAdapter>>,
    config: AggregatorConfig,
}

impl MarketAggregator {
    pub fn new(venues: Vec<Arc<dyn VenueAdapter>>, config: AggregatorConfig) -> Self {
        Self { venues, config }
    }

    fn enabled<'a>(&'a self, enabled: &'a BTreeSet<String>) -> impl Iterator<Item = &'a Arc<dyn VenueAdapter>> + 'a {
        self.venues.iter().filter(move |v| enabled.contains(v.name()))
    }

    /// Tickers for every enabled venue, queried concurrently. A failing venue
    /// contributes an empty set instead of failing the snapshot.
    pub async fn snapshot_tickers(&self, enabled: &BTreeSet<String>) -> TickerBook {
        let calls = self.enabled(enabled).map(|venue| async move {
            let name = venue.name().to_string();
            let res = self.venue_tickers(venue.as_ref()).await;
            (name, res)
        });

        let mut book = TickerBook::new();
        for (name, res) in join_all(calls).await {
            let tickers = match res {
                Ok(t) => t,
                Err(e) => {
                    warn!(venue = %name, error = %e, "[CEX] ticker fetch failed");
                    HashMap::new()
                }
            };
            book.insert(name, tickers);
        }
        book
    }

    /// Funding rates for every enabled venue that supports them. Venues that
    /// fail or return fewer than `min_funding_entries` rates are left out.
    pub async fn snapshot_funding(&self, enabled: &BTreeSet<String>) -> FundingBook {
        let calls = self
            .enabled(enabled)
            .filter(|v| v.funding_support() == FundingSupport::Supported)
            .map(|venue| async move {
                let name = venue.name().to_string();
                let res = self.venue_funding(venue.as_ref()).await;
                (name, res)
            });

        let mut book = FundingBook::new();
        for (name, res) in join_all(calls).await {
            match res {
                Ok(rates) => {
                    book.insert(name, rates);
                }
                Err(e @ AppError::DataQualityLow { .. }) => {
                    debug!(venue = %name, error = %e, "[FUNDING] feed too small, skipped");
                }
                Err(e) => {
                    warn!(venue = %name, error = %e, "[FUNDING] fetch failed");
                }
            }
        }
        book
    }

    async fn venue_tickers(&self, venue: &dyn VenueAdapter) -> Result<HashMap<String, TickerSnapshot>> {
        let raw = with_timeout(self.config.call_timeout, venue.name(), venue.fetch_tickers()).await?;
        let suffix = format!("/{}", self.config.settlement_asset);
        let tickers: HashMap<String, TickerSnapshot> = raw
            .into_iter()
            .filter(|t| t.symbol.ends_with(&suffix) && t.last.is_finite() && t.last > 0.0)
            .map(|t| {
                (
                    t.symbol.clone(),
                    TickerSnapshot {
                        venue: venue.name().to_string(),
                        symbol: t.symbol,
                        last: t.last,
                        quote_volume: t.quote_volume,
                    },
                )
            })
            .collect();
        debug!(venue = venue.name(), count = tickers.len(), "[CEX] tickers");
        Ok(tickers)
    }

    async fn venue_funding(&self, venue: &dyn VenueAdapter) -> Result<HashMap<String, FundingSnapshot>> {
        let raw = with_timeout(
            self.config.call_timeout,
            venue.name(),
            venue.fetch_funding_rates(),
        )
        .await?;
        if raw.len() < self.config.min_funding_entries {
            return Err(AppError::DataQualityLow {
                venue: venue.name().to_string(),
                entries: raw.len(),
                minimum: self.config.min_funding_entries,
            });
        }
        Ok(raw
            .into_iter()
            .map(|r| {
                (
                    r.symbol.clone(),
                    FundingSnapshot {
                        venue: venue.name().to_string(),
                        symbol: r.symbol,
                        funding_rate: r.funding_rate,
                        quote_volume: r.quote_volume,
                    },
                )
            })
            .collect())
    }
}
