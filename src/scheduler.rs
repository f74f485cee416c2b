//! Tick loop: gas refresh, market snapshot, three concurrent scans, alerts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::aggregator::MarketAggregator;
use crate::alerts::dedup::{AlertDeduplicator, EmitOutcome};
use crate::alerts::format::format_alert;
use crate::arbitrage::cost::CostParameters;
use crate::arbitrage::types::{ScanContext, ScanSettings};
use crate::arbitrage::{scan_cex_cex, scan_cex_dex, scan_funding};
use crate::dex::gas::GasOracle;
use crate::dex::quote::DexPriceSource;
use crate::models::{FundingBook, Opportunity};
use crate::runtime::RuntimeHandle;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Funding is re-snapshotted only when this much time has passed.
    pub funding_interval: Duration,
    pub settlement_asset: String,
}

/// Per-scanner result of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub found: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub venues: usize,
    pub funding_refreshed: bool,
    /// `None` when the scanner task panicked.
    pub spot: Option<ScanOutcome>,
    pub funding: Option<ScanOutcome>,
    pub dex: Option<ScanOutcome>,
}

#[derive(Default)]
struct FundingState {
    last_snapshot: Option<Instant>,
    book: Arc<FundingBook>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    aggregator: Arc<MarketAggregator>,
    gas: Arc<GasOracle>,
    dex: Arc<dyn DexPriceSource>,
    dedup: Arc<AlertDeduplicator>,
    runtime: RuntimeHandle,
    settings: Arc<ScanSettings>,
    costs: Arc<CostParameters>,
    funding: Mutex<FundingState>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        aggregator: Arc<MarketAggregator>,
        gas: Arc<GasOracle>,
        dex: Arc<dyn DexPriceSource>,
        dedup: Arc<AlertDeduplicator>,
        runtime: RuntimeHandle,
        settings: Arc<ScanSettings>,
        costs: Arc<CostParameters>,
    ) -> Self {
        Self {
            config,
            aggregator,
            gas,
            dex,
            dedup,
            runtime,
            settings,
            costs,
            funding: Mutex::new(FundingState::default()),
        }
    }

    fn funding_due(&self, now: Instant) -> bool {
        let state = self.funding.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .last_snapshot
            .is_none_or(|at| now.saturating_duration_since(at) >= self.config.funding_interval)
    }

    /// Runs one full pass. Nothing inside a tick is fatal.
    pub async fn tick(&self, now: Instant) -> TickReport {
        let gas = self.gas.refresh(now).await;
        let runtime = self.runtime.snapshot();
        let enabled = runtime.enabled_venues();

        let tickers = Arc::new(self.aggregator.snapshot_tickers(&enabled).await);

        let funding_refreshed = self.funding_due(now);
        let funding = if funding_refreshed {
            let book = Arc::new(self.aggregator.snapshot_funding(&enabled).await);
            let mut state = self.funding.lock().unwrap_or_else(PoisonError::into_inner);
            state.last_snapshot = Some(now);
            state.book = book.clone();
            book
        } else {
            let cached = self
                .funding
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .book
                .clone();
            // venues disabled since the last snapshot drop out
            Arc::new(
                cached
                    .iter()
                    .filter(|(venue, _)| enabled.contains(*venue))
                    .map(|(venue, rates)| (venue.clone(), rates.clone()))
                    .collect(),
            )
        };

        let ctx = ScanContext {
            settings: self.settings.clone(),
            costs: self.costs.clone(),
            gas: Some(gas),
            capital_usd: runtime.capital_usd,
        };

        let spot_task = {
            let (tickers, ctx) = (tickers.clone(), ctx.clone());
            let emitter = self.emitter(now);
            tokio::spawn(async move { emitter.deliver(scan_cex_cex(&tickers, &ctx)).await })
        };
        let funding_task = {
            let (tickers, funding, ctx) = (tickers.clone(), funding.clone(), ctx.clone());
            let emitter = self.emitter(now);
            tokio::spawn(async move { emitter.deliver(scan_funding(&funding, &tickers, &ctx)).await })
        };
        let dex_task = {
            let (tickers, ctx, dex) = (tickers.clone(), ctx.clone(), self.dex.clone());
            let emitter = self.emitter(now);
            tokio::spawn(async move {
                let found = scan_cex_dex(&tickers, dex.as_ref(), &ctx).await;
                emitter.deliver(found).await
            })
        };

        let (spot, funding_res, dex) = tokio::join!(spot_task, funding_task, dex_task);
        let report = TickReport {
            venues: tickers.len(),
            funding_refreshed,
            spot: joined("spot", spot),
            funding: joined("funding", funding_res),
            dex: joined("dex", dex),
        };
        info!(
            venues = report.venues,
            funding_refreshed,
            spot = ?report.spot,
            funding = ?report.funding,
            dex = ?report.dex,
            "[TICK] pass complete"
        );
        let found: usize = [report.spot, report.funding, report.dex]
            .iter()
            .flatten()
            .map(|o| o.found)
            .sum();
        if found == 0 {
            info!(
                capital_usd = runtime.capital_usd,
                min_eff_spread = self.settings.min_effective_spread_pct,
                "[HEARTBEAT] no opps above threshold"
            );
        }
        report
    }

    fn emitter(&self, now: Instant) -> Emitter {
        Emitter {
            dedup: self.dedup.clone(),
            settlement: self.config.settlement_asset.clone(),
            now,
        }
    }

    /// Ticks on a fixed interval until `shutdown` flips. An in-flight tick is
    /// allowed to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            every = ?self.config.tick_interval,
            funding_every = ?self.config.funding_interval,
            "[TICK] scheduler started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.tick(Instant::now()).await;
                }
            }
        }
        info!("[TICK] scheduler stopped");
    }
}

fn joined(scanner: &str, res: std::result::Result<ScanOutcome, tokio::task::JoinError>) -> Option<ScanOutcome> {
    match res {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(scanner, error = %e, "[TICK] scanner task failed");
            None
        }
    }
}

/// Formats and forwards one scanner's findings through the deduplicator.
struct Emitter {
    dedup: Arc<AlertDeduplicator>,
    settlement: String,
    now: Instant,
}

impl Emitter {
    async fn deliver(&self, found: Vec<Opportunity>) -> ScanOutcome {
        let mut outcome = ScanOutcome {
            found: found.len(),
            delivered: 0,
        };
        for opp in &found {
            let text = format_alert(opp, &self.settlement);
            match self.dedup.emit(&opp.fingerprint(), &text, self.now).await {
                EmitOutcome::Delivered => {
                    outcome.delivered += 1;
                    info!(
                        fingerprint = %opp.fingerprint(),
                        eff = opp.effective_spread_pct,
                        profit_usd = opp.profit_usd,
                        "[OPP] opportunity alerted"
                    );
                }
                EmitOutcome::Failed => {
                    warn!(fingerprint = %opp.fingerprint(), "[OPP] alert not delivered, will retry");
                }
                EmitOutcome::Suppressed => {}
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorConfig;
    use crate::alerts::dedup::DedupConfig;
    use crate::alerts::notifier::Notifier;
    use crate::cex::{FundingSupport, VenueAdapter, VenueFundingRate, VenueTicker};
    use crate::dex::gas::{GasConfig, GasFallback, NativePriceSource};
    use crate::dex::quote::DexQuote;
    use crate::errors::{AppError, Result};
    use crate::models::Chain;
    use crate::runtime::RuntimeConfig;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Venue {
        name: &'static str,
        price: f64,
        rate: f64,
        funding_calls: AtomicUsize,
    }

    #[async_trait]
    impl VenueAdapter for Venue {
        fn name(&self) -> &str {
            self.name
        }

        fn funding_support(&self) -> FundingSupport {
            FundingSupport::Supported
        }

        async fn fetch_tickers(&self) -> Result<Vec<VenueTicker>> {
            Ok(vec![VenueTicker {
                symbol: "XYZ/USDT".into(),
                last: self.price,
                quote_volume: 1e7,
            }])
        }

        async fn fetch_funding_rates(&self) -> Result<Vec<VenueFundingRate>> {
            self.funding_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![VenueFundingRate {
                symbol: "XYZ/USDT:USDT".into(),
                funding_rate: self.rate,
                quote_volume: Some(1e7),
            }])
        }
    }

    struct NoPrices;

    #[async_trait]
    impl NativePriceSource for NoPrices {
        async fn native_prices_usd(&self, _: &[Chain]) -> Result<HashMap<Chain, f64>> {
            Err(AppError::Other("offline".into()))
        }
    }

    struct PanickingDex;

    #[async_trait]
    impl DexPriceSource for PanickingDex {
        async fn quote(&self, _: &str) -> Result<DexQuote> {
            panic!("router exploded");
        }
    }

    #[derive(Default)]
    struct Inbox {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Inbox {
        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        scheduler: Scheduler,
        inbox: Arc<Inbox>,
        venues: Vec<Arc<Venue>>,
        runtime: RuntimeHandle,
    }

    fn harness() -> Harness {
        let venues = vec![
            Arc::new(Venue {
                name: "bybit",
                price: 100.0,
                rate: -0.001,
                funding_calls: AtomicUsize::new(0),
            }),
            Arc::new(Venue {
                name: "mexc",
                price: 104.0,
                rate: 0.001,
                funding_calls: AtomicUsize::new(0),
            }),
        ];
        let aggregator = MarketAggregator::new(
            venues.iter().map(|v| v.clone() as Arc<dyn VenueAdapter>).collect(),
            AggregatorConfig {
                settlement_asset: "USDT".into(),
                min_funding_entries: 1,
                call_timeout: Duration::from_secs(5),
            },
        );
        let gas = GasOracle::new(
            GasConfig {
                ttl: Duration::from_secs(3600),
                swap_gas_units: 200_000,
                gas_multiplier: 1.0,
                fallbacks: HashMap::from([(
                    Chain::Eth,
                    GasFallback {
                        gas_price_gwei: 30.0,
                        native_price_usd: 4000.0,
                    },
                )]),
                call_timeout: Duration::from_secs(1),
            },
            Arc::new(NoPrices),
            None,
        );
        let inbox = Arc::new(Inbox::default());
        let dedup = AlertDeduplicator::new(
            DedupConfig {
                window: Duration::from_secs(1800),
                max_entries: 100,
                target_entries: 50,
                send_timeout: Duration::from_secs(5),
            },
            inbox.clone(),
        );
        let runtime = RuntimeHandle::new(RuntimeConfig {
            capital_usd: 1000.0,
            venues: BTreeMap::from([("bybit".to_string(), true), ("mexc".to_string(), true)]),
        });
        let scheduler = Scheduler::new(
            SchedulerConfig {
                tick_interval: Duration::from_secs(300),
                funding_interval: Duration::from_secs(600),
                settlement_asset: "USDT".into(),
            },
            Arc::new(aggregator),
            Arc::new(gas),
            Arc::new(PanickingDex),
            Arc::new(dedup),
            runtime.clone(),
            Arc::new(crate::arbitrage::types::fixtures::settings()),
            Arc::new(CostParameters {
                default_cex_fee_pct: 0.1,
                cex_fee_overrides: HashMap::new(),
                dex_fee_pct: 0.3,
                slippage_pct: 0.3,
            }),
        );
        Harness {
            scheduler,
            inbox,
            venues,
            runtime,
        }
    }

    #[tokio::test]
    async fn dex_panic_does_not_stop_other_scanners() {
        let h = harness();
        let report = h.scheduler.tick(Instant::now()).await;
        assert_eq!(report.venues, 2);
        assert!(report.funding_refreshed);
        assert_eq!(report.dex, None);
        assert_eq!(report.spot, Some(ScanOutcome { found: 1, delivered: 1 }));
        assert_eq!(report.funding, Some(ScanOutcome { found: 1, delivered: 1 }));
        assert_eq!(h.inbox.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn funding_follows_its_own_interval() {
        let h = harness();
        let t0 = Instant::now();
        h.scheduler.tick(t0).await;
        let second = h.scheduler.tick(t0 + Duration::from_secs(300)).await;
        assert!(!second.funding_refreshed);
        // cached funding is rescanned; the repeat is deduplicated
        assert_eq!(second.funding, Some(ScanOutcome { found: 1, delivered: 0 }));
        assert_eq!(h.venues[0].funding_calls.load(Ordering::SeqCst), 1);

        let third = h.scheduler.tick(t0 + Duration::from_secs(600)).await;
        assert!(third.funding_refreshed);
        assert_eq!(h.venues[0].funding_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn runtime_changes_apply_from_next_tick() {
        let h = harness();
        h.runtime.disable_venue("mexc").expect("known");
        let report = h.scheduler.tick(Instant::now()).await;
        assert_eq!(report.venues, 1);
        assert_eq!(report.spot, Some(ScanOutcome::default()));
        assert_eq!(h.venues[1].funding_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness();
        let scheduler = Arc::new(h.scheduler);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(rx));
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("stops in time")
            .expect("no panic");
    }
}
