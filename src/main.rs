use std::sync::Arc;

use anyhow::{Context, Result};
use spread_monitor::{
    aggregator::{AggregatorConfig, MarketAggregator},
    alerts::{AlertDeduplicator, Notifier, TelegramBot, format::startup_notice},
    cex::{self, VENUE_NAMES, VenueAdapter},
    config::AppConfig,
    control,
    dex::{
        client::{ChainEndpoint, EvmClient},
        coingecko::CoinGeckoClient,
        gas::{GasOracle, GasPriceSource},
        quote::{DexPriceSource, DexQuoter},
        tokens::TokenResolver,
    },
    models::Chain,
    runtime::{RuntimeConfig, RuntimeHandle},
    scheduler::{Scheduler, SchedulerConfig},
    utils,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_logging();

    let cfg = AppConfig::load().context("invalid configuration")?;
    info!(
        capital_usd = cfg.capital_usd,
        venues = ?cfg.enabled_venues,
        min_eff_spread = cfg.scan.min_effective_spread_pct,
        min_funding_delta = cfg.scan.min_funding_delta_pct,
        every = ?cfg.check_interval,
        "[INIT] spread-monitor starting"
    );

    let http = cex::http_client(cfg.http_timeout)?;

    // Venues ---------------------------------------------------------------
    let venues: Vec<Arc<dyn VenueAdapter>> = VENUE_NAMES
        .iter()
        .filter_map(|name| cex::build_venue(name, http.clone()))
        .collect();
    let aggregator = Arc::new(MarketAggregator::new(
        venues,
        AggregatorConfig {
            settlement_asset: cfg.settlement_asset.clone(),
            min_funding_entries: cfg.min_funding_entries,
            call_timeout: cfg.http_timeout,
        },
    ));

    // Chain access ---------------------------------------------------------
    let evm = Arc::new(EvmClient::new(
        &[
            ChainEndpoint {
                chain: Chain::Eth,
                rpc_url: cfg.eth_rpc.clone(),
                router: cfg.uniswap_router,
            },
            ChainEndpoint {
                chain: Chain::Bsc,
                rpc_url: cfg.bsc_rpc.clone(),
                router: cfg.pancake_router,
            },
        ],
        cfg.rpc_max_concurrent,
        cfg.rpc_call_spacing,
    )?);
    let coingecko = Arc::new(CoinGeckoClient::new(
        http.clone(),
        &cfg.coingecko_api,
        &cfg.coingecko_overrides,
    ));
    if let Err(e) = coingecko.load_symbol_index().await {
        warn!(error = %e, "[INIT] token catalog unavailable, using fallback ids");
    }

    let live_gas: Option<Arc<dyn GasPriceSource>> = if cfg.live_gas_price {
        Some(evm.clone() as Arc<dyn GasPriceSource>)
    } else {
        None
    };
    let gas = Arc::new(GasOracle::new(cfg.gas_config(), coingecko.clone(), live_gas));
    let tokens = Arc::new(TokenResolver::new(coingecko.clone(), evm.clone(), cfg.http_timeout));
    let quoter: Arc<dyn DexPriceSource> = Arc::new(DexQuoter::new(tokens, evm.clone(), cfg.http_timeout));

    // Alerts and control ---------------------------------------------------
    let bot = Arc::new(TelegramBot::new(http.clone(), &cfg.telegram_token, cfg.user_id));
    let dedup = Arc::new(AlertDeduplicator::new(cfg.dedup_config(), bot.clone()));
    let runtime = RuntimeHandle::new(RuntimeConfig {
        capital_usd: cfg.capital_usd,
        venues: VENUE_NAMES
            .iter()
            .map(|v| (v.to_string(), cfg.enabled_venues.iter().any(|e| e.as_str() == *v)))
            .collect(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(utils::shutdown_signal(shutdown_tx));

    let mut background = Vec::new();
    if let Some(port) = cfg.keepalive_port {
        let listener = utils::bind_keepalive(port).await?;
        background.push(tokio::spawn(utils::serve_keepalive(listener, shutdown_rx.clone())));
    }
    let poll_wait = cfg.http_timeout.as_secs().saturating_sub(5).clamp(1, 20);
    background.push(tokio::spawn(control::run_command_poller(
        bot.clone(),
        runtime.clone(),
        poll_wait,
        shutdown_rx.clone(),
    )));
    if let Some(hour) = cfg.morning_prompt_hour_utc {
        background.push(tokio::spawn(control::run_daily_reminder(
            bot.clone(),
            hour,
            shutdown_rx.clone(),
        )));
        info!(hour_utc = hour, "[INIT] daily capital reminder scheduled");
    }

    if let Err(e) = bot.send(&startup_notice(&cfg.enabled_venues)).await {
        warn!(error = %e, "[INIT] startup notice not delivered");
    }

    // Tick loop --------------------------------------------------------------
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: cfg.check_interval,
            funding_interval: cfg.funding_interval,
            settlement_asset: cfg.settlement_asset.clone(),
        },
        aggregator,
        gas,
        quoter,
        dedup,
        runtime,
        Arc::new(cfg.scan.clone()),
        Arc::new(cfg.costs.clone()),
    ));
    scheduler.run(shutdown_rx).await;

    for task in background {
        let _ = task.await;
    }
    info!("[INIT] spread-monitor stopped");
    Ok(())
}
