//! Configuration loader and application settings.

use std::collections::HashMap;
use std::time::Duration;

use ethers::types::Address;
use url::Url;

use crate::alerts::dedup::DedupConfig;
use crate::arbitrage::cost::CostParameters;
use crate::arbitrage::types::ScanSettings;
use crate::cex::VENUE_NAMES;
use crate::dex::gas::{GasConfig, GasFallback};
use crate::errors::{AppError, Result};
use crate::models::Chain;

const DEFAULT_ETH_RPC: &str = "https://eth.llamarpc.com";
const DEFAULT_BSC_RPC: &str = "https://bsc-dataseed.binance.org";
const DEFAULT_UNISWAP_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
const DEFAULT_PANCAKE_ROUTER: &str = "0x10ED43C718714eb63d5aA57B78B54704E256024E";
const DEFAULT_COINGECKO_API: &str = "https://api.coingecko.com/api/v3";

/// Per-venue taker fee defaults, in percent.
const DEFAULT_VENUE_FEES: &[(&str, f64)] = &[("bybit", 0.055), ("mexc", 0.2), ("bitget", 0.1)];

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    /// Operator chat; the only chat alerts go to and commands come from.
    pub user_id: i64,
    pub capital_usd: f64,
    /// Venues enabled at startup, lower-case.
    pub enabled_venues: Vec<String>,
    pub scan: ScanSettings,
    pub costs: CostParameters,
    pub check_interval: Duration,
    pub funding_interval: Duration,
    pub min_funding_entries: usize,
    pub settlement_asset: String,
    pub eth_rpc: String,
    pub bsc_rpc: String,
    pub uniswap_router: Address,
    pub pancake_router: Address,
    pub gas_ttl: Duration,
    pub gas_units_swap: u64,
    pub gas_multiplier: f64,
    pub gas_fallbacks: HashMap<Chain, GasFallback>,
    /// Read gas prices from RPC instead of the configured fallbacks.
    pub live_gas_price: bool,
    pub coingecko_api: String,
    pub coingecko_overrides: HashMap<String, String>,
    pub rpc_max_concurrent: usize,
    pub rpc_call_spacing: Duration,
    /// Applied to every external call.
    pub http_timeout: Duration,
    pub dedup_window: Duration,
    pub dedup_max_entries: usize,
    pub dedup_target_entries: usize,
    /// `None` disables the daily reminder.
    pub morning_prompt_hour_utc: Option<u32>,
    pub keepalive_port: Option<u16>,
}

/// Typed access over a key lookup.
struct Source<F: Fn(&str) -> Option<String>> {
    get: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.get)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.raw(key)
            .ok_or_else(|| AppError::Config(format!("{key} must be set")))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| AppError::Config(format!("{key}: cannot parse {v:?}"))),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.raw(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => Err(AppError::Config(format!("{key}: not a boolean {v:?}"))),
        }
    }

    fn secs_or(&self, key: &str, default: u64) -> Result<Duration> {
        Ok(Duration::from_secs(self.parsed_or(key, default)?))
    }

    fn url_or(&self, key: &str, default: &str) -> Result<String> {
        let raw = self.string_or(key, default);
        Url::parse(&raw).map_err(|e| AppError::Config(format!("{key}: {e}")))?;
        Ok(raw)
    }

    fn address_or(&self, key: &str, default: &str) -> Result<Address> {
        let raw = self.string_or(key, default);
        raw.parse()
            .map_err(|_| AppError::Config(format!("{key}: invalid address {raw:?}")))
    }
}

/// `TRUMP=maga,FOO=bar` -> {TRUMP: maga, FOO: bar}
fn parse_overrides(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_uppercase(), v.trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("COINGECKO_IDS_OVERRIDE: bad entry {pair:?}")))
        })
        .collect()
}

fn parse_venues(raw: &str) -> Result<Vec<String>> {
    let mut venues = Vec::new();
    for name in raw.split(',').map(|s| s.trim().to_lowercase()) {
        if name.is_empty() {
            continue;
        }
        if !VENUE_NAMES.contains(&name.as_str()) {
            return Err(AppError::Config(format!("ENABLED_VENUES: unknown venue {name:?}")));
        }
        if !venues.contains(&name) {
            venues.push(name);
        }
    }
    Ok(venues)
}

fn parse_hour(raw: Option<String>) -> Result<Option<u32>> {
    match raw {
        None => Ok(Some(8)),
        Some(v) if v.eq_ignore_ascii_case("off") => Ok(None),
        Some(v) => match v.parse::<u32>() {
            Ok(h) if h < 24 => Ok(Some(h)),
            _ => Err(AppError::Config(format!("MORNING_PROMPT_HOUR_UTC: expected 0-23 or off, got {v:?}"))),
        },
    }
}

impl AppConfig {
    /// Loads from the process environment, reading `.env` first.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from any key lookup.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self> {
        let env = Source { get };

        let telegram_token = env.required("TELEGRAM_TOKEN")?;
        let user_id = env
            .required("USER_ID")?
            .parse()
            .map_err(|_| AppError::Config("USER_ID must be a numeric chat id".into()))?;

        let mut cex_fee_overrides = HashMap::new();
        for (venue, default) in DEFAULT_VENUE_FEES {
            let key = format!("CEX_FEE_{}_PCT", venue.to_uppercase());
            cex_fee_overrides.insert(venue.to_string(), env.parsed_or(&key, *default)?);
        }

        let gas_fallbacks = HashMap::from([
            (
                Chain::Eth,
                GasFallback {
                    gas_price_gwei: env.parsed_or("ETH_GWEI_FALLBACK", 30.0)?,
                    native_price_usd: env.parsed_or("ETH_PRICE_FALLBACK", 4619.0)?,
                },
            ),
            (
                Chain::Bsc,
                GasFallback {
                    gas_price_gwei: env.parsed_or("BNB_GWEI_FALLBACK", 5.0)?,
                    native_price_usd: env.parsed_or("BNB_PRICE_FALLBACK", 550.0)?,
                },
            ),
        ]);

        let cfg = Self {
            telegram_token,
            user_id,
            capital_usd: env.parsed_or("MY_CAPITAL_USD", 50.0)?,
            enabled_venues: parse_venues(&env.string_or("ENABLED_VENUES", &VENUE_NAMES.join(",")))?,
            scan: ScanSettings {
                min_effective_spread_pct: env.parsed_or("MIN_EFF_SPREAD_PERCENT", 2.0)?,
                min_funding_delta_pct: env.parsed_or("MIN_FUNDING_DELTA_PERCENT", 0.05)?,
                min_volume_24h: env.parsed_or("MIN_VOLUME_24H", 500_000.0)?,
                min_profit_usd: env.parsed_or("MIN_PROFIT_USD", 0.5)?,
                dex_candidate_limit: env.parsed_or("DEX_CANDIDATE_LIMIT", 50)?,
                dex_concurrency: env.parsed_or("DEX_CONCURRENCY", 8)?,
            },
            costs: CostParameters {
                default_cex_fee_pct: env.parsed_or("CEX_FEE_DEFAULT_PCT", 0.1)?,
                cex_fee_overrides,
                dex_fee_pct: env.parsed_or("DEX_FEE_PCT", 0.3)?,
                slippage_pct: env.parsed_or("EST_SLIPPAGE_PCT", 0.3)?,
            },
            check_interval: env.secs_or("CHECK_INTERVAL_SECONDS", 300)?,
            funding_interval: env.secs_or("FUNDING_CHECK_INTERVAL", 300)?,
            min_funding_entries: env.parsed_or("MIN_FUNDING_ENTRIES", 10)?,
            settlement_asset: env.string_or("SETTLEMENT_ASSET", "USDT").to_uppercase(),
            eth_rpc: env.url_or("ETH_RPC", DEFAULT_ETH_RPC)?,
            bsc_rpc: env.url_or("BSC_RPC", DEFAULT_BSC_RPC)?,
            uniswap_router: env.address_or("UNISWAP_ROUTER", DEFAULT_UNISWAP_ROUTER)?,
            pancake_router: env.address_or("PANCAKE_ROUTER", DEFAULT_PANCAKE_ROUTER)?,
            gas_ttl: env.secs_or("GAS_UPDATE_INTERVAL", 3600)?,
            gas_units_swap: env.parsed_or("GAS_UNITS_SWAP", 200_000)?,
            gas_multiplier: env.parsed_or("GAS_MULTIPLIER", 1.0)?,
            gas_fallbacks,
            live_gas_price: env.bool_or("LIVE_GAS_PRICE", false)?,
            coingecko_api: env.url_or("COINGECKO_API", DEFAULT_COINGECKO_API)?,
            coingecko_overrides: parse_overrides(&env.string_or("COINGECKO_IDS_OVERRIDE", "TRUMP=maga"))?,
            rpc_max_concurrent: env.parsed_or("RPC_MAX_CONCURRENT", 4)?,
            rpc_call_spacing: Duration::from_millis(env.parsed_or("RPC_CALL_SPACING_MS", 60)?),
            http_timeout: env.secs_or("HTTP_TIMEOUT_SECONDS", 30)?,
            dedup_window: env.secs_or("DEDUP_WINDOW_SECONDS", 1800)?,
            dedup_max_entries: env.parsed_or("DEDUP_MAX_ENTRIES", 5000)?,
            dedup_target_entries: env.parsed_or("DEDUP_TARGET_ENTRIES", 4000)?,
            morning_prompt_hour_utc: parse_hour(env.raw("MORNING_PROMPT_HOUR_UTC"))?,
            keepalive_port: env
                .raw("KEEPALIVE_PORT")
                .map(|v| {
                    v.parse()
                        .map_err(|_| AppError::Config(format!("KEEPALIVE_PORT: invalid port {v:?}")))
                })
                .transpose()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects settings that would make the cost model or scheduler misbehave.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("MY_CAPITAL_USD", self.capital_usd),
            ("MIN_EFF_SPREAD_PERCENT", self.scan.min_effective_spread_pct),
            ("MIN_FUNDING_DELTA_PERCENT", self.scan.min_funding_delta_pct),
            ("MIN_VOLUME_24H", self.scan.min_volume_24h),
            ("MIN_PROFIT_USD", self.scan.min_profit_usd),
            ("CEX_FEE_DEFAULT_PCT", self.costs.default_cex_fee_pct),
            ("DEX_FEE_PCT", self.costs.dex_fee_pct),
            ("EST_SLIPPAGE_PCT", self.costs.slippage_pct),
            ("GAS_MULTIPLIER", self.gas_multiplier),
        ];
        for (key, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(AppError::Config(format!("{key} must be a non-negative number, got {v}")));
            }
        }
        for (venue, fee) in &self.costs.cex_fee_overrides {
            if !fee.is_finite() || *fee < 0.0 {
                return Err(AppError::Config(format!("fee for {venue} must be non-negative, got {fee}")));
            }
        }
        for (chain, fb) in &self.gas_fallbacks {
            if !(fb.gas_price_gwei.is_finite() && fb.gas_price_gwei >= 0.0)
                || !(fb.native_price_usd.is_finite() && fb.native_price_usd >= 0.0)
            {
                return Err(AppError::Config(format!("gas fallbacks for {chain} must be non-negative")));
            }
        }
        if self.enabled_venues.is_empty() {
            return Err(AppError::Config("ENABLED_VENUES must name at least one known venue".into()));
        }
        if self.dedup_target_entries >= self.dedup_max_entries {
            return Err(AppError::Config(
                "DEDUP_TARGET_ENTRIES must be below DEDUP_MAX_ENTRIES".into(),
            ));
        }
        if self.check_interval.is_zero() || self.funding_interval.is_zero() {
            return Err(AppError::Config("check intervals must be positive".into()));
        }
        if self.scan.dex_concurrency == 0 || self.rpc_max_concurrent == 0 {
            return Err(AppError::Config("DEX_CONCURRENCY and RPC_MAX_CONCURRENT must be positive".into()));
        }
        Ok(())
    }

    pub fn gas_config(&self) -> GasConfig {
        GasConfig {
            ttl: self.gas_ttl,
            swap_gas_units: self.gas_units_swap,
            gas_multiplier: self.gas_multiplier,
            fallbacks: self.gas_fallbacks.clone(),
            call_timeout: self.http_timeout,
        }
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            window: self.dedup_window,
            max_entries: self.dedup_max_entries,
            target_entries: self.dedup_target_entries,
            send_timeout: self.http_timeout,
        }
    }
}
