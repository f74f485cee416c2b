//! Centralized exchange adapters.
//!
//! Responsibilities:
//! • Fetch public spot tickers and perpetual funding rates over REST.
//! • Normalise venue symbols to `BASE/QUOTE` (spot) and `BASE/QUOTE:QUOTE` (perps).
//! • Report failures as typed errors instead of panicking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::errors::Result;

pub mod bitget;
pub mod bybit;
pub mod mexc;
pub mod rest;

pub use bitget::Bitget;
pub use bybit::Bybit;
pub use mexc::Mexc;

/// Quote assets recognised when splitting concatenated venue symbols.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH"];

/// Whether a venue can serve funding rates at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingSupport {
    Supported,
    Unsupported,
}

/// Raw spot ticker as returned by a venue, symbol already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueTicker {
    pub symbol: String,
    pub last: f64,
    pub quote_volume: f64,
}

/// Raw funding rate as returned by a venue, symbol already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueFundingRate {
    pub symbol: String,
    pub funding_rate: f64,
    pub quote_volume: Option<f64>,
}

#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Lower-case identifier used in config, commands and alerts.
    fn name(&self) -> &str;

    fn funding_support(&self) -> FundingSupport;

    async fn fetch_tickers(&self) -> Result<Vec<VenueTicker>>;

    /// Only called when [`VenueAdapter::funding_support`] is `Supported`.
    async fn fetch_funding_rates(&self) -> Result<Vec<VenueFundingRate>>;
}

/// Known venue names, in the order they are built.
pub const VENUE_NAMES: &[&str] = &["bybit", "mexc", "bitget"];

/// Builds the adapter for a known venue name.
pub fn build_venue(name: &str, http: reqwest::Client) -> Option<Arc<dyn VenueAdapter>> {
    match name {
        "bybit" => Some(Arc::new(Bybit::new(http))),
        "mexc" => Some(Arc::new(Mexc::new(http))),
        "bitget" => Some(Arc::new(Bitget::new(http))),
        _ => None,
    }
}

/// Shared client for venue calls; every request carries `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("spread-monitor/0.1")
        .build()?)
}

/// Splits `BTCUSDT`, `BTC_USDT` or `BTC-USDT` into `BTC/USDT`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '/'))
        .collect::<String>()
        .to_uppercase();
    KNOWN_QUOTES.iter().find_map(|quote| {
        let base = cleaned.strip_suffix(quote)?;
        (!base.is_empty()).then(|| format!("{base}/{quote}"))
    })
}

/// Linear perpetual symbol settled in its quote asset.
pub fn normalize_perp_symbol(raw: &str) -> Option<String> {
    let pair = normalize_symbol(raw)?;
    let quote = pair.split_once('/')?.1.to_string();
    Some(format!("{pair}:{quote}"))
}

/// Accepts JSON numbers, numeric strings, empty strings and nulls.
pub(crate) fn lenient_f64<'de, D>(d: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite()))
}
