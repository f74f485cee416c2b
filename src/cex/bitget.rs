use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::cex::rest::get_json;
use crate::cex::{
    FundingSupport, VenueAdapter, VenueFundingRate, VenueTicker, lenient_f64, normalize_perp_symbol,
    normalize_symbol,
};
use crate::errors::{AppError, Result};

const BITGET_REST_ENDPOINT: &str = "https://api.bitget.com";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<TickerRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRow {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_pr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    usdt_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    funding_rate: Option<f64>,
}

impl TickerRow {
    fn volume(&self) -> Option<f64> {
        self.usdt_volume.or(self.quote_volume)
    }
}

/// Bitget v2 spot and USDT-margined futures public market data.
pub struct Bitget {
    http: Client,
    base_url: String,
}

impl Bitget {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, BITGET_REST_ENDPOINT)
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn rows(&self, path: &str) -> Result<Vec<TickerRow>> {
        let url = format!("{}{path}", self.base_url);
        let env: Envelope = get_json(&self.http, self.name(), &url).await?;
        unwrap_envelope(env)
    }
}

fn unwrap_envelope(env: Envelope) -> Result<Vec<TickerRow>> {
    if env.code != "00000" {
        return Err(AppError::venue(
            "bitget",
            format!("code {}: {}", env.code, env.msg),
        ));
    }
    Ok(env.data)
}

#[async_trait]
impl VenueAdapter for Bitget {
    fn name(&self) -> &str {
        "bitget"
    }

    fn funding_support(&self) -> FundingSupport {
        FundingSupport::Supported
    }

    async fn fetch_tickers(&self) -> Result<Vec<VenueTicker>> {
        let rows = self.rows("/api/v2/spot/market/tickers").await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(VenueTicker {
                    symbol: normalize_symbol(&row.symbol)?,
                    last: row.last_pr?,
                    quote_volume: row.volume().unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn fetch_funding_rates(&self) -> Result<Vec<VenueFundingRate>> {
        let rows = self
            .rows("/api/v2/mix/market/tickers?productType=USDT-FUTURES")
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let quote_volume = row.volume();
                Some(VenueFundingRate {
                    symbol: normalize_perp_symbol(&row.symbol)?,
                    funding_rate: row.funding_rate?,
                    quote_volume,
                })
            })
            .collect())
    }
}
