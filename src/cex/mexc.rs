use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::cex::rest::get_json;
use crate::cex::{
    FundingSupport, VenueAdapter, VenueFundingRate, VenueTicker, lenient_f64, normalize_perp_symbol,
    normalize_symbol,
};
use crate::errors::{AppError, Result};

const MEXC_SPOT_ENDPOINT: &str = "https://api.mexc.com";
const MEXC_CONTRACT_ENDPOINT: &str = "https://contract.mexc.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpotRow {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ContractEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Vec<ContractRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractRow {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    funding_rate: Option<f64>,
    /// 24h turnover in the settlement asset.
    #[serde(default, deserialize_with = "lenient_f64")]
    amount24: Option<f64>,
}

/// MEXC spot v3 and contract v1 public market data.
pub struct Mexc {
    http: Client,
    spot_url: String,
    contract_url: String,
}

impl Mexc {
    pub fn new(http: Client) -> Self {
        Self::with_base_urls(http, MEXC_SPOT_ENDPOINT, MEXC_CONTRACT_ENDPOINT)
    }

    pub fn with_base_urls(http: Client, spot_url: &str, contract_url: &str) -> Self {
        Self {
            http,
            spot_url: spot_url.trim_end_matches('/').to_string(),
            contract_url: contract_url.trim_end_matches('/').to_string(),
        }
    }
}

fn spot_tickers(rows: Vec<SpotRow>) -> Vec<VenueTicker> {
    rows.into_iter()
        .filter_map(|row| {
            Some(VenueTicker {
                symbol: normalize_symbol(&row.symbol)?,
                last: row.last_price?,
                quote_volume: row.quote_volume.unwrap_or(0.0),
            })
        })
        .collect()
}

fn funding_rates(env: ContractEnvelope) -> Result<Vec<VenueFundingRate>> {
    if !env.success {
        return Err(AppError::venue("mexc", format!("contract api code {}", env.code)));
    }
    Ok(env
        .data
        .into_iter()
        .filter_map(|row| {
            Some(VenueFundingRate {
                symbol: normalize_perp_symbol(&row.symbol)?,
                funding_rate: row.funding_rate?,
                quote_volume: row.amount24,
            })
        })
        .collect())
}

#[async_trait]
impl VenueAdapter for Mexc {
    fn name(&self) -> &str {
        "mexc"
    }

    fn funding_support(&self) -> FundingSupport {
        FundingSupport::Supported
    }

    async fn fetch_tickers(&self) -> Result<Vec<VenueTicker>> {
        let url = format!("{}/api/v3/ticker/24hr", self.spot_url);
        let rows: Vec<SpotRow> = get_json(&self.http, self.name(), &url).await?;
        Ok(spot_tickers(rows))
    }

    async fn fetch_funding_rates(&self) -> Result<Vec<VenueFundingRate>> {
        let url = format!("{}/api/v1/contract/ticker", self.contract_url);
        let env: ContractEnvelope = get_json(&self.http, self.name(), &url).await?;
        funding_rates(env)
    }
}
