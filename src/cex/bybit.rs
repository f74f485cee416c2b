use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::cex::rest::get_json;
use crate::cex::{
    FundingSupport, VenueAdapter, VenueFundingRate, VenueTicker, lenient_f64, normalize_perp_symbol,
    normalize_symbol,
};
use crate::errors::{AppError, Result};

const BYBIT_REST_ENDPOINT: &str = "https://api.bybit.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<TickerList>,
}

#[derive(Debug, Deserialize)]
struct TickerList {
    #[serde(default)]
    list: Vec<TickerRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRow {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, rename = "turnover24h", deserialize_with = "lenient_f64")]
    turnover_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    funding_rate: Option<f64>,
}

/// Bybit v5 public market data.
pub struct Bybit {
    http: Client,
    base_url: String,
}

impl Bybit {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, BYBIT_REST_ENDPOINT)
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn tickers(&self, category: &str) -> Result<Vec<TickerRow>> {
        let url = format!("{}/v5/market/tickers?category={category}", self.base_url);
        let env: Envelope = get_json(&self.http, self.name(), &url).await?;
        unwrap_envelope(env)
    }
}

fn unwrap_envelope(env: Envelope) -> Result<Vec<TickerRow>> {
    if env.ret_code != 0 {
        return Err(AppError::venue(
            "bybit",
            format!("retCode {}: {}", env.ret_code, env.ret_msg),
        ));
    }
    Ok(env.result.map(|r| r.list).unwrap_or_default())
}

fn spot_tickers(rows: Vec<TickerRow>) -> Vec<VenueTicker> {
    rows.into_iter()
        .filter_map(|row| {
            Some(VenueTicker {
                symbol: normalize_symbol(&row.symbol)?,
                last: row.last_price?,
                quote_volume: row.turnover_24h.unwrap_or(0.0),
            })
        })
        .collect()
}

fn funding_rates(rows: Vec<TickerRow>) -> Vec<VenueFundingRate> {
    rows.into_iter()
        .filter_map(|row| {
            Some(VenueFundingRate {
                symbol: normalize_perp_symbol(&row.symbol)?,
                funding_rate: row.funding_rate?,
                quote_volume: row.turnover_24h,
            })
        })
        .collect()
}

#[async_trait]
impl VenueAdapter for Bybit {
    fn name(&self) -> &str {
        "bybit"
    }

    fn funding_support(&self) -> FundingSupport {
        FundingSupport::Supported
    }

    async fn fetch_tickers(&self) -> Result<Vec<VenueTicker>> {
        Ok(spot_tickers(self.tickers("spot").await?))
    }

    async fn fetch_funding_rates(&self) -> Result<Vec<VenueFundingRate>> {
        Ok(funding_rates(self.tickers("linear").await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spot_and_linear_rows() {
        let raw = r#"{
            "retCode": 0, "retMsg": "OK",
            "result": {"category": "linear", "list": [
                {"symbol": "BTCUSDT", "lastPrice": "65000.5", "turnover24h": "123456789.1", "fundingRate": "-0.0002"},
                {"symbol": "ETHPERP", "lastPrice": "3000", "turnover24h": "1", "fundingRate": "0.0001"},
                {"symbol": "SOLUSDT", "lastPrice": "", "turnover24h": "10", "fundingRate": ""}
            ]}
        }"#;
        let env: Envelope = serde_json::from_str(raw).expect("json");
        let rows = unwrap_envelope(env).expect("ok");
        let funding = funding_rates(rows);
        assert_eq!(funding.len(), 1);
        assert_eq!(funding[0].symbol, "BTC/USDT:USDT");
        assert_eq!(funding[0].funding_rate, -0.0002);

        let env: Envelope = serde_json::from_str(raw).expect("json");
        let spot = spot_tickers(unwrap_envelope(env).expect("ok"));
        assert_eq!(spot.len(), 1);
        assert_eq!(spot[0].last, 65000.5);
    }

    #[test]
    fn non_zero_ret_code_is_unavailable() {
        let env: Envelope =
            serde_json::from_str(r#"{"retCode":10006,"retMsg":"rate limited","result":null}"#)
                .expect("json");
        assert!(matches!(
            unwrap_envelope(env),
            Err(AppError::VenueUnavailable { .. })
        ));
    }
}
