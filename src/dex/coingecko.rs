//! CoinGecko client: token catalog for address lookups and native prices for gas.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dex::gas::NativePriceSource;
use crate::dex::tokens::TokenCatalog;
use crate::errors::{AppError, Result};
use crate::models::Chain;

#[derive(Debug, Deserialize)]
struct CoinListEntry {
    id: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct CoinDetail {
    #[serde(default)]
    platforms: HashMap<String, Option<String>>,
}

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    overrides: HashMap<String, String>,
    symbol_index: RwLock<HashMap<String, String>>,
}

impl CoinGeckoClient {
    /// `overrides` maps ticker (any case) to catalog id.
    pub fn new(http: Client, base_url: &str, overrides: &HashMap<String, String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            overrides: overrides
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            symbol_index: RwLock::new(HashMap::new()),
        }
    }

    /// Loads `coins/list` into the symbol index. The first id listed for a
    /// symbol wins. Failure leaves the index empty; lookups then fall back to
    /// overrides and lower-cased tickers.
    pub async fn load_symbol_index(&self) -> Result<usize> {
        let url = format!("{}/coins/list", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "[TOKENS] coin list fetch failed");
            return Err(AppError::Other(format!("coins/list returned {}", resp.status())));
        }
        let entries: Vec<CoinListEntry> = resp.json().await?;
        let index = build_symbol_index(entries);
        let count = index.len();
        *self
            .symbol_index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = index;
        info!(symbols = count, "[TOKENS] coin list loaded");
        Ok(count)
    }
}

fn build_symbol_index(entries: Vec<CoinListEntry>) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(entries.len());
    for entry in entries {
        let sym = entry.symbol.to_lowercase();
        if !sym.is_empty() {
            index.entry(sym).or_insert(entry.id);
        }
    }
    index
}

#[async_trait]
impl TokenCatalog for CoinGeckoClient {
    fn catalog_id(&self, symbol: &str) -> String {
        let key = symbol.to_lowercase();
        if let Some(id) = self.overrides.get(&key) {
            return id.clone();
        }
        let index = self
            .symbol_index
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        index.get(&key).cloned().unwrap_or(key)
    }

    async fn platform_address(&self, catalog_id: &str, chain: Chain) -> Result<Option<String>> {
        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&market_data=false&community_data=false&developer_data=false",
            self.base_url, catalog_id
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let detail: CoinDetail = resp.json().await?;
        Ok(detail
            .platforms
            .get(chain.platform_id())
            .cloned()
            .flatten()
            .filter(|a| !a.is_empty()))
    }
}

#[async_trait]
impl NativePriceSource for CoinGeckoClient {
    async fn native_prices_usd(&self, chains: &[Chain]) -> Result<HashMap<Chain, f64>> {
        let ids: Vec<&str> = chains.iter().map(|c| c.native_coin_id()).collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url,
            ids.join(",")
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Other(format!("simple/price returned {}", resp.status())));
        }
        let body: HashMap<String, HashMap<String, f64>> = resp.json().await?;
        Ok(parse_native_prices(&body, chains))
    }
}

fn parse_native_prices(
    body: &HashMap<String, HashMap<String, f64>>,
    chains: &[Chain],
) -> HashMap<Chain, f64> {
    chains
        .iter()
        .filter_map(|chain| {
            let usd = body.get(chain.native_coin_id())?.get("usd")?;
            Some((*chain, *usd))
        })
        .collect()
}
