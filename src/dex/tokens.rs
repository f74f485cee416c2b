//! Symbol -> (address, decimals) resolution with a process-lifetime cache.
//!
//! Lookup order: static known-token table, then the external catalog for the
//! address and the token contract for decimals. Every outcome, including
//! "unresolvable", is cached and never queried again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::dex::client::OnChainRouter;
use crate::errors::Result;
use crate::models::Chain;

/// External token metadata service.
#[async_trait]
pub trait TokenCatalog: Send + Sync {
    /// Catalog identifier for a ticker; overrides and fallbacks applied.
    fn catalog_id(&self, symbol: &str) -> String;

    /// Contract address of `catalog_id` on `chain`, if the catalog lists one.
    async fn platform_address(&self, catalog_id: &str, chain: Chain) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedToken {
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenResolution {
    Resolved(ResolvedToken),
    Unresolvable,
}

impl TokenResolution {
    pub fn token(&self) -> Option<ResolvedToken> {
        match self {
            TokenResolution::Resolved(t) => Some(*t),
            TokenResolution::Unresolvable => None,
        }
    }
}

const DEFAULT_DECIMALS: u8 = 18;

/// Major stable and wrapped assets: (symbol, chain, address, decimals).
const KNOWN_TOKENS: &[(&str, Chain, &str, u8)] = &[
    ("WETH", Chain::Eth, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18),
    ("USDT", Chain::Eth, "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
    ("USDC", Chain::Eth, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
    ("WBNB", Chain::Bsc, "0xBB4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c", 18),
    ("BUSD", Chain::Bsc, "0xe9e7CEA3DedcA5984780Bafc599bD69ADd087D56", 18),
    ("USDT", Chain::Bsc, "0x55d398326f99059fF775485246999027B3197955", 18),
];

fn known_tokens() -> HashMap<(String, Chain), ResolvedToken> {
    KNOWN_TOKENS
        .iter()
        .filter_map(|(sym, chain, addr, decimals)| {
            let address: Address = addr.parse().ok()?;
            Some((
                (sym.to_string(), *chain),
                ResolvedToken {
                    address,
                    decimals: *decimals,
                },
            ))
        })
        .collect()
}

pub struct TokenResolver {
    known: HashMap<(String, Chain), ResolvedToken>,
    catalog: Arc<dyn TokenCatalog>,
    chain_reader: Arc<dyn OnChainRouter>,
    call_timeout: Duration,
    cache: Mutex<HashMap<(String, Chain), Arc<OnceCell<TokenResolution>>>>,
}

impl TokenResolver {
    pub fn new(
        catalog: Arc<dyn TokenCatalog>,
        chain_reader: Arc<dyn OnChainRouter>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            known: known_tokens(),
            catalog,
            chain_reader,
            call_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, symbol: &str, chain: Chain) -> TokenResolution {
        let key = (symbol.to_uppercase(), chain);
        if let Some(known) = self.known.get(&key) {
            return TokenResolution::Resolved(*known);
        }
        let cell = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        // concurrent callers for the same key wait on the first lookup
        *cell.get_or_init(|| self.lookup(&key.0, chain)).await
    }

    /// Number of settled cache entries (static table excluded).
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    async fn lookup(&self, symbol: &str, chain: Chain) -> TokenResolution {
        let coin_id = self.catalog.catalog_id(symbol);
        let addr = match tokio::time::timeout(
            self.call_timeout,
            self.catalog.platform_address(&coin_id, chain),
        )
        .await
        {
            Ok(Ok(Some(addr))) => addr,
            Ok(Ok(None)) => {
                debug!(symbol, %chain, coin_id, "[TOKENS] no address on chain");
                return TokenResolution::Unresolvable;
            }
            Ok(Err(e)) => {
                debug!(symbol, %chain, error = %e, "[TOKENS] metadata lookup failed");
                return TokenResolution::Unresolvable;
            }
            Err(_) => {
                debug!(symbol, %chain, "[TOKENS] metadata lookup timed out");
                return TokenResolution::Unresolvable;
            }
        };
        let Ok(address) = addr.parse::<Address>() else {
            debug!(symbol, %chain, addr, "[TOKENS] malformed address");
            return TokenResolution::Unresolvable;
        };

        let decimals = match tokio::time::timeout(
            self.call_timeout,
            self.chain_reader.token_decimals(chain, address),
        )
        .await
        {
            Ok(Ok(d)) => d,
            _ => DEFAULT_DECIMALS,
        };
        info!(symbol, %chain, ?address, decimals, "[TOKENS] resolved");
        TokenResolution::Resolved(ResolvedToken { address, decimals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCatalog {
        lookups: AtomicUsize,
        addresses: HashMap<String, String>,
    }

    #[async_trait]
    impl TokenCatalog for FakeCatalog {
        fn catalog_id(&self, symbol: &str) -> String {
            symbol.to_lowercase()
        }

        async fn platform_address(&self, id: &str, _chain: Chain) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.addresses.get(id).cloned())
        }
    }

    struct FakeChain {
        decimals: Option<u8>,
    }

    #[async_trait]
    impl OnChainRouter for FakeChain {
        async fn get_amounts_out(&self, _: Chain, _: U256, _: Vec<Address>) -> Result<Vec<U256>> {
            Err(AppError::Other("unused".into()))
        }

        async fn token_decimals(&self, _: Chain, _: Address) -> Result<u8> {
            self.decimals.ok_or_else(|| AppError::Other("revert".into()))
        }
    }

    fn resolver(catalog: Arc<FakeCatalog>, decimals: Option<u8>) -> TokenResolver {
        TokenResolver::new(catalog, Arc::new(FakeChain { decimals }), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn static_table_short_circuits() {
        let catalog = Arc::new(FakeCatalog::default());
        let r = resolver(catalog.clone(), Some(9));
        let usdt = r.resolve("usdt", Chain::Bsc).await.token().expect("known");
        assert_eq!(usdt.decimals, 18);
        let usdt_eth = r.resolve("USDT", Chain::Eth).await.token().expect("known");
        assert_eq!(usdt_eth.decimals, 6);
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolvable_is_never_requeried() {
        let catalog = Arc::new(FakeCatalog::default());
        let r = resolver(catalog.clone(), Some(9));
        assert_eq!(r.resolve("NOPE", Chain::Eth).await, TokenResolution::Unresolvable);
        assert_eq!(r.resolve("NOPE", Chain::Eth).await, TokenResolution::Unresolvable);
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(r.cached_len(), 1);
    }

    #[tokio::test]
    async fn decimals_default_to_18_when_unreadable() {
        let catalog = Arc::new(FakeCatalog {
            lookups: AtomicUsize::new(0),
            addresses: HashMap::from([(
                "pepe".to_string(),
                "0x6982508145454Ce325dDbE47a25d4ec3d2311933".to_string(),
            )]),
        });
        let r = resolver(catalog.clone(), None);
        let pepe = r.resolve("PEPE", Chain::Eth).await.token().expect("resolved");
        assert_eq!(pepe.decimals, 18);
        r.resolve("PEPE", Chain::Eth).await;
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_lookup() {
        let catalog = Arc::new(FakeCatalog {
            lookups: AtomicUsize::new(0),
            addresses: HashMap::from([(
                "foo".to_string(),
                "0x514910771AF9Ca656af840dff83E8264EcF986CA".to_string(),
            )]),
        });
        let r = resolver(catalog.clone(), Some(18));
        let (a, b) = tokio::join!(r.resolve("FOO", Chain::Eth), r.resolve("foo", Chain::Eth));
        assert_eq!(a, b);
        assert!(a.token().is_some());
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(r.cached_len(), 1);
    }

    #[tokio::test]
    async fn cache_is_per_chain() {
        let catalog = Arc::new(FakeCatalog {
            lookups: AtomicUsize::new(0),
            addresses: HashMap::from([(
                "link".to_string(),
                "0x514910771AF9Ca656af840dff83E8264EcF986CA".to_string(),
            )]),
        });
        let r = resolver(catalog.clone(), Some(18));
        assert!(r.resolve("LINK", Chain::Eth).await.token().is_some());
        assert!(r.resolve("LINK", Chain::Bsc).await.token().is_some());
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
    }
}
