//! On-chain price discovery for a `BASE/QUOTE` symbol via the chain's router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::dex::calc::{one_unit, price_from_amounts};
use crate::dex::client::OnChainRouter;
use crate::dex::tokens::TokenResolver;
use crate::errors::{AppError, Result};
use crate::models::Chain;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DexQuote {
    pub chain: Chain,
    /// Quote-asset amount received for one base unit.
    pub price: f64,
}

/// Anything that can price a symbol on-chain.
#[async_trait]
pub trait DexPriceSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<DexQuote>;
}

/// Router-backed [`DexPriceSource`]: resolves both tokens and simulates a
/// one-unit swap base -> quote.
pub struct DexQuoter {
    tokens: Arc<TokenResolver>,
    router: Arc<dyn OnChainRouter>,
    call_timeout: Duration,
}

impl DexQuoter {
    pub fn new(tokens: Arc<TokenResolver>, router: Arc<dyn OnChainRouter>, call_timeout: Duration) -> Self {
        Self {
            tokens,
            router,
            call_timeout,
        }
    }
}

/// Router-side symbol for an asset on `chain`; native assets trade wrapped.
fn router_symbol(asset: &str, chain: Chain) -> String {
    let upper = asset.to_uppercase();
    if upper == chain.native_symbol() {
        chain.wrapped_native().to_string()
    } else {
        upper
    }
}

#[async_trait]
impl DexPriceSource for DexQuoter {
    async fn quote(&self, symbol: &str) -> Result<DexQuote> {
        let (base, quote) = symbol
            .split_once('/')
            .ok_or_else(|| AppError::Other(format!("malformed symbol {symbol}")))?;
        let chain = Chain::for_symbol(symbol);

        let base_sym = router_symbol(base, chain);
        let quote_sym = router_symbol(quote, chain);
        let unresolved = |asset: &str| AppError::ResolutionFailure {
            symbol: asset.to_string(),
            chain: chain.to_string(),
        };
        let base_tok = self
            .tokens
            .resolve(&base_sym, chain)
            .await
            .token()
            .ok_or_else(|| unresolved(&base_sym))?;
        let quote_tok = self
            .tokens
            .resolve(&quote_sym, chain)
            .await
            .token()
            .ok_or_else(|| unresolved(&quote_sym))?;

        let amount_in = one_unit(base_tok.decimals);
        let path = vec![base_tok.address, quote_tok.address];
        let amounts = match tokio::time::timeout(
            self.call_timeout,
            self.router.get_amounts_out(chain, amount_in, path),
        )
        .await
        {
            Ok(Ok(a)) => a,
            Ok(Err(e)) => {
                return Err(AppError::OnChainCall {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(AppError::OnChainCall {
                    symbol: symbol.to_string(),
                    reason: format!("router call timed out after {:?}", self.call_timeout),
                });
            }
        };

        let price = price_from_amounts(&amounts, quote_tok.decimals).ok_or_else(|| {
            AppError::OnChainCall {
                symbol: symbol.to_string(),
                reason: "empty router output".into(),
            }
        })?;
        debug!(symbol, %chain, price, "[DEX] router quote");
        Ok(DexQuote { chain, price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::tokens::TokenCatalog;
    use ethers::types::{Address, U256};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Catalog;

    #[async_trait]
    impl TokenCatalog for Catalog {
        fn catalog_id(&self, symbol: &str) -> String {
            symbol.to_lowercase()
        }

        async fn platform_address(&self, id: &str, _chain: Chain) -> Result<Option<String>> {
            let known = HashMap::from([
                ("pepe", "0x6982508145454Ce325dDbE47a25d4ec3d2311933"),
                ("cake", "0x0E09FaBB73Bd3Ade0a17ECC321fD13a19e81cE82"),
            ]);
            Ok(known.get(id).map(|s| s.to_string()))
        }
    }

    struct Router {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl OnChainRouter for Router {
        async fn get_amounts_out(&self, _: Chain, amount_in: U256, _: Vec<Address>) -> Result<Vec<U256>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Other("execution reverted".into()));
            }
            // 1 base -> 2.5 quote (6 decimals on ETH USDT)
            Ok(vec![amount_in, U256::from(2_500_000u64)])
        }

        async fn token_decimals(&self, _: Chain, _: Address) -> Result<u8> {
            Ok(18)
        }
    }

    fn quoter(fail: bool) -> (DexQuoter, Arc<Router>) {
        let router = Arc::new(Router {
            calls: AtomicUsize::new(0),
            fail,
        });
        let tokens = Arc::new(TokenResolver::new(
            Arc::new(Catalog),
            router.clone(),
            Duration::from_secs(1),
        ));
        (DexQuoter::new(tokens, router.clone(), Duration::from_secs(1)), router)
    }

    #[test]
    fn native_assets_route_through_wrapped_token() {
        assert_eq!(router_symbol("eth", Chain::Eth), "WETH");
        assert_eq!(router_symbol("BNB", Chain::Bsc), "WBNB");
        assert_eq!(router_symbol("PEPE", Chain::Eth), "PEPE");
    }

    #[tokio::test]
    async fn quotes_one_unit_swap() {
        let (q, _) = quoter(false);
        let quote = q.quote("PEPE/USDT").await.expect("quote");
        assert_eq!(quote.chain, Chain::Eth);
        assert!((quote.price - 2.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unresolvable_base_skips_router() {
        let (q, router) = quoter(false);
        let err = q.quote("NOPE/USDT").await.expect_err("unresolvable");
        assert!(matches!(err, AppError::ResolutionFailure { .. }));
        assert_eq!(router.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn router_failure_is_on_chain_error() {
        let (q, _) = quoter(true);
        let err = q.quote("PEPE/USDT").await.expect_err("reverted");
        assert!(matches!(err, AppError::OnChainCall { .. }));
    }
}
