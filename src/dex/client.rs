use crate::dex::gas::GasPriceSource;
use crate::errors::{AppError, Result};
use crate::models::Chain;
use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Middleware, Provider},
    types::{Address, U256},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tracing::debug;

abigen!(
    UniswapV2Router,
    r"[
        function getAmountsOut(uint256 amountIn, address[] path) view returns (uint256[] amounts)
    ]",
);

abigen!(
    Erc20Metadata,
    r"[
        function decimals() view returns (uint8)
    ]",
);

/// Read-only view of a chain's canonical AMM router and token contracts.
#[async_trait]
pub trait OnChainRouter: Send + Sync {
    /// Simulated swap quote; the last element is the output amount.
    async fn get_amounts_out(
        &self,
        chain: Chain,
        amount_in: U256,
        path: Vec<Address>,
    ) -> Result<Vec<U256>>;

    async fn token_decimals(&self, chain: Chain, token: Address) -> Result<u8>;
}

/// Connection settings for one chain.
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub chain: Chain,
    pub rpc_url: String,
    pub router: Address,
}

/// Bounds concurrent calls to one RPC endpoint and spaces their start times.
pub struct RpcGate {
    permits: Semaphore,
    spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RpcGate {
    pub fn new(max_concurrent: usize, spacing: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent.max(1)),
            spacing,
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::Other(e.to_string()))?;
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.spacing {
                tokio::time::sleep(self.spacing - since).await;
            }
        }
        *last = Some(Instant::now());
        Ok(permit)
    }
}

struct ChainHandle {
    provider: Arc<Provider<Http>>,
    router: UniswapV2Router<Provider<Http>>,
    gate: RpcGate,
}

/// Ethers-backed [`OnChainRouter`] over HTTP providers, one per chain.
#[derive(Clone)]
pub struct EvmClient {
    chains: Arc<HashMap<Chain, ChainHandle>>,
}

impl EvmClient {
    pub fn new(endpoints: &[ChainEndpoint], max_concurrent: usize, spacing: Duration) -> Result<Self> {
        let mut chains = HashMap::new();
        for ep in endpoints {
            let provider = Arc::new(Provider::<Http>::try_from(ep.rpc_url.as_str())?);
            let router = UniswapV2Router::new(ep.router, provider.clone());
            chains.insert(
                ep.chain,
                ChainHandle {
                    provider,
                    router,
                    gate: RpcGate::new(max_concurrent, spacing),
                },
            );
        }
        Ok(Self {
            chains: Arc::new(chains),
        })
    }

    fn handle(&self, chain: Chain) -> Result<&ChainHandle> {
        self.chains
            .get(&chain)
            .ok_or_else(|| AppError::Config(format!("no RPC endpoint configured for {chain}")))
    }
}

#[async_trait]
impl OnChainRouter for EvmClient {
    async fn get_amounts_out(
        &self,
        chain: Chain,
        amount_in: U256,
        path: Vec<Address>,
    ) -> Result<Vec<U256>> {
        let handle = self.handle(chain)?;
        let _permit = handle.gate.acquire().await?;
        let amounts = handle.router.get_amounts_out(amount_in, path).call().await?;
        Ok(amounts)
    }

    async fn token_decimals(&self, chain: Chain, token: Address) -> Result<u8> {
        let handle = self.handle(chain)?;
        let _permit = handle.gate.acquire().await?;
        let erc20 = Erc20Metadata::new(token, handle.provider.clone());
        let decimals = erc20.decimals().call().await?;
        Ok(decimals)
    }
}

#[async_trait]
impl GasPriceSource for EvmClient {
    async fn gas_price_gwei(&self, chain: Chain) -> Result<f64> {
        let handle = self.handle(chain)?;
        let _permit = handle.gate.acquire().await?;
        let wei = handle.provider.get_gas_price().await?;
        let gwei = wei.as_u128() as f64 / 1_000_000_000.0;
        debug!(%chain, gwei, "[GAS] gas price read");
        Ok(gwei)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_spaces_consecutive_calls() {
        let gate = RpcGate::new(2, Duration::from_millis(30));
        let start = Instant::now();
        drop(gate.acquire().await.expect("permit"));
        drop(gate.acquire().await.expect("permit"));
        drop(gate.acquire().await.expect("permit"));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn missing_chain_is_a_config_error() {
        let client = EvmClient::new(&[], 1, Duration::ZERO).expect("empty client");
        let err = client
            .token_decimals(Chain::Bsc, Address::zero())
            .await
            .expect_err("no endpoint");
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn malformed_rpc_url_is_rejected() {
        let endpoint = ChainEndpoint {
            chain: Chain::Eth,
            rpc_url: "not a url".to_string(),
            router: Address::zero(),
        };
        let built = EvmClient::new(&[endpoint], 1, Duration::ZERO);
        assert!(matches!(built, Err(AppError::UrlParse(_))));
    }
}
