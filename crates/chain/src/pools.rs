//! Uniswap V2 pair reads for route quoting.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use tracing::debug;

use flashliq_core::services::PoolSnapshotSource;
use flashliq_core::{Pool, PoolSnapshot};

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair};

/// Uniswap V2 swap fee.
pub const UNISWAP_V2_FEE_BPS: u16 = 30;

/// Every unordered pair of `tokens`, first occurrence wins.
pub fn token_pairs(tokens: &[Address]) -> Vec<(Address, Address)> {
    let mut unique: Vec<Address> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !unique.contains(token) {
            unique.push(*token);
        }
    }
    let mut pairs = Vec::new();
    for (i, a) in unique.iter().enumerate() {
        for b in &unique[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

/// Reads pair reserves from a Uniswap V2 factory.
///
/// Pair addresses never change once created, so lookups are cached,
/// including misses.
pub struct UniswapV2PoolReader {
    rpc_url: String,
    factory: Address,
    pairs: DashMap<(Address, Address), Option<Address>>,
}

impl UniswapV2PoolReader {
    pub fn new(rpc_url: impl Into<String>, factory: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            factory,
            pairs: DashMap::new(),
        }
    }

    fn provider(&self) -> Result<impl Provider> {
        let url = self
            .rpc_url
            .parse()
            .with_context(|| format!("invalid rpc url {}", self.rpc_url))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    async fn pair_address(&self, a: Address, b: Address) -> Result<Option<Address>> {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(cached) = self.pairs.get(&key) {
            return Ok(*cached);
        }

        let provider = self.provider()?;
        let factory = IUniswapV2Factory::new(self.factory, &provider);
        let pair = factory
            .getPair(key.0, key.1)
            .call()
            .await
            .with_context(|| format!("getPair({}, {})", key.0, key.1))?
            .pair;
        let pair = (!pair.is_zero()).then_some(pair);
        self.pairs.insert(key, pair);
        Ok(pair)
    }

    /// Current reserves of the pair for `a`/`b`, if it exists.
    pub async fn pool(&self, a: Address, b: Address) -> Result<Option<Pool>> {
        let Some(pair) = self.pair_address(a, b).await? else {
            return Ok(None);
        };

        let provider = self.provider()?;
        let contract = IUniswapV2Pair::new(pair, &provider);
        let token0_call = contract.token0();
        let reserves_call = contract.getReserves();
        let (token0, reserves) = futures::try_join!(
            std::future::IntoFuture::into_future(token0_call.call()),
            std::future::IntoFuture::into_future(reserves_call.call())
        )
            .with_context(|| format!("reserves of pair {pair}"))?;

        let token0 = token0._0;
        let token1 = if token0 == a { b } else { a };
        let reserve0 = U256::from(reserves.reserve0.to::<u128>());
        let reserve1 = U256::from(reserves.reserve1.to::<u128>());

        let mut pool = Pool::constant_product(pair, token0, token1, reserve0, reserve1);
        pool.fee_bps = UNISWAP_V2_FEE_BPS;
        Ok(Some(pool))
    }
}

#[async_trait]
impl PoolSnapshotSource for UniswapV2PoolReader {
    async fn snapshot(
        &self,
        input: Address,
        output: Address,
        hubs: &[Address],
    ) -> Result<PoolSnapshot> {
        let mut tokens = Vec::with_capacity(hubs.len() + 2);
        tokens.push(input);
        tokens.push(output);
        tokens.extend_from_slice(hubs);
        let pairs = token_pairs(&tokens);

        let pools = try_join_all(pairs.iter().map(|(a, b)| self.pool(*a, *b))).await?;
        let snapshot = PoolSnapshot::new(pools.into_iter().flatten().collect());

        debug!(
            input = %input,
            output = %output,
            pairs = pairs.len(),
            pools = snapshot.len(),
            "Pool snapshot fetched"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use flashliq_core::{USDT, WBTC, WETH};

    const FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");

    #[test]
    fn test_token_pairs_dedups() {
        let pairs = token_pairs(&[WBTC.token, USDT.token, WETH.token, WETH.token]);
        assert_eq!(
            pairs,
            vec![
                (WBTC.token, USDT.token),
                (WBTC.token, WETH.token),
                (USDT.token, WETH.token),
            ]
        );
        assert!(token_pairs(&[WETH.token]).is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ETH_RPC_URL"]
    async fn test_mainnet_snapshot() {
        let url = std::env::var("ETH_RPC_URL").unwrap();
        let reader = UniswapV2PoolReader::new(url, FACTORY);

        let snapshot = reader
            .snapshot(WBTC.token, USDT.token, &[WETH.token])
            .await
            .unwrap();
        assert!(!snapshot.is_empty());
        for pool in snapshot.pools() {
            assert_eq!(pool.fee_bps, UNISWAP_V2_FEE_BPS);
            assert!(pool.token0 < pool.token1);
        }
    }
}
