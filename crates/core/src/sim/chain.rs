//! Async read services over a shared [`SimWorld`].

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use async_trait::async_trait;

use super::SimWorld;
use crate::atomic::StateHandle;
use crate::services::{
    AccountData, PoolSnapshotSource, PoolSource, PositionService, PriceOracle, UserReserve,
};
use crate::swap::PoolSnapshot;

/// Read side of the simulated chain.
///
/// Every call yields once before reading, the way a network round trip
/// would, so attempts running on the same task interleave their reads.
#[derive(Debug, Clone)]
pub struct SimChain {
    state: StateHandle<SimWorld>,
}

impl SimChain {
    pub fn new(state: StateHandle<SimWorld>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateHandle<SimWorld> {
        &self.state
    }

    async fn round_trip(&self) -> Result<()> {
        tokio::task::yield_now().await;
        if self.state.read(|w| w.faults().fail_reads) {
            bail!("simulated RPC failure");
        }
        Ok(())
    }
}

#[async_trait]
impl PositionService for SimChain {
    async fn get_user_account_data(&self, user: Address) -> Result<AccountData> {
        self.round_trip().await?;
        Ok(self.state.read(|w| w.account_data(user)))
    }

    async fn get_user_reserves(&self, user: Address) -> Result<Vec<UserReserve>> {
        self.round_trip().await?;
        Ok(self.state.read(|w| w.user_reserves(user)))
    }
}

#[async_trait]
impl PriceOracle for SimChain {
    async fn get_asset_price(&self, asset: Address) -> Result<U256> {
        self.round_trip().await?;
        Ok(self.state.read(|w| w.price(&asset)))
    }
}

#[async_trait]
impl PoolSnapshotSource for SimChain {
    async fn snapshot(
        &self,
        input: Address,
        output: Address,
        hubs: &[Address],
    ) -> Result<PoolSnapshot> {
        self.round_trip().await?;
        Ok(self.state.read(|w| {
            let mut tokens = Vec::with_capacity(hubs.len() + 2);
            tokens.push(input);
            tokens.push(output);
            tokens.extend(hubs.iter().copied());

            let mut snapshot = PoolSnapshot::default();
            for (i, a) in tokens.iter().enumerate() {
                for b in &tokens[i + 1..] {
                    for pool in w.pools_between(*a, *b) {
                        snapshot.insert(pool);
                    }
                }
            }
            snapshot
        }))
    }
}
