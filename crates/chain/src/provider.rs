//! Position and price reads over JSON-RPC.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use tracing::{debug, info};

use flashliq_core::services::{AccountData, PositionService, PriceOracle, UserReserve};
use flashliq_core::u256_math::PERCENTAGE_FACTOR;

use crate::contracts::{ILendingPool, IPriceOracle, IProtocolDataProvider};

/// Static per-reserve parameters, cached after the first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveParams {
    pub decimals: u8,
    pub liquidation_threshold_bps: u64,
    /// Above par; the protocol reports 10500 for 5%
    pub liquidation_bonus_bps: u64,
}

impl ReserveParams {
    fn from_protocol(decimals: U256, threshold: U256, bonus: U256) -> Self {
        Self {
            decimals: decimals.saturating_to(),
            liquidation_threshold_bps: threshold.saturating_to(),
            liquidation_bonus_bps: bonus.saturating_sub(PERCENTAGE_FACTOR).saturating_to(),
        }
    }
}

/// Lending-protocol reads for one deployment.
///
/// A fresh HTTP provider is built per call; reserve parameters are cached.
pub struct RpcPositionReader {
    rpc_url: String,
    lending_pool: Address,
    data_provider: Address,
    price_oracle: Address,
    reserve_params: DashMap<Address, ReserveParams>,
}

impl RpcPositionReader {
    pub fn new(
        rpc_url: impl Into<String>,
        lending_pool: Address,
        data_provider: Address,
        price_oracle: Address,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            lending_pool,
            data_provider,
            price_oracle,
            reserve_params: DashMap::new(),
        }
    }

    fn provider(&self) -> Result<impl Provider> {
        let url = self
            .rpc_url
            .parse()
            .with_context(|| format!("invalid rpc url {}", self.rpc_url))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    /// Check connectivity; returns the chain id.
    pub async fn connect_check(&self) -> Result<u64> {
        let provider = self.provider()?;
        let chain_id = provider.get_chain_id().await?;
        let block = provider.get_block_number().await?;
        info!(chain_id, block, "Provider connection verified");
        Ok(chain_id)
    }

    /// The pool's total flash-loan premium (basis points).
    pub async fn flash_loan_premium_bps(&self) -> Result<u64> {
        let provider = self.provider()?;
        let pool = ILendingPool::new(self.lending_pool, &provider);
        let premium = pool.FLASHLOAN_PREMIUM_TOTAL().call().await?;
        Ok(premium._0.saturating_to())
    }

    pub async fn reserve_params(&self, asset: Address) -> Result<ReserveParams> {
        if let Some(params) = self.reserve_params.get(&asset) {
            return Ok(*params);
        }

        let provider = self.provider()?;
        let data = IProtocolDataProvider::new(self.data_provider, &provider);
        let config = data
            .getReserveConfigurationData(asset)
            .call()
            .await
            .with_context(|| format!("reserve configuration of {asset}"))?;

        let params = ReserveParams::from_protocol(
            config.decimals,
            config.liquidationThreshold,
            config.liquidationBonus,
        );
        self.reserve_params.insert(asset, params);
        debug!(asset = %asset, ?params, "Cached reserve parameters");
        Ok(params)
    }

    async fn user_reserve(&self, asset: Address, user: Address) -> Result<Option<UserReserve>> {
        let provider = self.provider()?;
        let data = IProtocolDataProvider::new(self.data_provider, &provider);
        let reserve = data
            .getUserReserveData(asset, user)
            .call()
            .await
            .with_context(|| format!("reserve {asset} of {user}"))?;

        let debt = reserve.currentStableDebt + reserve.currentVariableDebt;
        if reserve.currentATokenBalance.is_zero() && debt.is_zero() {
            return Ok(None);
        }

        let params = self.reserve_params(asset).await?;
        Ok(Some(UserReserve {
            asset,
            decimals: params.decimals,
            collateral_balance: reserve.currentATokenBalance,
            debt_balance: debt,
            usage_as_collateral: reserve.usageAsCollateralEnabled,
            liquidation_threshold_bps: params.liquidation_threshold_bps,
            liquidation_bonus_bps: params.liquidation_bonus_bps,
        }))
    }
}

#[async_trait]
impl PositionService for RpcPositionReader {
    async fn get_user_account_data(&self, user: Address) -> Result<AccountData> {
        let provider = self.provider()?;
        let pool = ILendingPool::new(self.lending_pool, &provider);
        let data = pool
            .getUserAccountData(user)
            .call()
            .await
            .with_context(|| format!("getUserAccountData({user})"))?;

        Ok(AccountData {
            total_collateral_base: data.totalCollateralETH,
            total_debt_base: data.totalDebtETH,
            available_borrows_base: data.availableBorrowsETH,
            current_liquidation_threshold_bps: data.currentLiquidationThreshold.saturating_to(),
            ltv_bps: data.ltv.saturating_to(),
            health_factor: data.healthFactor,
        })
    }

    async fn get_user_reserves(&self, user: Address) -> Result<Vec<UserReserve>> {
        let provider = self.provider()?;
        let pool = ILendingPool::new(self.lending_pool, &provider);
        let reserves = pool
            .getReservesList()
            .call()
            .await
            .context("getReservesList")?
            ._0;

        let held = try_join_all(reserves.iter().map(|asset| self.user_reserve(*asset, user))).await?;
        let held: Vec<UserReserve> = held.into_iter().flatten().collect();
        debug!(user = %user, listed = reserves.len(), held = held.len(), "Fetched user reserves");
        Ok(held)
    }
}

#[async_trait]
impl PriceOracle for RpcPositionReader {
    async fn get_asset_price(&self, asset: Address) -> Result<U256> {
        let provider = self.provider()?;
        let oracle = IPriceOracle::new(self.price_oracle, &provider);
        let price = oracle
            .getAssetPrice(asset)
            .call()
            .await
            .with_context(|| format!("getAssetPrice({asset})"))?;
        Ok(price._0)
    }

    async fn get_asset_prices(&self, assets: &[Address]) -> Result<Vec<U256>> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }
        let provider = self.provider()?;
        let oracle = IPriceOracle::new(self.price_oracle, &provider);
        let prices = oracle
            .getAssetsPrices(assets.to_vec())
            .call()
            .await
            .context("getAssetsPrices")?;
        Ok(prices._0)
    }
}
