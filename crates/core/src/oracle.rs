//! Builds a normalized [`Position`] from protocol reads.

use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LiquidationError, Result};
use crate::position::Position;
use crate::services::{PositionService, PriceOracle};
use crate::u256_math;

/// Reads account data, reserves and prices and recomputes the health factor.
///
/// Any failed read, and any zero price for a reserve the user holds, is
/// reported as `OracleUnavailable`: a position cannot be valued without
/// every price.
pub struct PositionOracle {
    positions: Arc<dyn PositionService>,
    prices: Arc<dyn PriceOracle>,
}

impl PositionOracle {
    pub fn new(positions: Arc<dyn PositionService>, prices: Arc<dyn PriceOracle>) -> Self {
        Self { positions, prices }
    }

    pub async fn read(&self, user: Address) -> Result<Position> {
        let (account, reserves) = futures::try_join!(
            self.positions.get_user_account_data(user),
            self.positions.get_user_reserves(user),
        )
        .map_err(|e| LiquidationError::OracleUnavailable(format!("account data for {user}: {e:#}")))?;

        let assets: Vec<Address> = reserves.iter().map(|r| r.asset).collect();
        let prices = self
            .prices
            .get_asset_prices(&assets)
            .await
            .map_err(|e| LiquidationError::OracleUnavailable(format!("prices: {e:#}")))?;

        if prices.len() != assets.len() {
            return Err(LiquidationError::OracleUnavailable(format!(
                "price feed returned {} prices for {} assets",
                prices.len(),
                assets.len()
            )));
        }

        if let Some(reserve) = reserves
            .iter()
            .zip(prices.iter())
            .find(|(r, p)| p.is_zero() && !(r.collateral_balance.is_zero() && r.debt_balance.is_zero()))
            .map(|(r, _)| r)
        {
            return Err(LiquidationError::OracleUnavailable(format!(
                "zero price for {}",
                reserve.asset
            )));
        }

        let position = Position::compute(user, &account, &reserves, &prices);

        if position.has_health_factor_mismatch() && !account.health_factor.is_zero() {
            warn!(
                user = %user,
                local_hf = %position.health_factor,
                reported_hf = %position.reported_health_factor,
                "Health factor mismatch, using the higher value"
            );
        }

        debug!(
            user = %user,
            hf = u256_math::wad_to_f64(position.effective_health_factor()),
            collaterals = position.collaterals.len(),
            debts = position.debts.len(),
            total_collateral = %position.total_collateral,
            total_debt = %position.total_debt,
            "Position read"
        );

        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use crate::services::{AccountData, UserReserve};
    use crate::u256_math::WAD;
    use async_trait::async_trait;

    struct Fixed {
        reserves: Vec<UserReserve>,
        prices: Vec<(Address, U256)>,
        reported_hf: U256,
        fail: bool,
    }

    #[async_trait]
    impl PositionService for Fixed {
        async fn get_user_account_data(&self, _user: Address) -> anyhow::Result<AccountData> {
            if self.fail {
                anyhow::bail!("rpc timeout");
            }
            Ok(AccountData {
                health_factor: self.reported_hf,
                ..Default::default()
            })
        }

        async fn get_user_reserves(&self, _user: Address) -> anyhow::Result<Vec<UserReserve>> {
            Ok(self.reserves.clone())
        }
    }

    #[async_trait]
    impl PriceOracle for Fixed {
        async fn get_asset_price(&self, asset: Address) -> anyhow::Result<U256> {
            self.prices
                .iter()
                .find(|(a, _)| *a == asset)
                .map(|(_, p)| *p)
                .ok_or_else(|| anyhow::anyhow!("no feed for {asset}"))
        }
    }

    fn reserve(id: u8, collateral: u64, debt: u64) -> UserReserve {
        UserReserve {
            asset: Address::repeat_byte(id),
            decimals: 18,
            collateral_balance: U256::from(collateral) * WAD,
            debt_balance: U256::from(debt) * WAD,
            usage_as_collateral: true,
            liquidation_threshold_bps: 8_000,
            liquidation_bonus_bps: 500,
        }
    }

    fn oracle(service: Fixed) -> PositionOracle {
        let service = Arc::new(service);
        PositionOracle::new(service.clone(), service)
    }

    #[tokio::test]
    async fn test_read_recomputes_health_factor() {
        let oracle = oracle(Fixed {
            reserves: vec![reserve(1, 120, 0), reserve(2, 0, 100)],
            prices: vec![(Address::repeat_byte(1), WAD), (Address::repeat_byte(2), WAD)],
            reported_hf: U256::from(960_000_000_000_000_000u64),
            fail: false,
        });
        let position = oracle.read(Address::ZERO).await.unwrap();
        assert_eq!(position.health_factor, U256::from(960_000_000_000_000_000u64));
        assert!(position.is_liquidatable());
    }

    #[tokio::test]
    async fn test_failed_read_is_oracle_unavailable() {
        let oracle = oracle(Fixed {
            reserves: vec![],
            prices: vec![],
            reported_hf: WAD,
            fail: true,
        });
        let err = oracle.read(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, LiquidationError::OracleUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_or_zero_price_is_oracle_unavailable() {
        let missing = oracle(Fixed {
            reserves: vec![reserve(1, 120, 0)],
            prices: vec![],
            reported_hf: WAD,
            fail: false,
        });
        assert!(matches!(
            missing.read(Address::ZERO).await,
            Err(LiquidationError::OracleUnavailable(_))
        ));

        let zero = oracle(Fixed {
            reserves: vec![reserve(1, 120, 0), reserve(2, 0, 100)],
            prices: vec![(Address::repeat_byte(1), U256::ZERO), (Address::repeat_byte(2), WAD)],
            reported_hf: WAD,
            fail: false,
        });
        let err = zero.read(Address::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("zero price"));
    }
}
