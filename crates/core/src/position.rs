//! Position data structures for a borrower on the lending protocol.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::services::{AccountData, UserReserve};
use crate::u256_math;

/// Collateral position data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralData {
    /// Token address
    pub asset: Address,
    /// Raw balance (token decimals)
    pub amount: U256,
    /// Oracle price in base currency per whole token
    pub price: U256,
    /// Token decimals
    pub decimals: u8,
    /// Value in base currency
    pub value: U256,
    /// Liquidation threshold (basis points, e.g., 8000 = 80%)
    pub liquidation_threshold_bps: u64,
    /// Liquidation bonus on top of par (basis points, e.g., 500 = 5%)
    pub liquidation_bonus_bps: u64,
}

/// Debt position data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtData {
    /// Token address
    pub asset: Address,
    /// Raw debt amount, stable plus variable (token decimals)
    pub amount: U256,
    /// Oracle price in base currency per whole token
    pub price: U256,
    /// Token decimals
    pub decimals: u8,
    /// Value in base currency
    pub value: U256,
}

/// Normalized view of a borrower, built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct Position {
    /// User wallet address
    pub user: Address,
    /// Reserves used as collateral with a non-zero balance
    pub collaterals: SmallVec<[CollateralData; 4]>,
    /// Reserves with outstanding debt
    pub debts: SmallVec<[DebtData; 4]>,
    /// Sum of collateral values (base currency)
    pub total_collateral: U256,
    /// Sum of debt values (base currency)
    pub total_debt: U256,
    /// Value-weighted liquidation threshold (basis points)
    pub avg_liquidation_threshold_bps: u64,
    /// Health factor recomputed from reserves and prices (WAD)
    pub health_factor: U256,
    /// Health factor as reported by the protocol (WAD)
    pub reported_health_factor: U256,
    /// When the reads completed
    pub fetched_at: DateTime<Utc>,
}

impl Position {
    /// Build a position from per-reserve balances and prices.
    ///
    /// Follows the protocol's account-data loop: collateral and debt values
    /// are accumulated reserve by reserve (`price * balance / 10^decimals`),
    /// the liquidation threshold is averaged by value, and the health factor
    /// is `percent_mul(collateral, avg_lt).wad_div(debt)`.
    ///
    /// `prices` must be index-aligned with `reserves`.
    pub fn compute(
        user: Address,
        account: &AccountData,
        reserves: &[UserReserve],
        prices: &[U256],
    ) -> Self {
        let mut collaterals = SmallVec::new();
        let mut debts = SmallVec::new();
        let mut total_collateral = U256::ZERO;
        let mut total_debt = U256::ZERO;
        let mut weighted_lt = U256::ZERO;

        for (reserve, price) in reserves.iter().zip(prices.iter().copied()) {
            if reserve.usage_as_collateral && !reserve.collateral_balance.is_zero() {
                let value = u256_math::base_value(reserve.collateral_balance, price, reserve.decimals);
                total_collateral += value;
                weighted_lt += value * U256::from(reserve.liquidation_threshold_bps);
                collaterals.push(CollateralData {
                    asset: reserve.asset,
                    amount: reserve.collateral_balance,
                    price,
                    decimals: reserve.decimals,
                    value,
                    liquidation_threshold_bps: reserve.liquidation_threshold_bps,
                    liquidation_bonus_bps: reserve.liquidation_bonus_bps,
                });
            }

            if !reserve.debt_balance.is_zero() {
                let value = u256_math::base_value(reserve.debt_balance, price, reserve.decimals);
                total_debt += value;
                debts.push(DebtData {
                    asset: reserve.asset,
                    amount: reserve.debt_balance,
                    price,
                    decimals: reserve.decimals,
                    value,
                });
            }
        }

        let avg_liquidation_threshold_bps = if total_collateral.is_zero() {
            0
        } else {
            (weighted_lt / total_collateral).saturating_to::<u64>()
        };

        let health_factor =
            u256_math::calculate_hf_wad(total_collateral, avg_liquidation_threshold_bps, total_debt);

        Self {
            user,
            collaterals,
            debts,
            total_collateral,
            total_debt,
            avg_liquidation_threshold_bps,
            health_factor,
            reported_health_factor: account.health_factor,
            fetched_at: Utc::now(),
        }
    }

    /// Health factor used for eligibility: the higher of the local and the
    /// reported value, so a rounding disagreement never sends a liquidation
    /// the protocol would refuse.
    pub fn effective_health_factor(&self) -> U256 {
        self.health_factor.max(self.reported_health_factor)
    }

    /// Check if position is liquidatable (HF < 1.0).
    pub fn is_liquidatable(&self) -> bool {
        u256_math::is_liquidatable_wad(self.effective_health_factor())
    }

    /// Whether the recomputed and reported health factors disagree.
    pub fn has_health_factor_mismatch(&self) -> bool {
        self.health_factor != self.reported_health_factor
    }

    /// Health factor as f64 (display only).
    pub fn health_factor_f64(&self) -> f64 {
        u256_math::wad_to_f64(self.effective_health_factor())
    }
}
