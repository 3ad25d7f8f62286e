//! Chooses the debt and collateral reserves and sizes the liquidation.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::cmp::Reverse;
use tracing::debug;

use crate::assets::AssetRegistry;
use crate::config::LiquidationConfig;
use crate::position::{CollateralData, DebtData, Position};
use crate::u256_math;

/// What one liquidation call will repay and seize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationPlan {
    pub user: Address,
    pub debt_asset: Address,
    /// Never above `close_factor * debt` for the chosen reserve
    pub debt_amount_to_cover: U256,
    pub collateral_asset: Address,
    /// Collateral the protocol should transfer, bonus included
    pub expected_collateral_out: U256,
    /// Bonus above par (basis points)
    pub liquidation_bonus_bps: u64,
}

/// Sizing policy.
///
/// Debt reserve: largest value in base currency. Collateral reserve: largest
/// `bonus * value`. Ties resolve to the lower address in both cases.
#[derive(Debug, Clone)]
pub struct LiquidationSizer {
    config: LiquidationConfig,
    assets: AssetRegistry,
}

impl LiquidationSizer {
    pub fn new(config: LiquidationConfig, assets: AssetRegistry) -> Self {
        Self { config, assets }
    }

    /// `None` when the position is healthy or has nothing supported to
    /// repay or seize.
    pub fn plan(&self, position: &Position) -> Option<LiquidationPlan> {
        if !position.is_liquidatable() {
            return None;
        }

        let debt = self.select_debt(position)?;
        let collateral = self.select_collateral(position)?;
        let bonus_bps = self
            .config
            .bonus_for(&collateral.asset, collateral.liquidation_bonus_bps);

        let max_cover = self.max_liquidatable(debt);
        let (debt_to_cover, collateral_out) =
            available_collateral_to_liquidate(debt, collateral, max_cover, bonus_bps);

        if debt_to_cover.is_zero() || collateral_out.is_zero() {
            return None;
        }

        debug!(
            user = %position.user,
            debt_asset = %self.assets.symbol(&debt.asset),
            collateral_asset = %self.assets.symbol(&collateral.asset),
            debt_to_cover = %debt_to_cover,
            expected_collateral = %collateral_out,
            bonus_bps,
            "Liquidation sized"
        );

        Some(LiquidationPlan {
            user: position.user,
            debt_asset: debt.asset,
            debt_amount_to_cover: debt_to_cover,
            collateral_asset: collateral.asset,
            expected_collateral_out: collateral_out,
            liquidation_bonus_bps: bonus_bps,
        })
    }

    /// Close-factor bound for one debt reserve.
    pub fn max_liquidatable(&self, debt: &DebtData) -> U256 {
        u256_math::percent_mul(debt.amount, self.config.close_factor_bps).min(debt.amount)
    }

    fn select_debt<'a>(&self, position: &'a Position) -> Option<&'a DebtData> {
        position
            .debts
            .iter()
            .filter(|d| self.assets.is_supported(&d.asset) && !d.amount.is_zero())
            .max_by_key(|d| (d.value, Reverse(d.asset)))
    }

    fn select_collateral<'a>(&self, position: &'a Position) -> Option<&'a CollateralData> {
        position
            .collaterals
            .iter()
            .filter(|c| self.assets.is_supported(&c.asset) && !c.amount.is_zero())
            .max_by_key(|c| {
                let bonus = self.config.bonus_for(&c.asset, c.liquidation_bonus_bps);
                (c.value * U256::from(bonus), Reverse(c.asset))
            })
    }
}

/// Collateral seized for `debt_to_cover`, capped by the user's balance.
///
/// Returns `(debt_to_cover, collateral_amount)`; when the cap binds the debt
/// is reduced to what the available collateral pays for.
pub fn available_collateral_to_liquidate(
    debt: &DebtData,
    collateral: &CollateralData,
    debt_to_cover: U256,
    bonus_bps: u64,
) -> (U256, U256) {
    if collateral.price.is_zero() || debt.price.is_zero() {
        return (U256::ZERO, U256::ZERO);
    }

    // protocol expresses the bonus as 10000 + bonus
    let bonus_factor = 10_000 + bonus_bps;
    let debt_scale = u256_math::pow10(debt.decimals);
    let collateral_scale = u256_math::pow10(collateral.decimals);

    let max_collateral = u256_math::percent_mul(
        debt.price * debt_to_cover * collateral_scale,
        bonus_factor,
    ) / (collateral.price * debt_scale);

    if max_collateral > collateral.amount {
        let debt_needed = u256_math::percent_div(
            collateral.price * collateral.amount * debt_scale / (debt.price * collateral_scale),
            bonus_factor,
        );
        (debt_needed.min(debt_to_cover), collateral.amount)
    } else {
        (debt_to_cover, max_collateral)
    }
}
