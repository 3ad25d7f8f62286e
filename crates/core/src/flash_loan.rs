//! Flash-loan request and callback params.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolValue;
use smallvec::SmallVec;

use crate::error::{LiquidationError, Result};
use crate::sizer::LiquidationPlan;
use crate::u256_math::BPS_DENOMINATOR;

sol! {
    /// Callback payload carried through `flashLoan(..., params, ...)`.
    #[derive(Debug, PartialEq, Eq)]
    struct LiquidationParams {
        address user;
        address debtAsset;
        uint256 debtToCover;
        address collateralAsset;
        uint256 expectedCollateralOut;
        uint256 liquidationBonusBps;
    }
}

/// ABI-encode a plan as callback params.
pub fn encode_params(plan: &LiquidationPlan) -> Bytes {
    LiquidationParams {
        user: plan.user,
        debtAsset: plan.debt_asset,
        debtToCover: plan.debt_amount_to_cover,
        collateralAsset: plan.collateral_asset,
        expectedCollateralOut: plan.expected_collateral_out,
        liquidationBonusBps: U256::from(plan.liquidation_bonus_bps),
    }
    .abi_encode()
    .into()
}

/// Decode callback params back into a plan.
pub fn decode_params(params: &[u8]) -> Result<LiquidationPlan> {
    let decoded = <LiquidationParams as SolValue>::abi_decode(params, true)
        .map_err(|e| LiquidationError::InvalidParams(e.to_string()))?;
    Ok(LiquidationPlan {
        user: decoded.user,
        debt_asset: decoded.debtAsset,
        debt_amount_to_cover: decoded.debtToCover,
        collateral_asset: decoded.collateralAsset,
        expected_collateral_out: decoded.expectedCollateralOut,
        liquidation_bonus_bps: decoded
            .liquidationBonusBps
            .try_into()
            .map_err(|_| LiquidationError::InvalidParams("bonus out of range".into()))?,
    })
}

/// Premium charged by the source: `amount * premium_bps / 10000`, rounded down.
pub fn premium_for(amount: U256, premium_bps: u64) -> U256 {
    amount * U256::from(premium_bps) / BPS_DENOMINATOR
}

/// Index-aligned flash-loan legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoanRequest {
    assets: SmallVec<[Address; 2]>,
    amounts: SmallVec<[U256; 2]>,
    premiums: SmallVec<[U256; 2]>,
}

impl FlashLoanRequest {
    /// Fails with `MalformedRequest` unless all arrays have the same non-zero
    /// length.
    pub fn new(
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
    ) -> Result<Self> {
        if assets.is_empty() {
            return Err(LiquidationError::MalformedRequest("no assets".into()));
        }
        if assets.len() != amounts.len() || assets.len() != premiums.len() {
            return Err(LiquidationError::MalformedRequest(format!(
                "{} assets, {} amounts, {} premiums",
                assets.len(),
                amounts.len(),
                premiums.len()
            )));
        }
        Ok(Self {
            assets: assets.into(),
            amounts: amounts.into(),
            premiums: premiums.into(),
        })
    }

    pub fn assets(&self) -> &[Address] {
        &self.assets
    }


    /// `amounts[i] + premiums[i]`.
    pub fn owed(&self, i: usize) -> Option<U256> {
        Some(*self.amounts.get(i)? + *self.premiums.get(i)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> LiquidationPlan {
        LiquidationPlan {
            user: Address::repeat_byte(1),
            debt_asset: Address::repeat_byte(2),
            debt_amount_to_cover: U256::from(50u64),
            collateral_asset: Address::repeat_byte(3),
            expected_collateral_out: U256::from(52u64),
            liquidation_bonus_bps: 500,
        }
    }

    #[test]
    fn test_params_decode_to_plan() {
        let encoded = encode_params(&plan());
        assert_eq!(encoded.len(), 6 * 32);
        assert_eq!(decode_params(&encoded).unwrap(), plan());
    }

    #[test]
    fn test_truncated_params_rejected() {
        let encoded = encode_params(&plan());
        let err = decode_params(&encoded[..40]).unwrap_err();
        assert!(matches!(err, LiquidationError::InvalidParams(_)));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = FlashLoanRequest::new(
            &[Address::ZERO, Address::ZERO],
            &[U256::from(1u64)],
            &[U256::ZERO, U256::ZERO],
        )
        .unwrap_err();
        assert!(matches!(err, LiquidationError::MalformedRequest(_)));
        assert!(!err.is_expected());
    }

    #[test]
    fn test_premium_rounds_down() {
        // 9 bps of 50e18
        let amount = U256::from(50u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(premium_for(amount, 9), U256::from(45_000_000_000_000_000u64));
        assert_eq!(premium_for(U256::from(1_000u64), 9), U256::ZERO);
    }

    #[test]
    fn test_owed_adds_premium() {
        let request = FlashLoanRequest::new(
            &[Address::repeat_byte(2)],
            &[U256::from(50_000u64)],
            &[premium_for(U256::from(50_000u64), 9)],
        )
        .unwrap();
        assert_eq!(request.owed(0), Some(U256::from(50_045u64)));
        assert_eq!(request.owed(1), None);
    }
}
