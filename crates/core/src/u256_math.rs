//! Fixed-point arithmetic matching the lending protocol's accounting.
//!
//! Amounts are raw token units, prices and position values are expressed in
//! the protocol's base currency (wei of ETH for Aave v2), health factors are
//! WAD (1e18) and percentages use the protocol's 1e4 percentage factor.
//!
//! Rounding follows WadRayMath / PercentageMath: multiplications and
//! divisions round half up. The order of operations in every helper mirrors
//! the on-chain code, since a different order shifts results by a few wei and
//! that is enough to flip liquidation eligibility at the 1.0 boundary.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Half a WAD, used for half-up rounding
pub const HALF_WAD: U256 = U256::from_limbs([500_000_000_000_000_000u64, 0, 0, 0]);

/// RAY constant: 1e27 for 27-decimal fixed-point arithmetic
pub const RAY: U256 = U256::from_limbs([0x9fd0803ce8000000, 0x33b2e3c, 0, 0]);

/// Half a RAY, used for half-up rounding
pub const HALF_RAY: U256 = U256::from_limbs([0x4fe8401e74000000, 0x19d971e, 0, 0]);

/// RAY / WAD
pub const WAD_RAY_RATIO: U256 = U256::from_limbs([1_000_000_000u64, 0, 0, 0]);

/// Percentage factor (10000 = 100%)
pub const PERCENTAGE_FACTOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Half of the percentage factor
pub const HALF_PERCENT: U256 = U256::from_limbs([5_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = PERCENTAGE_FACTOR;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Multiply two WAD values, rounding half up: (a * b + WAD/2) / WAD
#[inline(always)]
pub fn wad_mul(a: U256, b: U256) -> U256 {
    if a.is_zero() || b.is_zero() {
        return U256::ZERO;
    }
    (a * b + HALF_WAD) / WAD
}

/// Divide two WAD values, rounding half up: (a * WAD + b/2) / b
///
/// Returns `U256::MAX` for a zero divisor, which is how an empty debt
/// side reads as an infinite health factor.
#[inline(always)]
pub fn wad_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    (a * WAD + b / U256::from(2u64)) / b
}

/// Multiply two RAY values, rounding half up.
#[inline(always)]
pub fn ray_mul(a: U256, b: U256) -> U256 {
    if a.is_zero() || b.is_zero() {
        return U256::ZERO;
    }
    (a * b + HALF_RAY) / RAY
}

/// Divide two RAY values, rounding half up.
#[inline(always)]
pub fn ray_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    (a * RAY + b / U256::from(2u64)) / b
}

/// Convert RAY to WAD, rounding half up.
#[inline(always)]
pub fn ray_to_wad(a: U256) -> U256 {
    (a + WAD_RAY_RATIO / U256::from(2u64)) / WAD_RAY_RATIO
}

/// Convert WAD to RAY.
#[inline(always)]
pub fn wad_to_ray(a: U256) -> U256 {
    a * WAD_RAY_RATIO
}

/// Percentage multiplication, rounding half up.
///
/// `percentage` is on the 1e4 scale, e.g. `percent_mul(x, 10500)` is x * 105%.
#[inline(always)]
pub fn percent_mul(value: U256, percentage: u64) -> U256 {
    if value.is_zero() || percentage == 0 {
        return U256::ZERO;
    }
    (value * U256::from(percentage) + HALF_PERCENT) / PERCENTAGE_FACTOR
}

/// Percentage division, rounding half up.
#[inline(always)]
pub fn percent_div(value: U256, percentage: u64) -> U256 {
    if percentage == 0 {
        return U256::MAX;
    }
    let percentage = U256::from(percentage);
    (value * PERCENTAGE_FACTOR + percentage / U256::from(2u64)) / percentage
}

/// Apply basis points reduction (e.g., for slippage), rounding down.
/// Returns: value * (10000 - basis_points) / 10000
///
/// Example: apply_basis_points(1000, 100) = 990 (1% reduction)
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u16.saturating_sub(basis_points));
    (value * factor) / BPS_DENOMINATOR
}

/// Apply basis points increase, rounding down.
/// Returns: value * (10000 + basis_points) / 10000
///
/// Example: apply_basis_points_up(1000, 2000) = 1200 (20% increase)
#[inline(always)]
pub fn apply_basis_points_up(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u32 + basis_points as u32);
    (value * factor) / BPS_DENOMINATOR
}

/// Value of a token amount in base currency.
///
/// Formula: price * amount / 10^decimals (multiply first, as the protocol does)
#[inline(always)]
pub fn base_value(amount: U256, price: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }
    price * amount / pow10(decimals)
}

/// Convert a base-currency amount from one asset into another asset's units.
///
/// Formula: amount * price_from * 10^decimals_to / (price_to * 10^decimals_from)
#[inline(always)]
pub fn convert_amount(
    amount: U256,
    price_from: U256,
    decimals_from: u8,
    price_to: U256,
    decimals_to: u8,
) -> U256 {
    if price_to.is_zero() {
        return U256::ZERO;
    }
    price_from * amount * pow10(decimals_to) / (price_to * pow10(decimals_from))
}

/// Calculate health factor in WAD (18 decimals).
/// HF = percent_mul(total_collateral, avg_liquidation_threshold).wad_div(total_debt)
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn calculate_hf_wad(
    total_collateral: U256,
    avg_liquidation_threshold: u64,
    total_debt: U256,
) -> U256 {
    if total_debt.is_zero() {
        return U256::MAX;
    }
    wad_div(percent_mul(total_collateral, avg_liquidation_threshold), total_debt)
}

/// Check if health factor indicates liquidatable position (HF < 1.0).
#[inline(always)]
pub fn is_liquidatable_wad(hf_wad: U256) -> bool {
    hf_wad < WAD
}

/// Shortfall of `actual` relative to `reference` in basis points (floor).
/// Returns 0 when `actual >= reference` or `reference` is zero.
#[inline(always)]
pub fn shortfall_bps(reference: U256, actual: U256) -> u64 {
    if reference.is_zero() || actual >= reference {
        return 0;
    }
    let bps = ((reference - actual) * BPS_DENOMINATOR) / reference;
    bps.saturating_to::<u64>()
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad == U256::MAX {
        return f64::INFINITY;
    }
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Convert a raw token amount to f64 units. Display only.
#[inline(always)]
pub fn units_to_f64(amount: U256, decimals: u8) -> f64 {
    if decimals == 18 {
        return wad_to_f64(amount);
    }
    wad_to_f64(amount) * 10f64.powi(18 - decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_constants() {
        assert_eq!(RAY, U256::from(10u64).pow(U256::from(27u64)));
        assert_eq!(HALF_RAY * U256::from(2u64), RAY);
        assert_eq!(HALF_WAD * U256::from(2u64), WAD);
        assert_eq!(WAD * WAD_RAY_RATIO, RAY);
    }

    #[test]
    fn test_wad_mul_rounds_half_up() {
        assert_eq!(wad_mul(units(2), units(3)), units(6));
        // 0.5 wei rounds up to 1
        assert_eq!(wad_mul(U256::from(1u64), HALF_WAD), U256::from(1u64));
        // just below half rounds down
        assert_eq!(
            wad_mul(U256::from(1u64), HALF_WAD - U256::from(1u64)),
            U256::ZERO
        );
        assert_eq!(wad_mul(U256::ZERO, units(5)), U256::ZERO);
    }

    #[test]
    fn test_wad_div() {
        assert_eq!(wad_div(units(1), units(2)), HALF_WAD);
        // 2/3 = 0.666..67 after half-up rounding
        let two_thirds = wad_div(U256::from(2u64), U256::from(3u64));
        assert_eq!(two_thirds, U256::from(666_666_666_666_666_667u64));
        assert_eq!(wad_div(units(1), U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_ray_helpers() {
        assert_eq!(ray_mul(RAY, RAY), RAY);
        assert_eq!(ray_div(RAY, RAY * U256::from(2u64)), HALF_RAY);
        assert_eq!(ray_to_wad(wad_to_ray(units(7))), units(7));
        // 1.5e9 ray wei rounds up to 2 wad wei
        assert_eq!(ray_to_wad(U256::from(1_500_000_000u64)), U256::from(2u64));
    }

    #[test]
    fn test_percent_math() {
        assert_eq!(percent_mul(units(100), 5000), units(50));
        assert_eq!(percent_mul(units(50), 10500), U256::from(52_500_000_000_000_000_000u128));
        assert_eq!(percent_div(U256::from(52_500_000_000_000_000_000u128), 10500), units(50));
        assert_eq!(percent_mul(U256::ZERO, 10500), U256::ZERO);
        assert_eq!(percent_div(units(1), 0), U256::MAX);
        // 1 * 50% = 0.5 rounds up to 1
        assert_eq!(percent_mul(U256::from(1u64), 5000), U256::from(1u64));
    }

    #[test]
    fn test_apply_basis_points() {
        let value = U256::from(1000u64);
        assert_eq!(apply_basis_points(value, 100), U256::from(990u64));
        assert_eq!(apply_basis_points(value, 1000), U256::from(900u64));
        assert_eq!(apply_basis_points(value, 0), U256::from(1000u64));
        assert_eq!(apply_basis_points_up(value, 2000), U256::from(1200u64));
    }

    #[test]
    fn test_base_value() {
        // 2 WBTC (8 decimals) at 15 ETH each
        let amount = U256::from(200_000_000u64);
        let price = units(15);
        assert_eq!(base_value(amount, price, 8), units(30));

        // 1000 USDT (6 decimals) at 0.0004 ETH each
        let amount = U256::from(1_000_000_000u64);
        let price = U256::from(400_000_000_000_000u64);
        assert_eq!(base_value(amount, price, 6), U256::from(400_000_000_000_000_000u64));
    }

    #[test]
    fn test_convert_amount() {
        // 100 USDT (6 dec) at 0.0004 ETH -> WBTC (8 dec) at 16 ETH
        let usdt = U256::from(100_000_000u64);
        let out = convert_amount(
            usdt,
            U256::from(400_000_000_000_000u64),
            6,
            units(16),
            8,
        );
        // 0.04 ETH / 16 = 0.0025 WBTC
        assert_eq!(out, U256::from(250_000u64));
        assert_eq!(convert_amount(usdt, units(1), 6, U256::ZERO, 8), U256::ZERO);
    }

    #[test]
    fn test_calculate_hf_wad() {
        // collateral 120, LT 80%, debt 100 -> 0.96
        let hf = calculate_hf_wad(units(120), 8000, units(100));
        assert_eq!(hf, U256::from(960_000_000_000_000_000u64));
        assert_eq!(calculate_hf_wad(units(1), 8000, U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_is_liquidatable() {
        let hf_low = (WAD * U256::from(9u64)) / U256::from(10u64);
        assert!(is_liquidatable_wad(hf_low));

        let hf_high = (WAD * U256::from(11u64)) / U256::from(10u64);
        assert!(!is_liquidatable_wad(hf_high));

        // boundary: exactly 1.0 is not liquidatable
        assert!(!is_liquidatable_wad(WAD));
        assert!(is_liquidatable_wad(WAD - U256::from(1u64)));
    }

    #[test]
    fn test_shortfall_bps() {
        assert_eq!(shortfall_bps(U256::from(100u64), U256::from(90u64)), 1000);
        assert_eq!(shortfall_bps(U256::from(100u64), U256::from(110u64)), 0);
        assert_eq!(shortfall_bps(U256::ZERO, U256::from(1u64)), 0);
    }

    #[test]
    fn test_wad_to_f64() {
        assert!((wad_to_f64(units(1000)) - 1000.0).abs() < 0.001);
        assert!(wad_to_f64(U256::MAX).is_infinite());
        assert!((units_to_f64(U256::from(150_000_000u64), 8) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), WAD);
    }
}
