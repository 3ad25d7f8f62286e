//! Venue pool models.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::services::PoolSource;
use crate::u256_math::BPS_DENOMINATOR;

/// Pricing curve of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    /// x * y = k (Uniswap V2 style).
    ConstantProduct,
    /// Fixed quote of `numerator / denominator` raw `token1` per raw
    /// `token0` (pegged or RFQ market). The reserves still bound what can be
    /// paid out.
    FixedRate { numerator: U256, denominator: U256 },
}

/// One pool, oriented `token0`/`token1` as the venue stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    /// Swap fee (basis points, 30 = 0.3%)
    pub fee_bps: u16,
    pub kind: PoolKind,
}

impl Pool {
    /// Uniswap V2 pair with the standard 0.3% fee.
    pub fn constant_product(
        address: Address,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            reserve0,
            reserve1,
            fee_bps: 30,
            kind: PoolKind::ConstantProduct,
        }
    }

    /// Fixed-rate market paying `numerator / denominator` raw `token1` per
    /// raw `token0`.
    #[allow(clippy::too_many_arguments)]
    pub fn fixed_rate(
        address: Address,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
        numerator: U256,
        denominator: U256,
        fee_bps: u16,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            reserve0,
            reserve1,
            fee_bps,
            kind: PoolKind::FixedRate {
                numerator,
                denominator,
            },
        }
    }

    /// Whether the pool trades `a` against `b` in either orientation.
    pub fn connects(&self, a: Address, b: Address) -> bool {
        (self.token0 == a && self.token1 == b) || (self.token0 == b && self.token1 == a)
    }

    /// The other side of the pair, if `token` is in it.
    pub fn other(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// `(reserve_in, reserve_out)` for a swap from `token_in`.
    fn reserves_for(&self, token_in: Address) -> Option<(U256, U256)> {
        if token_in == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Fixed-rate gross output before fee.
    fn fixed_gross(
        &self,
        numerator: U256,
        denominator: U256,
        token_in: Address,
        amount_in: U256,
    ) -> Option<U256> {
        let (num, den) = if token_in == self.token0 {
            (numerator, denominator)
        } else {
            (denominator, numerator)
        };
        if den.is_zero() {
            return None;
        }
        Some(amount_in * num / den)
    }

    fn fee_multiplier(&self) -> U256 {
        BPS_DENOMINATOR - U256::from(self.fee_bps.min(10_000))
    }

    /// Simulated output for `amount_in` of `token_in`.
    ///
    /// `None` if the token is not in the pool, the pool is empty, or the
    /// output would drain the out-side reserve.
    pub fn amount_out(&self, token_in: Address, amount_in: U256) -> Option<U256> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;
        if reserve_out.is_zero() {
            return None;
        }

        let out = match self.kind {
            PoolKind::ConstantProduct => {
                if reserve_in.is_zero() {
                    return None;
                }
                let amount_in_with_fee = amount_in * self.fee_multiplier();
                let numerator = amount_in_with_fee * reserve_out;
                let denominator = reserve_in * BPS_DENOMINATOR + amount_in_with_fee;
                numerator / denominator
            }
            PoolKind::FixedRate {
                numerator,
                denominator,
            } => {
                let gross = self.fixed_gross(numerator, denominator, token_in, amount_in)?;
                gross * self.fee_multiplier() / BPS_DENOMINATOR
            }
        };

        (out < reserve_out).then_some(out)
    }

    /// Output at the marginal price, net of fee but without size impact.
    pub fn spot_amount_out(&self, token_in: Address, amount_in: U256) -> Option<U256> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;
        match self.kind {
            PoolKind::ConstantProduct => {
                if reserve_in.is_zero() {
                    return None;
                }
                Some(
                    amount_in * self.fee_multiplier() * reserve_out
                        / (reserve_in * BPS_DENOMINATOR),
                )
            }
            PoolKind::FixedRate {
                numerator,
                denominator,
            } => {
                let gross = self.fixed_gross(numerator, denominator, token_in, amount_in)?;
                Some(gross * self.fee_multiplier() / BPS_DENOMINATOR)
            }
        }
    }

    /// Execute a swap against the reserves and return the output.
    pub fn apply_swap(&mut self, token_in: Address, amount_in: U256) -> Option<U256> {
        let out = self.amount_out(token_in, amount_in)?;
        if token_in == self.token0 {
            self.reserve0 += amount_in;
            self.reserve1 -= out;
        } else {
            self.reserve1 += amount_in;
            self.reserve0 -= out;
        }
        Some(out)
    }
}

/// Pools captured at one point in time.
///
/// Used for pre-execution quoting; the unit of work quotes again against
/// live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pools: Vec<Pool>,
}

impl PoolSnapshot {
    pub fn new(pools: Vec<Pool>) -> Self {
        let mut snapshot = Self { pools: Vec::with_capacity(pools.len()) };
        for pool in pools {
            snapshot.insert(pool);
        }
        snapshot
    }

    /// Add a pool, replacing any pool at the same address.
    pub fn insert(&mut self, pool: Pool) {
        match self.pools.iter_mut().find(|p| p.address == pool.address) {
            Some(existing) => *existing = pool,
            None => self.pools.push(pool),
        }
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl PoolSource for PoolSnapshot {
    fn pools_between(&self, token_a: Address, token_b: Address) -> Vec<Pool> {
        self.pools
            .iter()
            .filter(|p| p.connects(token_a, token_b))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u256_math::WAD;

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    const A: Address = Address::repeat_byte(0xaa);
    const B: Address = Address::repeat_byte(0xbb);

    #[test]
    fn test_constant_product_matches_v2_formula() {
        let pool = Pool::constant_product(Address::ZERO, A, B, units(1_000), units(1_000));
        let out = pool.amount_out(A, units(10)).unwrap();
        // 10 * 997 * 1000 / (1000 * 1000 + 10 * 997)
        let expected = units(10) * U256::from(9970u64) * units(1_000)
            / (units(1_000) * U256::from(10_000u64) + units(10) * U256::from(9970u64));
        assert_eq!(out, expected);
        assert!(out < pool.spot_amount_out(A, units(10)).unwrap());
    }

    #[test]
    fn test_fixed_rate_both_directions() {
        // 1 A buys 2 B, no fee
        let pool = Pool::fixed_rate(
            Address::ZERO,
            A,
            B,
            units(1_000),
            units(1_000),
            U256::from(2u64),
            U256::from(1u64),
            0,
        );
        assert_eq!(pool.amount_out(A, units(10)), Some(units(20)));
        assert_eq!(pool.amount_out(B, units(10)), Some(units(5)));
        assert_eq!(pool.spot_amount_out(A, units(10)), Some(units(20)));
    }

    #[test]
    fn test_fixed_rate_bounded_by_reserve() {
        let one = U256::from(1u64);
        let pool = Pool::fixed_rate(Address::ZERO, A, B, units(1), units(5), one, one, 0);
        assert_eq!(pool.amount_out(A, units(10)), None);
    }

    #[test]
    fn test_unknown_token() {
        let pool = Pool::constant_product(Address::ZERO, A, B, units(1), units(1));
        assert!(pool.amount_out(Address::ZERO, units(1)).is_none());
        assert_eq!(pool.other(A), Some(B));
        assert_eq!(pool.other(Address::ZERO), None);
    }

    #[test]
    fn test_apply_swap_moves_reserves() {
        let mut pool = Pool::constant_product(Address::ZERO, A, B, units(100), units(100));
        let out = pool.apply_swap(B, units(1)).unwrap();
        assert_eq!(pool.reserve1, units(101));
        assert_eq!(pool.reserve0, units(100) - out);
    }

    #[test]
    fn test_snapshot_replaces_by_address() {
        let mut snapshot = PoolSnapshot::default();
        snapshot.insert(Pool::constant_product(Address::ZERO, A, B, units(1), units(1)));
        snapshot.insert(Pool::constant_product(Address::ZERO, A, B, units(2), units(2)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.pools_between(B, A)[0].reserve0, units(2));
    }
}
