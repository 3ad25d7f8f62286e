//! Route search and conservative quoting.

use alloy::primitives::{Address, U256};
use arrayvec::ArrayVec;
use tracing::{debug, trace};

use super::pool::Pool;
use crate::config::SwapConfig;
use crate::error::{LiquidationError, Result};
use crate::services::PoolSource;
use crate::u256_math;

/// Longest route the planner will ever build.
pub const MAX_ROUTE_HOPS: usize = 3;

/// One leg of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
}

/// Ordered legs from input to output asset. Empty when input equals output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapRoute {
    hops: ArrayVec<Hop, MAX_ROUTE_HOPS>,
}

impl SwapRoute {
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Token path including both ends.
    pub fn path(&self) -> ArrayVec<Address, { MAX_ROUTE_HOPS + 1 }> {
        let mut path = ArrayVec::new();
        if let Some(first) = self.hops.first() {
            path.push(first.token_in);
        }
        for hop in &self.hops {
            path.push(hop.token_out);
        }
        path
    }

    /// Pool addresses in order.
    pub fn pools(&self) -> impl Iterator<Item = Address> + '_ {
        self.hops.iter().map(|h| h.pool)
    }
}

impl std::fmt::Display for SwapRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hops.is_empty() {
            return write!(f, "identity");
        }
        let path: Vec<String> = self.path().iter().map(|a| a.to_string()).collect();
        write!(f, "{}", path.join(" -> "))
    }
}

/// Priced route for converting seized collateral back into the debt asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub input_asset: Address,
    pub input_amount: U256,
    pub output_asset: Address,
    /// Simulated output at current reserves
    pub expected_output: U256,
    /// Worst case admitted by the price-impact bound; enforced by the venue
    pub min_output_amount: U256,
    pub route: SwapRoute,
    /// Impact of trade size against the marginal price
    pub price_impact_bps: u64,
}

/// Candidate route with the pool state it was priced against.
struct Candidate {
    route: SwapRoute,
    pools: ArrayVec<Pool, MAX_ROUTE_HOPS>,
}

struct Priced {
    route: SwapRoute,
    expected: U256,
    spot: U256,
    impact_bps: u64,
}

/// Finds the best route within the price-impact bound.
#[derive(Debug, Clone)]
pub struct SwapPlanner {
    config: SwapConfig,
}

impl SwapPlanner {
    pub fn new(config: SwapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    fn max_hops(&self) -> usize {
        (self.config.max_hops as usize).clamp(1, MAX_ROUTE_HOPS)
    }

    /// Quote `input_amount` of `input` into `output`.
    ///
    /// Direct pools and routes through the configured hub tokens are priced
    /// at the marginal rate (`spot`) and by simulation (`expected`). Routes
    /// whose impact exceeds the bound are dropped; the survivor with the
    /// highest expected output wins, ties going to fewer hops and then the
    /// lexicographically smaller path. The minimum output is the spot output
    /// reduced by the full bound.
    pub fn quote<S: PoolSource + ?Sized>(
        &self,
        pools: &S,
        input: Address,
        input_amount: U256,
        output: Address,
    ) -> Result<SwapQuote> {
        let no_route = || LiquidationError::NoRoute {
            input,
            output,
            max_price_impact_bps: self.config.max_price_impact_bps,
        };

        if input_amount.is_zero() {
            return Err(no_route());
        }

        if input == output {
            return Ok(SwapQuote {
                input_asset: input,
                input_amount,
                output_asset: output,
                expected_output: input_amount,
                min_output_amount: input_amount,
                route: SwapRoute::default(),
                price_impact_bps: 0,
            });
        }

        let candidates = self.candidates(pools, input, output);
        let max_impact = u64::from(self.config.max_price_impact_bps);
        let considered = candidates.len();

        let best = candidates
            .into_iter()
            .filter_map(|c| Self::price(c, input_amount))
            .filter(|p| {
                let within = p.impact_bps <= max_impact;
                if !within {
                    trace!(route = %p.route, impact_bps = p.impact_bps, "Route exceeds impact bound");
                }
                within
            })
            .max_by(|a, b| {
                a.expected
                    .cmp(&b.expected)
                    .then_with(|| b.route.len().cmp(&a.route.len()))
                    .then_with(|| Self::route_key(&b.route).cmp(&Self::route_key(&a.route)))
            })
            .ok_or_else(no_route)?;

        let min_output_amount = u256_math::apply_basis_points(best.spot, self.config.max_price_impact_bps)
            .min(best.expected);

        debug!(
            considered,
            route = %best.route,
            expected = %best.expected,
            min_output = %min_output_amount,
            impact_bps = best.impact_bps,
            "Swap quoted"
        );

        Ok(SwapQuote {
            input_asset: input,
            input_amount,
            output_asset: output,
            expected_output: best.expected,
            min_output_amount,
            route: best.route,
            price_impact_bps: best.impact_bps,
        })
    }

    fn route_key(route: &SwapRoute) -> (ArrayVec<Address, { MAX_ROUTE_HOPS + 1 }>, Vec<Address>) {
        (route.path(), route.pools().collect())
    }

    fn price(candidate: Candidate, amount: U256) -> Option<Priced> {
        let mut expected = amount;
        let mut spot = amount;
        for (hop, pool) in candidate.route.hops().iter().zip(candidate.pools.iter()) {
            spot = pool.spot_amount_out(hop.token_in, spot)?;
            expected = pool.amount_out(hop.token_in, expected)?;
        }
        if expected.is_zero() {
            return None;
        }
        Some(Priced {
            impact_bps: u256_math::shortfall_bps(spot, expected),
            route: candidate.route,
            expected,
            spot,
        })
    }

    fn candidates<S: PoolSource + ?Sized>(
        &self,
        pools: &S,
        input: Address,
        output: Address,
    ) -> Vec<Candidate> {
        let mut found = Vec::new();
        let mut visited: ArrayVec<Address, { MAX_ROUTE_HOPS + 1 }> = ArrayVec::new();
        visited.push(input);
        let mut current = Candidate {
            route: SwapRoute::default(),
            pools: ArrayVec::new(),
        };
        self.extend(pools, input, output, &mut visited, &mut current, &mut found);
        found
    }

    fn extend<S: PoolSource + ?Sized>(
        &self,
        pools: &S,
        from: Address,
        output: Address,
        visited: &mut ArrayVec<Address, { MAX_ROUTE_HOPS + 1 }>,
        current: &mut Candidate,
        found: &mut Vec<Candidate>,
    ) {
        let depth = current.route.len();
        let max_hops = self.max_hops();

        if depth < max_hops {
            for pool in pools.pools_between(from, output) {
                let mut route = current.route.clone();
                let mut route_pools = current.pools.clone();
                route.hops.push(Hop {
                    pool: pool.address,
                    token_in: from,
                    token_out: output,
                });
                route_pools.push(pool);
                found.push(Candidate {
                    route,
                    pools: route_pools,
                });
            }
        }

        if depth + 2 > max_hops {
            return;
        }

        for hub in &self.config.hub_tokens {
            if *hub == output || visited.contains(hub) {
                continue;
            }
            for pool in pools.pools_between(from, *hub) {
                current.route.hops.push(Hop {
                    pool: pool.address,
                    token_in: from,
                    token_out: *hub,
                });
                current.pools.push(pool);
                visited.push(*hub);

                self.extend(pools, *hub, output, visited, current, found);

                visited.pop();
                current.pools.pop();
                current.route.hops.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::PoolSnapshot;
    use crate::u256_math::WAD;

    const COLL: Address = Address::repeat_byte(0x10);
    const DEBT: Address = Address::repeat_byte(0x20);
    const HUB: Address = Address::repeat_byte(0x30);

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn planner(max_impact: u16) -> SwapPlanner {
        SwapPlanner::new(SwapConfig {
            max_price_impact_bps: max_impact,
            max_hops: 2,
            hub_tokens: vec![HUB],
        })
    }

    fn pair(id: u8, a: Address, b: Address, ra: u64, rb: u64) -> Pool {
        Pool::constant_product(Address::repeat_byte(id), a, b, units(ra), units(rb))
    }

    fn fixed(id: u8, a: Address, b: Address, num: u64, den: u64) -> Pool {
        Pool::fixed_rate(
            Address::repeat_byte(id),
            a,
            b,
            units(1_000_000),
            units(1_000_000),
            U256::from(num),
            U256::from(den),
            0,
        )
    }

    #[test]
    fn test_direct_route() {
        let pools = PoolSnapshot::new(vec![fixed(1, COLL, DEBT, 106, 105)]);
        let quote = planner(100)
            .quote(&pools, COLL, units(105) / U256::from(2u64), DEBT)
            .unwrap();
        assert_eq!(quote.expected_output, units(53));
        assert_eq!(quote.price_impact_bps, 0);
        assert_eq!(quote.route.len(), 1);
        // 53 * 0.99
        assert_eq!(quote.min_output_amount, units(5247) / U256::from(100u64));
        assert!(quote.min_output_amount <= quote.expected_output);
    }

    #[test]
    fn test_min_output_never_exceeds_expected() {
        let pools = PoolSnapshot::new(vec![pair(1, COLL, DEBT, 10_000, 10_000)]);
        let quote = planner(300).quote(&pools, COLL, units(100), DEBT).unwrap();
        assert!(quote.price_impact_bps > 0);
        assert!(quote.min_output_amount <= quote.expected_output);
    }

    #[test]
    fn test_impact_bound_drops_shallow_pool() {
        // 10% of the reserve moves the price far beyond 1%
        let pools = PoolSnapshot::new(vec![pair(1, COLL, DEBT, 100, 100)]);
        let err = planner(100).quote(&pools, COLL, units(10), DEBT).unwrap_err();
        assert!(matches!(err, LiquidationError::NoRoute { max_price_impact_bps: 100, .. }));
    }

    #[test]
    fn test_two_hop_beats_worse_direct() {
        let pools = PoolSnapshot::new(vec![
            fixed(1, COLL, DEBT, 90, 100),
            fixed(2, COLL, HUB, 1, 1),
            fixed(3, HUB, DEBT, 1, 1),
        ]);
        let quote = planner(100).quote(&pools, COLL, units(10), DEBT).unwrap();
        assert_eq!(quote.route.len(), 2);
        assert_eq!(quote.route.path().as_slice(), &[COLL, HUB, DEBT]);
        assert_eq!(quote.expected_output, units(10));
    }

    #[test]
    fn test_tie_prefers_fewer_hops() {
        let pools = PoolSnapshot::new(vec![
            fixed(1, COLL, HUB, 1, 1),
            fixed(2, HUB, DEBT, 1, 1),
            fixed(3, COLL, DEBT, 1, 1),
        ]);
        let quote = planner(100).quote(&pools, COLL, units(10), DEBT).unwrap();
        assert_eq!(quote.route.len(), 1);
        assert_eq!(quote.route.hops()[0].pool, Address::repeat_byte(3));
    }

    #[test]
    fn test_tie_between_equal_pools_is_deterministic() {
        let pools = PoolSnapshot::new(vec![fixed(9, COLL, DEBT, 1, 1), fixed(4, COLL, DEBT, 1, 1)]);
        let quote = planner(100).quote(&pools, COLL, units(10), DEBT).unwrap();
        assert_eq!(quote.route.hops()[0].pool, Address::repeat_byte(4));
    }

    #[test]
    fn test_hub_routes_respect_max_hops() {
        let pools = PoolSnapshot::new(vec![fixed(2, COLL, HUB, 1, 1), fixed(3, HUB, DEBT, 1, 1)]);
        let single_hop = SwapPlanner::new(SwapConfig {
            max_price_impact_bps: 100,
            max_hops: 1,
            hub_tokens: vec![HUB],
        });
        assert!(single_hop.quote(&pools, COLL, units(1), DEBT).is_err());
    }

    #[test]
    fn test_identity_and_zero_amount() {
        let pools = PoolSnapshot::default();
        let quote = planner(100).quote(&pools, DEBT, units(7), DEBT).unwrap();
        assert!(quote.route.is_empty());
        assert_eq!(quote.min_output_amount, units(7));
        assert!(planner(100).quote(&pools, COLL, U256::ZERO, DEBT).is_err());
    }

    #[test]
    fn test_no_pools_is_no_route() {
        let err = planner(100)
            .quote(&PoolSnapshot::default(), COLL, units(1), DEBT)
            .unwrap_err();
        assert_eq!(err.kind(), "no_route");
    }
}
