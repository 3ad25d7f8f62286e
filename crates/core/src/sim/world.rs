//! In-memory lending pool, flash-loan source and swap venue.

use alloy::primitives::{Address, Bytes, U256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{LiquidationError, Result};
use crate::flash_loan::premium_for;
use crate::position::{CollateralData, DebtData, Position};
use crate::services::{
    AccountData, FlashLoanReceiver, FlashLoanService, LendingService, LiquidationCall,
    LiquidationOutcome, PoolSource, SwapService, TokenLedger, UserReserve,
};
use crate::sizer::available_collateral_to_liquidate;
use crate::swap::{Pool, SwapQuote};
use crate::u256_math;

/// Reserve parameters of the simulated protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConfig {
    pub decimals: u8,
    pub liquidation_threshold_bps: u64,
    /// Above par, 500 = 5%
    pub liquidation_bonus_bps: u64,
}

#[derive(Debug, Clone, Default)]
struct UserBook {
    collateral: BTreeMap<Address, U256>,
    debt: BTreeMap<Address, U256>,
}

/// Injected failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// `liquidation_call` reverts
    pub fail_liquidation: bool,
    /// `swap` reverts
    pub fail_swap: bool,
    /// Venue keeps this share of every output (basis points)
    pub swap_output_haircut_bps: u16,
    /// Async reads fail
    pub fail_reads: bool,
}

/// Write-call counters. Shared by every copy of a world, so calls made in a
/// discarded unit are still counted.
#[derive(Debug, Default)]
pub struct CallCounters {
    flash_loans: AtomicU64,
    liquidation_calls: AtomicU64,
    swaps: AtomicU64,
}

impl CallCounters {
    pub fn flash_loans(&self) -> u64 {
        self.flash_loans.load(Ordering::Relaxed)
    }

    pub fn liquidation_calls(&self) -> u64 {
        self.liquidation_calls.load(Ordering::Relaxed)
    }

    pub fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Every call that would have been a state-changing transaction.
    pub fn write_calls(&self) -> u64 {
        self.flash_loans() + self.liquidation_calls() + self.swaps()
    }
}

/// Deterministic stand-in for the protocol, the flash-loan source and the
/// venue, all sharing one token ledger.
#[derive(Debug, Clone)]
pub struct SimWorld {
    lending_pool: Address,
    router: Address,
    premium_bps: u64,
    close_factor_bps: u64,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    reserves: BTreeMap<Address, ReserveConfig>,
    prices: HashMap<Address, U256>,
    users: HashMap<Address, UserBook>,
    pools: Vec<Pool>,
    faults: Faults,
    calls: Arc<CallCounters>,
}

impl SimWorld {
    /// Empty world. The lending pool is also the flash-loan source.
    pub fn new(lending_pool: Address, router: Address) -> Self {
        Self {
            lending_pool,
            router,
            premium_bps: 9,
            close_factor_bps: 5_000,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            reserves: BTreeMap::new(),
            prices: HashMap::new(),
            users: HashMap::new(),
            pools: Vec::new(),
            faults: Faults::default(),
            calls: Arc::new(CallCounters::default()),
        }
    }

    /// List a reserve with its oracle price (base currency per whole token).
    pub fn add_reserve(&mut self, asset: Address, config: ReserveConfig, price: U256) {
        self.reserves.insert(asset, config);
        self.prices.insert(asset, price);
    }

    pub fn set_price(&mut self, asset: Address, price: U256) {
        self.prices.insert(asset, price);
    }

    pub fn mint(&mut self, token: Address, holder: Address, amount: U256) {
        *self.balances.entry((token, holder)).or_default() += amount;
    }

    /// Record a collateral supply; the tokens are held by the pool.
    pub fn supply(&mut self, user: Address, asset: Address, amount: U256) {
        self.mint(asset, self.lending_pool, amount);
        *self
            .users
            .entry(user)
            .or_default()
            .collateral
            .entry(asset)
            .or_default() += amount;
    }

    /// Record a debt; the borrowed tokens left the pool earlier.
    pub fn borrow(&mut self, user: Address, asset: Address, amount: U256) {
        *self.users.entry(user).or_default().debt.entry(asset).or_default() += amount;
    }

    /// Add a venue pool and mint its reserves to the pool address.
    pub fn add_pool(&mut self, pool: Pool) {
        self.mint(pool.token0, pool.address, pool.reserve0);
        self.mint(pool.token1, pool.address, pool.reserve1);
        self.pools.push(pool);
    }

    /// Replace a pool's state (another trader moved the price).
    pub fn replace_pool(&mut self, pool: Pool) {
        match self.pools.iter_mut().find(|p| p.address == pool.address) {
            Some(existing) => *existing = pool,
            None => self.pools.push(pool),
        }
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Every non-zero allowance, keyed `(token, owner, spender)`.
    pub fn allowances(&self) -> BTreeMap<(Address, Address, Address), U256> {
        self.allowances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(key, amount)| (*key, *amount))
            .collect()
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub fn faults(&self) -> Faults {
        self.faults
    }

    pub fn calls(&self) -> Arc<CallCounters> {
        Arc::clone(&self.calls)
    }

    pub fn price(&self, asset: &Address) -> U256 {
        self.prices.get(asset).copied().unwrap_or_default()
    }

    pub fn collateral_of(&self, user: Address, asset: Address) -> U256 {
        self.users
            .get(&user)
            .and_then(|u| u.collateral.get(&asset))
            .copied()
            .unwrap_or_default()
    }

    pub fn debt_of(&self, user: Address, asset: Address) -> U256 {
        self.users
            .get(&user)
            .and_then(|u| u.debt.get(&asset))
            .copied()
            .unwrap_or_default()
    }

    /// Every reserve the user touches, in address order.
    pub fn user_reserves(&self, user: Address) -> Vec<UserReserve> {
        let Some(book) = self.users.get(&user) else {
            return Vec::new();
        };
        self.reserves
            .iter()
            .filter_map(|(asset, config)| {
                let collateral = book.collateral.get(asset).copied().unwrap_or_default();
                let debt = book.debt.get(asset).copied().unwrap_or_default();
                if collateral.is_zero() && debt.is_zero() {
                    return None;
                }
                Some(UserReserve {
                    asset: *asset,
                    decimals: config.decimals,
                    collateral_balance: collateral,
                    debt_balance: debt,
                    usage_as_collateral: true,
                    liquidation_threshold_bps: config.liquidation_threshold_bps,
                    liquidation_bonus_bps: config.liquidation_bonus_bps,
                })
            })
            .collect()
    }

    /// Account data computed the way the protocol does.
    pub fn account_data(&self, user: Address) -> AccountData {
        let reserves = self.user_reserves(user);
        let prices: Vec<U256> = reserves.iter().map(|r| self.price(&r.asset)).collect();
        let position = Position::compute(user, &AccountData::default(), &reserves, &prices);
        AccountData {
            total_collateral_base: position.total_collateral,
            total_debt_base: position.total_debt,
            available_borrows_base: U256::ZERO,
            current_liquidation_threshold_bps: position.avg_liquidation_threshold_bps,
            ltv_bps: position.avg_liquidation_threshold_bps,
            health_factor: position.health_factor,
        }
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<()> {
        let balance = self.balance_of(token, holder);
        if balance < amount {
            return Err(LiquidationError::InsufficientBalance {
                token,
                holder,
                available: balance,
                required: amount,
            });
        }
        self.balances.insert((token, holder), balance - amount);
        Ok(())
    }
}

impl TokenLedger for SimWorld {
    fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<()> {
        self.debit(token, from, amount)?;
        *self.balances.entry((token, to)).or_default() += amount;
        Ok(())
    }

    fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let allowance = self.allowance(token, from, spender);
        if allowance < amount {
            return Err(LiquidationError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                available: allowance,
                required: amount,
            });
        }
        self.transfer(token, from, to, amount)?;
        self.allowances
            .insert((token, from, spender), allowance - amount);
        Ok(())
    }
}

impl LendingService for SimWorld {
    fn lending_pool(&self) -> Address {
        self.lending_pool
    }

    fn liquidation_call(
        &mut self,
        liquidator: Address,
        call: &LiquidationCall,
    ) -> Result<LiquidationOutcome> {
        self.calls.liquidation_calls.fetch_add(1, Ordering::Relaxed);

        if !u256_math::is_liquidatable_wad(self.account_data(call.user).health_factor) {
            return Err(LiquidationError::RaceLost { user: call.user });
        }
        if self.faults.fail_liquidation {
            return Err(LiquidationError::LiquidationReverted("injected failure".into()));
        }

        let (Some(debt_config), Some(collateral_config)) = (
            self.reserves.get(&call.debt_asset).copied(),
            self.reserves.get(&call.collateral_asset).copied(),
        ) else {
            return Err(LiquidationError::LiquidationReverted("unknown reserve".into()));
        };

        let user_debt = self.debt_of(call.user, call.debt_asset);
        let user_collateral = self.collateral_of(call.user, call.collateral_asset);
        if user_debt.is_zero() {
            return Err(LiquidationError::LiquidationReverted(
                "specified currency not borrowed by the user".into(),
            ));
        }
        if user_collateral.is_zero() {
            return Err(LiquidationError::LiquidationReverted(
                "collateral cannot be liquidated".into(),
            ));
        }

        let max_debt = u256_math::percent_mul(user_debt, self.close_factor_bps);
        let requested = call.debt_to_cover.min(max_debt);

        let debt = DebtData {
            asset: call.debt_asset,
            amount: user_debt,
            price: self.price(&call.debt_asset),
            decimals: debt_config.decimals,
            value: U256::ZERO,
        };
        let collateral = CollateralData {
            asset: call.collateral_asset,
            amount: user_collateral,
            price: self.price(&call.collateral_asset),
            decimals: collateral_config.decimals,
            value: U256::ZERO,
            liquidation_threshold_bps: collateral_config.liquidation_threshold_bps,
            liquidation_bonus_bps: collateral_config.liquidation_bonus_bps,
        };
        let (debt_repaid, collateral_out) = available_collateral_to_liquidate(
            &debt,
            &collateral,
            requested,
            collateral_config.liquidation_bonus_bps,
        );

        let pool = self.lending_pool;
        self.transfer_from(call.debt_asset, pool, liquidator, pool, debt_repaid)?;
        self.transfer(call.collateral_asset, pool, liquidator, collateral_out)?;

        let book = self.users.entry(call.user).or_default();
        if let Some(d) = book.debt.get_mut(&call.debt_asset) {
            *d -= debt_repaid;
        }
        if let Some(c) = book.collateral.get_mut(&call.collateral_asset) {
            *c -= collateral_out;
        }

        trace!(user = %call.user, repaid = %debt_repaid, seized = %collateral_out, "Sim liquidation");
        Ok(LiquidationOutcome {
            debt_repaid,
            collateral_received: collateral_out,
        })
    }
}

impl PoolSource for SimWorld {
    fn pools_between(&self, token_a: Address, token_b: Address) -> Vec<Pool> {
        self.pools
            .iter()
            .filter(|p| p.connects(token_a, token_b))
            .cloned()
            .collect()
    }
}

impl SwapService for SimWorld {
    fn swap_router(&self) -> Address {
        self.router
    }

    fn swap(&mut self, trader: Address, quote: &SwapQuote) -> Result<U256> {
        self.calls.swaps.fetch_add(1, Ordering::Relaxed);

        if self.faults.fail_swap {
            return Err(LiquidationError::SwapReverted("injected failure".into()));
        }
        let Some(first) = quote.route.hops().first() else {
            return Ok(quote.input_amount);
        };

        let router = self.router;
        self.transfer_from(quote.input_asset, router, trader, first.pool, quote.input_amount)?;

        let hops = quote.route.hops();
        let mut amount = quote.input_amount;
        for (i, hop) in hops.iter().enumerate() {
            let pool = self
                .pools
                .iter_mut()
                .find(|p| p.address == hop.pool)
                .ok_or_else(|| LiquidationError::SwapReverted(format!("unknown pool {}", hop.pool)))?;
            amount = pool
                .apply_swap(hop.token_in, amount)
                .ok_or_else(|| LiquidationError::SwapReverted("insufficient liquidity".into()))?;
            if let Some(next) = hops.get(i + 1) {
                self.transfer(hop.token_out, hop.pool, next.pool, amount)?;
            }
        }

        let last = hops.last().map_or(first.pool, |h| h.pool);
        let delivered = u256_math::apply_basis_points(amount, self.faults.swap_output_haircut_bps);
        if delivered < quote.min_output_amount {
            return Err(LiquidationError::SwapReverted(format!(
                "insufficient output amount: {delivered} < {}",
                quote.min_output_amount
            )));
        }
        self.transfer(quote.output_asset, last, trader, delivered)?;
        Ok(delivered)
    }
}

impl FlashLoanService for SimWorld {
    fn flash_loan_source(&self) -> Address {
        self.lending_pool
    }

    fn flash_loan_premium_bps(&self) -> u64 {
        self.premium_bps
    }

    fn flash_loan(
        &mut self,
        initiator: Address,
        receiver_address: Address,
        receiver: &mut dyn FlashLoanReceiver<Self>,
        assets: &[Address],
        amounts: &[U256],
        params: Bytes,
    ) -> Result<()> {
        self.calls.flash_loans.fetch_add(1, Ordering::Relaxed);

        if assets.len() != amounts.len() {
            return Err(LiquidationError::MalformedRequest(format!(
                "{} assets, {} amounts",
                assets.len(),
                amounts.len()
            )));
        }

        let source = self.lending_pool;
        let premiums: Vec<U256> = amounts
            .iter()
            .map(|a| premium_for(*a, self.premium_bps))
            .collect();

        for (asset, amount) in assets.iter().zip(amounts) {
            if self.balance_of(*asset, source) < *amount {
                return Err(LiquidationError::FlashLoanFailed(format!(
                    "insufficient liquidity in {asset}"
                )));
            }
            self.transfer(*asset, source, receiver_address, *amount)?;
        }

        if !receiver.execute_operation(self, assets, amounts, &premiums, initiator, &params)? {
            return Err(LiquidationError::FlashLoanFailed(
                "invalid flash loan executor return".into(),
            ));
        }

        for ((asset, amount), premium) in assets.iter().zip(amounts).zip(&premiums) {
            self.transfer_from(*asset, source, receiver_address, source, *amount + *premium)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwapConfig;
    use crate::sim::scenario::{self, COLLATERAL, DEBT};
    use crate::swap::SwapPlanner;
    use crate::u256_math::WAD;

    const LIQUIDATOR: Address = Address::repeat_byte(0x42);

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn tenths(n: u64) -> U256 {
        U256::from(n) * WAD / U256::from(10u64)
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut world = SimWorld::new(Address::ZERO, Address::ZERO);
        let (owner, spender, to) = (
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        world.mint(DEBT, owner, units(10));
        world.approve(DEBT, owner, spender, units(4));

        world.transfer_from(DEBT, spender, owner, to, units(3)).unwrap();
        assert_eq!(world.balance_of(DEBT, to), units(3));
        assert_eq!(world.allowance(DEBT, owner, spender), units(1));

        let err = world
            .transfer_from(DEBT, spender, owner, to, units(2))
            .unwrap_err();
        assert!(matches!(err, LiquidationError::InsufficientAllowance { .. }));
        assert_eq!(world.balance_of(DEBT, owner), units(7));
    }

    #[test]
    fn test_account_data_matches_protocol_math() {
        let s = scenario::profitable();
        let data = s.world.account_data(s.user);
        assert_eq!(data.total_collateral_base, units(120));
        assert_eq!(data.total_debt_base, units(100));
        assert_eq!(data.health_factor, WAD * U256::from(96u64) / U256::from(100u64));

        let healthy = scenario::healthy();
        let data = healthy.world.account_data(healthy.user);
        assert_eq!(data.health_factor, WAD * U256::from(102u64) / U256::from(100u64));
    }

    #[test]
    fn test_liquidation_call_seizes_discounted_collateral() {
        let mut s = scenario::profitable();
        let pool = s.world.lending_pool();
        s.world.mint(DEBT, LIQUIDATOR, units(100));
        s.world.approve(DEBT, LIQUIDATOR, pool, units(100));

        let outcome = s
            .world
            .liquidation_call(
                LIQUIDATOR,
                &LiquidationCall {
                    collateral_asset: COLLATERAL,
                    debt_asset: DEBT,
                    user: s.user,
                    // clamped to the close factor
                    debt_to_cover: units(100),
                    receive_a_token: false,
                },
            )
            .unwrap();

        assert_eq!(outcome.debt_repaid, units(50));
        assert_eq!(outcome.collateral_received, tenths(525));
        assert_eq!(s.world.debt_of(s.user, DEBT), units(50));
        assert_eq!(s.world.collateral_of(s.user, COLLATERAL), tenths(675));
        assert_eq!(s.world.balance_of(COLLATERAL, LIQUIDATOR), tenths(525));
        assert_eq!(s.world.balance_of(DEBT, LIQUIDATOR), units(50));
        assert_eq!(s.world.calls().liquidation_calls(), 1);
    }

    #[test]
    fn test_liquidation_call_on_healthy_user_loses_race() {
        let mut s = scenario::healthy();
        let err = s
            .world
            .liquidation_call(
                LIQUIDATOR,
                &LiquidationCall {
                    collateral_asset: COLLATERAL,
                    debt_asset: DEBT,
                    user: s.user,
                    debt_to_cover: units(50),
                    receive_a_token: false,
                },
            )
            .unwrap_err();
        assert_eq!(err, LiquidationError::RaceLost { user: s.user });
        // still counted as a sent call
        assert_eq!(s.world.calls().write_calls(), 1);
    }

    #[test]
    fn test_liquidation_call_requires_allowance() {
        let mut s = scenario::profitable();
        s.world.mint(DEBT, LIQUIDATOR, units(100));
        let err = s
            .world
            .liquidation_call(
                LIQUIDATOR,
                &LiquidationCall {
                    collateral_asset: COLLATERAL,
                    debt_asset: DEBT,
                    user: s.user,
                    debt_to_cover: units(50),
                    receive_a_token: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LiquidationError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_swap_through_fixed_venue() {
        let mut s = scenario::profitable();
        let planner = SwapPlanner::new(SwapConfig::default());
        let quote = planner
            .quote(&s.world, COLLATERAL, tenths(525), DEBT)
            .unwrap();

        let router = s.world.swap_router();
        s.world.mint(COLLATERAL, LIQUIDATOR, tenths(525));
        s.world.approve(COLLATERAL, LIQUIDATOR, router, tenths(525));

        let out = s.world.swap(LIQUIDATOR, &quote).unwrap();
        assert_eq!(out, units(53));
        assert_eq!(s.world.balance_of(DEBT, LIQUIDATOR), units(53));
        assert_eq!(s.world.balance_of(COLLATERAL, LIQUIDATOR), U256::ZERO);
    }

    #[test]
    fn test_swap_below_min_output_reverts() {
        let mut s = scenario::profitable();
        let planner = SwapPlanner::new(SwapConfig::default());
        let quote = planner
            .quote(&s.world, COLLATERAL, tenths(525), DEBT)
            .unwrap();

        let router = s.world.swap_router();
        s.world.mint(COLLATERAL, LIQUIDATOR, tenths(525));
        s.world.approve(COLLATERAL, LIQUIDATOR, router, tenths(525));
        s.world.faults_mut().swap_output_haircut_bps = 200;

        let err = s.world.swap(LIQUIDATOR, &quote).unwrap_err();
        assert!(matches!(err, LiquidationError::SwapReverted(_)));
    }

    struct Borrower {
        approve_repayment: bool,
        accept: bool,
    }

    impl FlashLoanReceiver<SimWorld> for Borrower {
        fn execute_operation(
            &mut self,
            world: &mut SimWorld,
            assets: &[Address],
            amounts: &[U256],
            premiums: &[U256],
            _initiator: Address,
            _params: &Bytes,
        ) -> Result<bool> {
            assert_eq!(world.balance_of(assets[0], LIQUIDATOR), amounts[0]);
            if self.approve_repayment {
                // premium comes from elsewhere
                world.mint(assets[0], LIQUIDATOR, premiums[0]);
                let source = world.flash_loan_source();
                world.approve(assets[0], LIQUIDATOR, source, amounts[0] + premiums[0]);
            }
            Ok(self.accept)
        }
    }

    #[test]
    fn test_flash_loan_pulls_amount_plus_premium() {
        let mut world = scenario::profitable().world;
        let source = world.flash_loan_source();
        let before = world.balance_of(DEBT, source);
        let mut receiver = Borrower {
            approve_repayment: true,
            accept: true,
        };

        world
            .flash_loan(LIQUIDATOR, LIQUIDATOR, &mut receiver, &[DEBT], &[units(50)], Bytes::new())
            .unwrap();

        // 50 * 9 / 10000
        let premium = U256::from(45_000_000_000_000_000u64);
        assert_eq!(world.balance_of(DEBT, source), before + premium);
        assert_eq!(world.balance_of(DEBT, LIQUIDATOR), U256::ZERO);
    }

    #[test]
    fn test_flash_loan_without_repayment_approval_fails() {
        let mut world = scenario::profitable().world;
        let mut receiver = Borrower {
            approve_repayment: false,
            accept: true,
        };
        let err = world
            .flash_loan(LIQUIDATOR, LIQUIDATOR, &mut receiver, &[DEBT], &[units(50)], Bytes::new())
            .unwrap_err();
        assert!(matches!(err, LiquidationError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_flash_loan_declined_by_receiver() {
        let mut world = scenario::profitable().world;
        let mut receiver = Borrower {
            approve_repayment: true,
            accept: false,
        };
        let err = world
            .flash_loan(LIQUIDATOR, LIQUIDATOR, &mut receiver, &[DEBT], &[units(50)], Bytes::new())
            .unwrap_err();
        assert!(matches!(err, LiquidationError::FlashLoanFailed(_)));
    }

    #[test]
    fn test_flash_loan_beyond_liquidity() {
        let mut world = scenario::profitable().world;
        let mut receiver = Borrower {
            approve_repayment: true,
            accept: true,
        };
        let err = world
            .flash_loan(LIQUIDATOR, LIQUIDATOR, &mut receiver, &[DEBT], &[units(5_000)], Bytes::new())
            .unwrap_err();
        assert!(matches!(err, LiquidationError::FlashLoanFailed(_)));
        assert_eq!(world.calls().flash_loans(), 1);
    }
}
