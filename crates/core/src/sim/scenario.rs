//! Ready-made worlds.

use alloy::primitives::{address, Address, U256};

use super::{ReserveConfig, SimWorld};
use crate::assets::{Asset, AssetRegistry, USDT, WBTC, WETH};
use crate::orchestrator::OperatorAccounts;
use crate::swap::Pool;
use crate::u256_math::{pow10, WAD};

/// A world plus the target and the addresses acting on it.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub world: SimWorld,
    pub user: Address,
    pub accounts: OperatorAccounts,
    pub assets: AssetRegistry,
    pub collateral_asset: Address,
    pub debt_asset: Address,
}

/// Collateral token of the small scenarios.
pub const COLLATERAL: Address = Address::repeat_byte(0xc0);
/// Debt token of the small scenarios.
pub const DEBT: Address = Address::repeat_byte(0xd0);
/// Fixed-rate venue of the small scenarios.
pub const VENUE_POOL: Address = Address::repeat_byte(0x5a);

const SIM_LENDING_POOL: Address = Address::repeat_byte(0x1e);
const SIM_ROUTER: Address = Address::repeat_byte(0x70);
const SIM_OPERATOR: Address = Address::repeat_byte(0x0b);
const SIM_RECEIVER: Address = Address::repeat_byte(0x9e);
const SIM_BORROWER: Address = Address::repeat_byte(0xbb);

fn units(n: u64) -> U256 {
    U256::from(n) * WAD
}

/// Borrower with 120 collateral against 100 debt, both priced 1:1, bonus 5%.
///
/// `collateral_lt_bps` sets the health factor (8000 gives 0.96, 8500 gives
/// 1.02). The venue converts collateral to debt at `numerator/denominator`
/// with no fee and deep reserves.
pub fn small(collateral_lt_bps: u64, numerator: u64, denominator: u64) -> Scenario {
    let mut world = SimWorld::new(SIM_LENDING_POOL, SIM_ROUTER);
    world.add_reserve(
        COLLATERAL,
        ReserveConfig {
            decimals: 18,
            liquidation_threshold_bps: collateral_lt_bps,
            liquidation_bonus_bps: 500,
        },
        WAD,
    );
    world.add_reserve(
        DEBT,
        ReserveConfig {
            decimals: 18,
            liquidation_threshold_bps: 8_000,
            liquidation_bonus_bps: 500,
        },
        WAD,
    );
    world.supply(SIM_BORROWER, COLLATERAL, units(120));
    world.borrow(SIM_BORROWER, DEBT, units(100));
    // flash-loan liquidity
    world.mint(DEBT, SIM_LENDING_POOL, units(1_000));
    world.add_pool(fixed_venue(numerator, denominator));

    Scenario {
        world,
        user: SIM_BORROWER,
        accounts: OperatorAccounts {
            operator: SIM_OPERATOR,
            flash_loan_source: SIM_LENDING_POOL,
            profit_receiver: SIM_RECEIVER,
        },
        assets: AssetRegistry::new([
            Asset::new("COLL", COLLATERAL, 18),
            Asset::new("DEBT", DEBT, 18),
        ]),
        collateral_asset: COLLATERAL,
        debt_asset: DEBT,
    }
}

/// The small scenario's venue at another rate.
pub fn fixed_venue(numerator: u64, denominator: u64) -> Pool {
    Pool::fixed_rate(
        VENUE_POOL,
        COLLATERAL,
        DEBT,
        units(1_000),
        units(1_000),
        U256::from(numerator),
        U256::from(denominator),
        0,
    )
}

/// Liquidatable (hf 0.96); 52.5 collateral swaps for 53 debt.
pub fn profitable() -> Scenario {
    small(8_000, 106, 105)
}

/// Liquidatable (hf 0.96); 52.5 collateral swaps for 49 debt.
pub fn unprofitable() -> Scenario {
    small(8_000, 98, 105)
}

/// Healthy (hf 1.02).
pub fn healthy() -> Scenario {
    small(8_500, 106, 105)
}

pub const AAVE_V2_LENDING_POOL: Address = address!("7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9");
pub const UNISWAP_V2_ROUTER: Address = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
pub const WBTC_WETH_PAIR: Address = address!("Bb2b8038a1640196FbE3e38816F3e67Cba72D940");
pub const WETH_USDT_PAIR: Address = address!("0d4a11d5EEaaC28EC3F61d100daF4d40471f1852");
pub const WBTC_USDT_PAIR: Address = address!("0DE0Fa91b6DbaB8c8503aAA2D1DFa91a192cB149");
/// Borrower liquidated at mainnet block 12489619.
pub const FORK_TARGET_USER: Address = address!("59CE4a2AC5bC3f5F225439B2993b86B42f6d3e9F");
const FORK_OPERATOR: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
const FORK_PROFIT_RECEIVER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

fn tokens(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * pow10(decimals)
}

/// Replica of the WBTC-collateral / USDT-debt position at block 12489619.
///
/// Prices are in ETH (18 decimals) as the protocol's oracle reports them.
/// The direct WBTC/USDT pair is too shallow for the seized amount, so the
/// route has to go through WETH.
pub fn mainnet_replica() -> Scenario {
    let mut world = SimWorld::new(AAVE_V2_LENDING_POOL, UNISWAP_V2_ROUTER);

    world.add_reserve(
        WBTC.token,
        ReserveConfig {
            decimals: 8,
            liquidation_threshold_bps: 7_500,
            liquidation_bonus_bps: 650,
        },
        // 15.5 ETH
        U256::from(15_500_000_000_000_000_000u128),
    );
    world.add_reserve(
        USDT.token,
        ReserveConfig {
            decimals: 6,
            liquidation_threshold_bps: 0,
            liquidation_bonus_bps: 0,
        },
        // 0.000412 ETH
        U256::from(412_000_000_000_000u64),
    );
    world.add_reserve(
        WETH.token,
        ReserveConfig {
            decimals: 18,
            liquidation_threshold_bps: 8_250,
            liquidation_bonus_bps: 500,
        },
        WAD,
    );

    world.supply(FORK_TARGET_USER, WBTC.token, tokens(560, 8));
    world.borrow(FORK_TARGET_USER, USDT.token, tokens(16_000_000, 6));
    world.mint(USDT.token, AAVE_V2_LENDING_POOL, tokens(50_000_000, 6));

    world.add_pool(Pool::constant_product(
        WBTC_WETH_PAIR,
        WBTC.token,
        WETH.token,
        tokens(100_000, 8),
        tokens(1_550_000, 18),
    ));
    world.add_pool(Pool::constant_product(
        WETH_USDT_PAIR,
        WETH.token,
        USDT.token,
        tokens(2_000_000, 18),
        tokens(4_854_368_932, 6),
    ));
    world.add_pool(Pool::constant_product(
        WBTC_USDT_PAIR,
        WBTC.token,
        USDT.token,
        tokens(50, 8),
        tokens(1_881_064, 6),
    ));

    Scenario {
        world,
        user: FORK_TARGET_USER,
        accounts: OperatorAccounts {
            operator: FORK_OPERATOR,
            flash_loan_source: AAVE_V2_LENDING_POOL,
            profit_receiver: FORK_PROFIT_RECEIVER,
        },
        assets: AssetRegistry::mainnet(),
        collateral_asset: WBTC.token,
        debt_asset: USDT.token,
    }
}
