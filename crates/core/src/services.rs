//! Boundary traits for the collaborators the engine consumes.
//!
//! Two families:
//!
//! - Read services used before the unit of work starts
//!   ([`PositionService`], [`PriceOracle`], [`PoolSnapshotSource`]). These are async and may hit the
//!   network; failures surface as `anyhow` errors and are mapped to
//!   `OracleUnavailable` by the position oracle.
//! - In-unit services ([`TokenLedger`], [`LendingService`], [`SwapService`],
//!   [`FlashLoanService`]). These are synchronous and operate on a staged copy
//!   of the shared state, so a failure anywhere simply drops the copy. The
//!   unit of work has no suspension point.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::Result;
use crate::swap::{Pool, PoolSnapshot, SwapQuote};

/// Output of the protocol's `getUserAccountData`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountData {
    /// Total collateral in base currency
    pub total_collateral_base: U256,
    /// Total debt in base currency
    pub total_debt_base: U256,
    /// Remaining borrow capacity in base currency
    pub available_borrows_base: U256,
    /// Weighted liquidation threshold (basis points)
    pub current_liquidation_threshold_bps: u64,
    /// Weighted loan-to-value (basis points)
    pub ltv_bps: u64,
    /// Health factor (WAD)
    pub health_factor: U256,
}

/// One reserve of a user as reported by the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReserve {
    /// Underlying token
    pub asset: Address,
    /// Token decimals
    pub decimals: u8,
    /// Supplied balance (aToken balance)
    pub collateral_balance: U256,
    /// Stable plus variable debt
    pub debt_balance: U256,
    /// Whether the supply counts as collateral
    pub usage_as_collateral: bool,
    /// Reserve liquidation threshold (basis points)
    pub liquidation_threshold_bps: u64,
    /// Reserve liquidation bonus above par (basis points, 500 = 5%)
    pub liquidation_bonus_bps: u64,
}

/// Account data and reserve reads from the lending protocol.
#[async_trait]
pub trait PositionService: Send + Sync {
    /// `getUserAccountData(user)`.
    async fn get_user_account_data(&self, user: Address) -> AnyResult<AccountData>;

    /// Every reserve the user supplies or borrows.
    async fn get_user_reserves(&self, user: Address) -> AnyResult<Vec<UserReserve>>;
}

/// Price feed in the protocol's base currency.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// `getAssetPrice(asset)`.
    async fn get_asset_price(&self, asset: Address) -> AnyResult<U256>;

    /// Prices for several assets, index-aligned with `assets`.
    async fn get_asset_prices(&self, assets: &[Address]) -> AnyResult<Vec<U256>> {
        try_join_all(assets.iter().map(|a| self.get_asset_price(*a))).await
    }
}

/// Pre-execution capture of the pools a quote may route through.
#[async_trait]
pub trait PoolSnapshotSource: Send + Sync {
    /// Pools connecting `input`, `output` and the `hubs`.
    async fn snapshot(
        &self,
        input: Address,
        output: Address,
        hubs: &[Address],
    ) -> AnyResult<PoolSnapshot>;
}

#[async_trait]
impl PoolSnapshotSource for PoolSnapshot {
    async fn snapshot(
        &self,
        _input: Address,
        _output: Address,
        _hubs: &[Address],
    ) -> AnyResult<PoolSnapshot> {
        Ok(self.clone())
    }
}

/// Synchronous view of swap-venue pools.
pub trait PoolSource {
    /// Pools trading `token_a` against `token_b`, in either orientation.
    fn pools_between(&self, token_a: Address, token_b: Address) -> Vec<Pool>;
}

/// ERC20 balances and allowances inside the unit of work.
pub trait TokenLedger {
    fn balance_of(&self, token: Address, holder: Address) -> U256;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256;

    fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<()>;

    fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256);

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()>;
}

/// Arguments of `liquidationCall`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationCall {
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub user: Address,
    pub debt_to_cover: U256,
    /// Receive aTokens instead of the underlying collateral
    pub receive_a_token: bool,
}

/// Effects of a successful `liquidationCall`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationOutcome {
    /// Debt actually repaid (may be below the requested amount)
    pub debt_repaid: U256,
    /// Collateral transferred to the liquidator
    pub collateral_received: U256,
}

/// Lending protocol writes.
pub trait LendingService: TokenLedger {
    /// Address that pulls the repaid debt (needs allowance).
    fn lending_pool(&self) -> Address;

    /// Repay part of `call.user`'s debt and seize discounted collateral.
    ///
    /// Fails with `RaceLost` when the user is no longer liquidatable.
    fn liquidation_call(
        &mut self,
        liquidator: Address,
        call: &LiquidationCall,
    ) -> Result<LiquidationOutcome>;
}

/// Swap venue writes.
pub trait SwapService: TokenLedger + PoolSource {
    /// Address that pulls the input token (needs allowance).
    fn swap_router(&self) -> Address;

    /// Execute `quote` for `trader`, returning the output actually received.
    ///
    /// Reverts with `SwapReverted` when the output falls below
    /// `quote.min_output_amount`.
    fn swap(&mut self, trader: Address, quote: &SwapQuote) -> Result<U256>;
}

/// Callback invoked by the flash-loan source inside the unit of work.
pub trait FlashLoanReceiver<W: ?Sized> {
    /// `executeOperation(assets, amounts, premiums, initiator, params)`.
    ///
    /// Must leave `amounts[i] + premiums[i]` approved to the source for
    /// every `i` before returning `true`.
    fn execute_operation(
        &mut self,
        world: &mut W,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &Bytes,
    ) -> Result<bool>;
}

/// Flash-loan liquidity source.
pub trait FlashLoanService: TokenLedger {
    /// Address that lends and pulls repayment.
    fn flash_loan_source(&self) -> Address;

    /// Premium charged on every leg (basis points).
    fn flash_loan_premium_bps(&self) -> u64;

    /// Lend `amounts` of `assets` to `receiver_address`, invoke the callback,
    /// then pull `amounts[i] + premiums[i]` back.
    fn flash_loan(
        &mut self,
        initiator: Address,
        receiver_address: Address,
        receiver: &mut dyn FlashLoanReceiver<Self>,
        assets: &[Address],
        amounts: &[U256],
        params: Bytes,
    ) -> Result<()>;
}

/// Everything the unit of work touches.
pub trait ExecutionEnv: LendingService + SwapService + FlashLoanService {}

impl<T: LendingService + SwapService + FlashLoanService> ExecutionEnv for T {}
