//! Flash-loan liquidation engine.
//!
//! One attempt reads a borrower's position, sizes a liquidation, quotes the
//! collateral swap, and then runs borrow, liquidate, swap and repay as a
//! single all-or-nothing unit of work:
//! - Position reads and health-factor recomputation ([`PositionOracle`])
//! - Debt/collateral selection under the close factor ([`LiquidationSizer`])
//! - Bounded-impact route search over AMM pools ([`SwapPlanner`])
//! - Flash-loan state machine and callback ([`FlashLoanOrchestrator`])
//! - Settlement guard ([`ProfitGuard`])
//!
//! External collaborators sit behind the traits in [`services`]; the
//! [`sim`] module implements them in memory.

mod assets;
mod atomic;
pub mod config;
mod error;
pub mod flash_loan;
mod liquidator;
mod oracle;
mod orchestrator;
mod position;
mod profit_guard;
pub mod services;
pub mod sim;
mod sizer;
pub mod swap;
pub mod u256_math;

pub use assets::{Asset, AssetRegistry, DAI, MAINNET_ASSETS, USDC, USDT, WBTC, WETH};
pub use atomic::StateHandle;
pub use config::{Deployment, EngineConfig};
pub use error::{LiquidationError, Result};
pub use flash_loan::FlashLoanRequest;
pub use liquidator::{
    ExecutionResult, LiquidationPreparer, Liquidator, Outcome, PreparedLiquidation, ReadServices,
};
pub use oracle::PositionOracle;
pub use orchestrator::{
    CallbackReport, FlashLoanOrchestrator, OperatorAccounts, OrchestratorState, Settlement,
    StateTrace,
};
pub use position::{CollateralData, DebtData, Position};
pub use profit_guard::ProfitGuard;
pub use sizer::{available_collateral_to_liquidate, LiquidationPlan, LiquidationSizer};
pub use swap::{Pool, PoolKind, PoolSnapshot, SwapPlanner, SwapQuote, SwapRoute};
