//! Liquidation entry point: read, plan, quote, then run the flash-loan unit.

use alloy::primitives::{Address, I256, U256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::assets::AssetRegistry;
use crate::atomic::StateHandle;
use crate::config::EngineConfig;
use crate::error::{LiquidationError, Result};
use crate::flash_loan::premium_for;
use crate::oracle::PositionOracle;
use crate::orchestrator::{CallbackReport, FlashLoanOrchestrator, OperatorAccounts, OrchestratorState};
use crate::position::Position;
use crate::profit_guard::ProfitGuard;
use crate::services::{ExecutionEnv, PoolSnapshotSource, PositionService, PriceOracle};
use crate::sizer::{LiquidationPlan, LiquidationSizer};
use crate::swap::{SwapPlanner, SwapQuote};

/// Async read services used before the unit of work.
#[derive(Clone)]
pub struct ReadServices {
    pub positions: Arc<dyn PositionService>,
    pub prices: Arc<dyn PriceOracle>,
    pub pools: Arc<dyn PoolSnapshotSource>,
}

impl ReadServices {
    /// All three reads served by one backend.
    pub fn shared<S>(backend: Arc<S>) -> Self
    where
        S: PositionService + PriceOracle + PoolSnapshotSource + 'static,
    {
        Self {
            positions: backend.clone(),
            prices: backend.clone(),
            pools: backend,
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The unit committed; amounts observed in the callback.
    Liquidated(CallbackReport),
    /// Nothing committed.
    Failed(LiquidationError),
}

/// Report of one liquidation attempt.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub user: Address,
    pub success: bool,
    /// Realized profit on success. For `Unprofitable` the (negative or
    /// below-floor) projected figure, otherwise zero. Debt-asset units.
    pub profit: I256,
    pub outcome: Outcome,
    /// Orchestrator states visited, starting at `Idle`
    pub states: Vec<OrchestratorState>,
    pub plan: Option<LiquidationPlan>,
    /// Pre-execution quote, if the attempt got that far
    pub quote: Option<SwapQuote>,
}

impl ExecutionResult {
    pub fn error(&self) -> Option<&LiquidationError> {
        match &self.outcome {
            Outcome::Failed(e) => Some(e),
            Outcome::Liquidated(_) => None,
        }
    }

    pub fn report(&self) -> Option<&CallbackReport> {
        match &self.outcome {
            Outcome::Liquidated(r) => Some(r),
            Outcome::Failed(_) => None,
        }
    }

    pub fn final_state(&self) -> OrchestratorState {
        self.states.last().copied().unwrap_or(OrchestratorState::Idle)
    }

    fn failed(
        user: Address,
        error: LiquidationError,
        states: Vec<OrchestratorState>,
        plan: Option<LiquidationPlan>,
        quote: Option<SwapQuote>,
    ) -> Self {
        let profit = match &error {
            LiquidationError::Unprofitable { balance, owed, .. } => {
                I256::from_raw(*balance) - I256::from_raw(*owed)
            }
            _ => I256::ZERO,
        };
        Self {
            user,
            success: false,
            profit,
            outcome: Outcome::Failed(error),
            states,
            plan,
            quote,
        }
    }
}

/// Everything decided before the unit of work starts.
#[derive(Debug, Clone)]
pub struct PreparedLiquidation {
    pub position: Position,
    pub plan: LiquidationPlan,
    pub quote: SwapQuote,
    /// Flash-loan amount plus the configured premium
    pub owed: U256,
}

/// Read, size and quote steps that run before any state is touched.
pub struct LiquidationPreparer {
    oracle: PositionOracle,
    sizer: LiquidationSizer,
    planner: SwapPlanner,
    guard: ProfitGuard,
    pools: Arc<dyn PoolSnapshotSource>,
    premium_bps: u64,
}

impl LiquidationPreparer {
    pub fn new(config: &EngineConfig, assets: AssetRegistry, reads: ReadServices) -> Result<Self> {
        config
            .validate()
            .map_err(|e| LiquidationError::InvalidConfig(format!("{e:#}")))?;

        Ok(Self {
            oracle: PositionOracle::new(reads.positions, reads.prices),
            sizer: LiquidationSizer::new(config.liquidation.clone(), assets),
            planner: SwapPlanner::new(config.swap.clone()),
            guard: ProfitGuard::new(config.profit.min_profit_wei),
            pools: reads.pools,
            premium_bps: config.flash_loan.premium_bps,
        })
    }

    pub fn planner(&self) -> &SwapPlanner {
        &self.planner
    }

    pub fn guard(&self) -> &ProfitGuard {
        &self.guard
    }

    /// Read, size and quote a liquidation of `user` without touching state.
    pub async fn prepare(&self, user: Address) -> Result<PreparedLiquidation> {
        let position = self.oracle.read(user).await?;

        let Some(plan) = self.sizer.plan(&position) else {
            if position.is_liquidatable() {
                warn!(user = %user, "Liquidatable but no supported reserve pair");
            }
            return Err(LiquidationError::NotLiquidatable {
                user,
                health_factor: position.effective_health_factor(),
            });
        };

        let snapshot = self
            .pools
            .snapshot(
                plan.collateral_asset,
                plan.debt_asset,
                &self.planner.config().hub_tokens,
            )
            .await
            .map_err(|e| LiquidationError::OracleUnavailable(format!("pool snapshot: {e:#}")))?;

        let quote = self.planner.quote(
            &snapshot,
            plan.collateral_asset,
            plan.expected_collateral_out,
            plan.debt_asset,
        )?;

        let owed = plan.debt_amount_to_cover + premium_for(plan.debt_amount_to_cover, self.premium_bps);
        // the guaranteed output has to clear the loan before anything is sent
        self.guard.check(quote.min_output_amount, owed)?;

        debug!(
            user = %user,
            cover = %plan.debt_amount_to_cover,
            collateral_out = %plan.expected_collateral_out,
            route = %quote.route,
            expected_output = %quote.expected_output,
            min_output = %quote.min_output_amount,
            owed = %owed,
            "Liquidation prepared"
        );

        Ok(PreparedLiquidation {
            position,
            plan,
            quote,
            owed,
        })
    }
}

/// Flash-loan liquidation engine over a shared world `W`.
pub struct Liquidator<W> {
    preparer: LiquidationPreparer,
    state: StateHandle<W>,
    accounts: OperatorAccounts,
}

impl<W: ExecutionEnv + Clone> Liquidator<W> {
    pub fn new(
        config: &EngineConfig,
        assets: AssetRegistry,
        accounts: OperatorAccounts,
        reads: ReadServices,
        state: StateHandle<W>,
    ) -> Result<Self> {
        Ok(Self {
            preparer: LiquidationPreparer::new(config, assets, reads)?,
            state,
            accounts,
        })
    }

    pub fn accounts(&self) -> &OperatorAccounts {
        &self.accounts
    }

    pub fn state(&self) -> &StateHandle<W> {
        &self.state
    }

    pub async fn prepare(&self, user: Address) -> Result<PreparedLiquidation> {
        self.preparer.prepare(user).await
    }

    /// Run a prepared liquidation as one unit of work.
    ///
    /// Expected failures are reported in the result with nothing committed.
    /// Only configuration and programming errors return `Err`.
    pub fn execute(&self, prepared: PreparedLiquidation) -> Result<ExecutionResult> {
        let PreparedLiquidation { plan, quote, .. } = prepared;
        let user = plan.user;

        let mut orchestrator = FlashLoanOrchestrator::new(
            self.accounts,
            self.preparer.planner(),
            self.preparer.guard(),
        );
        let outcome = self.state.atomically(|world| orchestrator.run(world, &plan));
        let states = orchestrator.trace().history().to_vec();

        match outcome {
            Ok(profit) => Ok(ExecutionResult {
                user,
                success: true,
                profit: I256::from_raw(profit),
                outcome: Outcome::Liquidated(orchestrator.report().clone()),
                states,
                plan: Some(plan),
                quote: Some(quote),
            }),
            Err(e) if e.is_expected() => {
                Ok(ExecutionResult::failed(user, e, states, Some(plan), Some(quote)))
            }
            Err(e) => Err(e),
        }
    }

    /// Attempt to liquidate `user` end to end.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn attempt_liquidation(&self, user: Address) -> Result<ExecutionResult> {
        let started = Instant::now();

        let prepared = match self.prepare(user).await {
            Ok(p) => p,
            Err(e) if e.is_expected() => {
                info!(
                    reason = e.kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Liquidation skipped before execution"
                );
                return Ok(ExecutionResult::failed(
                    user,
                    e,
                    vec![OrchestratorState::Idle],
                    None,
                    None,
                ));
            }
            Err(e) => return Err(e),
        };
        let prepare_elapsed = started.elapsed();

        info!(
            hf = prepared.position.health_factor_f64(),
            debt_asset = %prepared.plan.debt_asset,
            collateral_asset = %prepared.plan.collateral_asset,
            cover = %prepared.plan.debt_amount_to_cover,
            "Executing liquidation"
        );

        let result = self.execute(prepared)?;
        info!(
            success = result.success,
            profit = %result.profit,
            final_state = ?result.final_state(),
            prepare_ms = prepare_elapsed.as_millis(),
            total_ms = started.elapsed().as_millis(),
            "Liquidation attempt finished"
        );
        Ok(result)
    }
}
