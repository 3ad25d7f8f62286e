//! Flash-loan state machine and the in-unit callback.
//!
//! ```text
//! Idle -> Requested -> InCallback -> Repaying -> Settled(Profitable)
//!            |             |            |
//!            +-------------+------------+-----> Settled(Aborted)
//! ```
//!
//! Everything from `Requested` on happens inside one unit of work. Any error
//! ends in `Settled(Aborted)` and the unit discards every effect.

use alloy::primitives::{Address, Bytes, U256};
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::error::{LiquidationError, Result};
use crate::flash_loan::{decode_params, encode_params, FlashLoanRequest};
use crate::profit_guard::ProfitGuard;
use crate::services::{ExecutionEnv, FlashLoanReceiver, LiquidationCall};
use crate::sizer::LiquidationPlan;
use crate::swap::SwapPlanner;

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Settlement {
    Profitable,
    Aborted,
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrchestratorState {
    Idle,
    Requested,
    InCallback,
    Repaying,
    Settled(Settlement),
}

impl OrchestratorState {
    /// Legal single-step transitions.
    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Idle, Requested)
                | (Requested, InCallback)
                | (InCallback, Repaying)
                | (Repaying, Settled(Settlement::Profitable))
                | (Requested | InCallback | Repaying, Settled(Settlement::Aborted))
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

/// Current state plus every state visited.
#[derive(Debug, Clone)]
pub struct StateTrace {
    current: OrchestratorState,
    history: SmallVec<[OrchestratorState; 6]>,
}

impl Default for StateTrace {
    fn default() -> Self {
        let mut history = SmallVec::new();
        history.push(OrchestratorState::Idle);
        Self {
            current: OrchestratorState::Idle,
            history,
        }
    }
}

impl StateTrace {
    pub fn current(&self) -> OrchestratorState {
        self.current
    }

    pub fn history(&self) -> &[OrchestratorState] {
        &self.history
    }

    /// Move to `next`, or fail with `InvalidTransition`.
    pub fn advance(&mut self, next: OrchestratorState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(LiquidationError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

/// Amounts observed inside the callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallbackReport {
    pub debt_repaid: U256,
    pub collateral_received: U256,
    pub swap_output: U256,
    pub flash_loan_owed: U256,
    /// Debt asset gained by this attempt: balance after the swap minus the
    /// operator's balance before the loan
    pub balance_after_swap: U256,
    pub profit: U256,
}

/// Addresses the orchestrator acts for and trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAccounts {
    /// Receiver contract: initiator of the loan and holder of funds
    pub operator: Address,
    /// Only caller allowed to invoke the callback
    pub flash_loan_source: Address,
    /// Residual debt asset is swept here at settlement
    pub profit_receiver: Address,
}

/// Drives one flash-loan liquidation through the state machine.
pub struct FlashLoanOrchestrator<'a> {
    accounts: OperatorAccounts,
    planner: &'a SwapPlanner,
    guard: &'a ProfitGuard,
    trace: StateTrace,
    report: CallbackReport,
    /// Operator's debt-asset balance before the loan; never counted as profit
    baseline: U256,
}

impl<'a> FlashLoanOrchestrator<'a> {
    pub fn new(
        accounts: OperatorAccounts,
        planner: &'a SwapPlanner,
        guard: &'a ProfitGuard,
    ) -> Self {
        Self {
            accounts,
            planner,
            guard,
            trace: StateTrace::default(),
            report: CallbackReport::default(),
            baseline: U256::ZERO,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.trace.current()
    }

    pub fn trace(&self) -> &StateTrace {
        &self.trace
    }

    pub fn report(&self) -> &CallbackReport {
        &self.report
    }

    /// Borrow, liquidate, swap, repay and sweep the profit.
    ///
    /// Must run inside a unit of work: on `Err` the caller discards `world`.
    /// Returns the profit swept to the receiver.
    pub fn run<W: ExecutionEnv>(&mut self, world: &mut W, plan: &LiquidationPlan) -> Result<U256> {
        self.trace.advance(OrchestratorState::Requested)?;

        match self.borrow_and_settle(world, plan) {
            Ok(profit) => {
                self.trace
                    .advance(OrchestratorState::Settled(Settlement::Profitable))?;
                Ok(profit)
            }
            Err(e) => {
                // a broken state machine is reported as such, not as an abort
                if matches!(e, LiquidationError::InvalidTransition { .. }) {
                    return Err(e);
                }
                self.trace
                    .advance(OrchestratorState::Settled(Settlement::Aborted))?;
                warn!(
                    user = %plan.user,
                    reason = e.kind(),
                    error = %e,
                    "Liquidation aborted, unit discarded"
                );
                Err(e)
            }
        }
    }

    fn borrow_and_settle<W: ExecutionEnv>(
        &mut self,
        world: &mut W,
        plan: &LiquidationPlan,
    ) -> Result<U256> {
        let operator = self.accounts.operator;
        let params = encode_params(plan);
        self.baseline = world.balance_of(plan.debt_asset, operator);

        world.flash_loan(
            operator,
            operator,
            &mut *self,
            &[plan.debt_asset],
            &[plan.debt_amount_to_cover],
            params,
        )?;

        if self.trace.current() != OrchestratorState::Repaying {
            return Err(LiquidationError::InvalidTransition {
                from: self.trace.current(),
                to: OrchestratorState::Settled(Settlement::Profitable),
            });
        }

        // what this attempt left after the source pulled `owed`
        let residual = world
            .balance_of(plan.debt_asset, operator)
            .saturating_sub(self.baseline);
        if !residual.is_zero() {
            world.transfer(plan.debt_asset, operator, self.accounts.profit_receiver, residual)?;
        }
        self.report.profit = residual;

        info!(
            user = %plan.user,
            debt_repaid = %self.report.debt_repaid,
            collateral = %self.report.collateral_received,
            swap_output = %self.report.swap_output,
            owed = %self.report.flash_loan_owed,
            profit = %residual,
            "Liquidation settled"
        );
        Ok(residual)
    }

    fn validate_call<W: ExecutionEnv>(
        &self,
        world: &W,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &Bytes,
    ) -> Result<(FlashLoanRequest, LiquidationPlan)> {
        if world.flash_loan_source() != self.accounts.flash_loan_source {
            return Err(LiquidationError::MalformedRequest(format!(
                "callback from {}, expected {}",
                world.flash_loan_source(),
                self.accounts.flash_loan_source
            )));
        }
        if initiator != self.accounts.operator {
            return Err(LiquidationError::MalformedRequest(format!(
                "initiator {initiator} is not the operator"
            )));
        }

        let request = FlashLoanRequest::new(assets, amounts, premiums)?;
        if request.assets().len() != 1 {
            return Err(LiquidationError::MalformedRequest(format!(
                "expected one asset, got {}",
                request.assets().len()
            )));
        }

        let plan = decode_params(params)?;
        if plan.debt_asset != assets[0] || plan.debt_amount_to_cover != amounts[0] {
            return Err(LiquidationError::InvalidParams(
                "params disagree with the borrowed leg".into(),
            ));
        }
        Ok((request, plan))
    }

    fn liquidate_and_swap<W: ExecutionEnv>(
        &mut self,
        world: &mut W,
        request: &FlashLoanRequest,
        plan: &LiquidationPlan,
    ) -> Result<()> {
        let operator = self.accounts.operator;

        world.approve(
            plan.debt_asset,
            operator,
            world.lending_pool(),
            plan.debt_amount_to_cover,
        );
        let outcome = world.liquidation_call(
            operator,
            &LiquidationCall {
                collateral_asset: plan.collateral_asset,
                debt_asset: plan.debt_asset,
                user: plan.user,
                debt_to_cover: plan.debt_amount_to_cover,
                receive_a_token: false,
            },
        )?;
        self.report.debt_repaid = outcome.debt_repaid;
        self.report.collateral_received = outcome.collateral_received;
        debug!(
            repaid = %outcome.debt_repaid,
            seized = %outcome.collateral_received,
            "Liquidation call done"
        );

        // fresh quote for what was actually seized
        let quote = self.planner.quote(
            &*world,
            plan.collateral_asset,
            outcome.collateral_received,
            plan.debt_asset,
        )?;
        if !quote.route.is_empty() {
            world.approve(
                plan.collateral_asset,
                operator,
                world.swap_router(),
                outcome.collateral_received,
            );
            self.report.swap_output = world.swap(operator, &quote)?;
        } else {
            self.report.swap_output = outcome.collateral_received;
        }

        let owed = request.owed(0).unwrap_or_default();
        let gained = world
            .balance_of(plan.debt_asset, operator)
            .saturating_sub(self.baseline);
        self.report.flash_loan_owed = owed;
        self.report.balance_after_swap = gained;

        self.guard.check(gained, owed)?;
        self.trace.advance(OrchestratorState::Repaying)?;

        world.approve(plan.debt_asset, operator, world.flash_loan_source(), owed);
        Ok(())
    }
}

impl<W: ExecutionEnv> FlashLoanReceiver<W> for FlashLoanOrchestrator<'_> {
    fn execute_operation(
        &mut self,
        world: &mut W,
        assets: &[Address],
        amounts: &[U256],
        premiums: &[U256],
        initiator: Address,
        params: &Bytes,
    ) -> Result<bool> {
        self.trace.advance(OrchestratorState::InCallback)?;
        let (request, plan) =
            self.validate_call(world, assets, amounts, premiums, initiator, params)?;
        self.liquidate_and_swap(world, &request, &plan)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestratorState::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut trace = StateTrace::default();
        for next in [Requested, InCallback, Repaying, Settled(Settlement::Profitable)] {
            trace.advance(next).unwrap();
        }
        assert!(trace.current().is_terminal());
        assert_eq!(trace.history().len(), 5);
    }

    #[test]
    fn test_abort_from_any_active_state() {
        for stop in [Requested, InCallback, Repaying] {
            let mut trace = StateTrace::default();
            for next in [Requested, InCallback, Repaying] {
                trace.advance(next).unwrap();
                if next == stop {
                    break;
                }
            }
            trace.advance(Settled(Settlement::Aborted)).unwrap();
            assert_eq!(trace.current(), Settled(Settlement::Aborted));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        let mut trace = StateTrace::default();
        let err = trace.advance(Repaying).unwrap_err();
        assert_eq!(err, LiquidationError::InvalidTransition { from: Idle, to: Repaying });
        assert!(trace.advance(Settled(Settlement::Aborted)).is_err());

        trace.advance(Requested).unwrap();
        assert!(trace.advance(Settled(Settlement::Profitable)).is_err());

        // terminal states are final
        trace.advance(Settled(Settlement::Aborted)).unwrap();
        assert!(trace.advance(Requested).is_err());
    }
}
