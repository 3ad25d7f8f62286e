//! Error taxonomy for a liquidation attempt.

use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::orchestrator::OrchestratorState;

/// Every way a liquidation attempt can end without profit.
///
/// The first group are expected outcomes and end up inside an
/// [`ExecutionResult`](crate::ExecutionResult). The second group are
/// programming or configuration errors and are returned as `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiquidationError {
    /// Price feed or account-data read failed before anything was sent.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Health factor is at or above 1.0.
    #[error("position {user} not liquidatable (health factor {health_factor})")]
    NotLiquidatable { user: Address, health_factor: U256 },

    /// No swap route satisfies the configured price-impact bound.
    #[error("no route from {input} to {output} within {max_price_impact_bps} bps price impact")]
    NoRoute {
        input: Address,
        output: Address,
        max_price_impact_bps: u16,
    },

    /// Debt-asset balance cannot cover the flash loan plus premium.
    #[error("unprofitable: balance {balance} does not cover owed {owed} plus minimum profit {min_profit}")]
    Unprofitable {
        balance: U256,
        owed: U256,
        min_profit: U256,
    },

    /// Another liquidator cleared the position first.
    #[error("race lost: position {user} no longer liquidatable")]
    RaceLost { user: Address },

    /// The lending protocol rejected the liquidation call.
    #[error("liquidation call reverted: {0}")]
    LiquidationReverted(String),

    /// The swap venue reverted (insufficient output, missing pool).
    #[error("swap reverted: {0}")]
    SwapReverted(String),

    /// The flash-loan source refused to lend or the receiver declined.
    #[error("flash loan failed: {0}")]
    FlashLoanFailed(String),

    /// A transfer inside the unit of work found too little balance.
    #[error("insufficient balance of {token} for {holder}: have {available}, need {required}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        available: U256,
        required: U256,
    },

    /// A `transfer_from` exceeded the approved allowance.
    #[error("insufficient allowance of {token} from {owner} to {spender}: have {available}, need {required}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        available: U256,
        required: U256,
    },

    /// Flash-loan arrays of unequal length, or an unexpected caller.
    #[error("malformed flash loan request: {0}")]
    MalformedRequest(String),

    /// Params blob failed to decode.
    #[error("invalid callback params: {0}")]
    InvalidParams(String),

    /// Engine configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// State machine driven out of order.
    #[error("invalid orchestrator transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },
}

impl LiquidationError {
    /// Expected outcomes are reported in the result, everything else is a bug
    /// in the caller, the configuration, or a collaborator.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            Self::MalformedRequest(_)
                | Self::InvalidParams(_)
                | Self::InvalidConfig(_)
                | Self::InvalidTransition { .. }
        )
    }

    /// Whether the error was raised before any on-chain effect was attempted.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Self::OracleUnavailable(_) | Self::NotLiquidatable { .. } | Self::NoRoute { .. }
        )
    }

    /// Short machine-readable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OracleUnavailable(_) => "oracle_unavailable",
            Self::NotLiquidatable { .. } => "not_liquidatable",
            Self::NoRoute { .. } => "no_route",
            Self::Unprofitable { .. } => "unprofitable",
            Self::RaceLost { .. } => "race_lost",
            Self::LiquidationReverted(_) => "liquidation_reverted",
            Self::SwapReverted(_) => "swap_reverted",
            Self::FlashLoanFailed(_) => "flash_loan_failed",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientAllowance { .. } => "insufficient_allowance",
            Self::MalformedRequest(_) => "malformed_request",
            Self::InvalidParams(_) => "invalid_params",
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

pub type Result<T> = std::result::Result<T, LiquidationError>;
