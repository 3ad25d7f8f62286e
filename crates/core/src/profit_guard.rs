//! Post-swap profitability check.

use alloy::primitives::U256;
use tracing::debug;

use crate::error::{LiquidationError, Result};

/// Rejects any settlement whose debt-asset balance does not repay the loan
/// plus premium with at least `min_profit` left over.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfitGuard {
    min_profit: U256,
}

impl ProfitGuard {
    pub fn new(min_profit: U256) -> Self {
        Self { min_profit }
    }

    /// Profit (`balance - owed`) if acceptable, else `Unprofitable`.
    pub fn check(&self, balance_after_swap: U256, owed: U256) -> Result<U256> {
        let unprofitable = || LiquidationError::Unprofitable {
            balance: balance_after_swap,
            owed,
            min_profit: self.min_profit,
        };

        let profit = balance_after_swap.checked_sub(owed).ok_or_else(unprofitable)?;
        if profit < self.min_profit {
            return Err(unprofitable());
        }

        debug!(balance = %balance_after_swap, owed = %owed, profit = %profit, "Profit guard passed");
        Ok(profit)
    }
}
