//! Calldata for the transactions a plan turns into.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use flashliq_core::flash_loan::encode_params;
use flashliq_core::{LiquidationPlan, SwapQuote};

use crate::contracts::{IFlashLoanReceiver, ILendingPool, IUniswapV2Router02};

/// Flash-loan interest mode: repay within the transaction, open no debt.
pub const MODE_NO_DEBT: u64 = 0;

/// `LendingPool.flashLoan` borrowing the plan's debt asset for `receiver`.
///
/// `params` carries the encoded plan, decoded again by the receiver's
/// `executeOperation`.
pub fn encode_flash_loan(receiver: Address, plan: &LiquidationPlan) -> Bytes {
    let call = ILendingPool::flashLoanCall {
        receiverAddress: receiver,
        assets: vec![plan.debt_asset],
        amounts: vec![plan.debt_amount_to_cover],
        modes: vec![U256::from(MODE_NO_DEBT)],
        onBehalfOf: receiver,
        params: encode_params(plan),
        referralCode: 0,
    };
    Bytes::from(call.abi_encode())
}

/// The `executeOperation` callback the pool makes into the receiver once the
/// loan is funded. Lets the receiver be dry-run with `eth_call`.
pub fn encode_execute_operation(initiator: Address, plan: &LiquidationPlan, premium: U256) -> Bytes {
    let call = IFlashLoanReceiver::executeOperationCall {
        assets: vec![plan.debt_asset],
        amounts: vec![plan.debt_amount_to_cover],
        premiums: vec![premium],
        initiator,
        params: encode_params(plan),
    };
    Bytes::from(call.abi_encode())
}

/// `LendingPool.liquidationCall` for the plan, receiving the underlying.
pub fn encode_liquidation_call(plan: &LiquidationPlan) -> Bytes {
    let call = ILendingPool::liquidationCallCall {
        collateralAsset: plan.collateral_asset,
        debtAsset: plan.debt_asset,
        user: plan.user,
        debtToCover: plan.debt_amount_to_cover,
        receiveAToken: false,
    };
    Bytes::from(call.abi_encode())
}

/// Router swap for a quote. `path` follows the route's token order.
pub fn encode_swap(quote: &SwapQuote, to: Address, deadline: u64) -> Bytes {
    let call = IUniswapV2Router02::swapExactTokensForTokensCall {
        amountIn: quote.input_amount,
        amountOutMin: quote.min_output_amount,
        path: quote.route.path().to_vec(),
        to,
        deadline: U256::from(deadline),
    };
    Bytes::from(call.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use flashliq_core::config::SwapConfig;
    use flashliq_core::flash_loan::decode_params;
    use flashliq_core::{Pool, PoolSnapshot, SwapPlanner};

    fn plan() -> LiquidationPlan {
        LiquidationPlan {
            user: address!("59CE4a2AC5bC3f5F225439B2993b86B42f6d3e9F"),
            debt_asset: address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            debt_amount_to_cover: U256::from(8_000_000_000_000u64),
            collateral_asset: address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
            expected_collateral_out: U256::from(22_646_709_677u64),
            liquidation_bonus_bps: 650,
        }
    }

    #[test]
    fn test_encode_liquidation_call() {
        let data = encode_liquidation_call(&plan());
        assert_eq!(&data[..4], &ILendingPool::liquidationCallCall::SELECTOR);
        // selector + 5 static words
        assert_eq!(data.len(), 4 + 5 * 32);

        let decoded = ILendingPool::liquidationCallCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.user, plan().user);
        assert!(!decoded.receiveAToken);
    }

    #[test]
    fn test_flash_loan_carries_plan() {
        let receiver = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        let data = encode_flash_loan(receiver, &plan());
        assert_eq!(&data[..4], &ILendingPool::flashLoanCall::SELECTOR);

        let call = ILendingPool::flashLoanCall::abi_decode(&data, true).unwrap();
        assert_eq!(call.receiverAddress, receiver);
        assert_eq!(call.onBehalfOf, receiver);
        assert_eq!(call.assets, vec![plan().debt_asset]);
        assert_eq!(call.modes, vec![U256::ZERO]);
        assert_eq!(decode_params(&call.params).unwrap(), plan());
    }

    #[test]
    fn test_callback_matches_the_loan() {
        let operator = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        // 9 bps of 8M USDT
        let premium = U256::from(7_200_000_000u64);
        let data = encode_execute_operation(operator, &plan(), premium);
        assert_eq!(&data[..4], &IFlashLoanReceiver::executeOperationCall::SELECTOR);

        let call = IFlashLoanReceiver::executeOperationCall::abi_decode(&data, true).unwrap();
        assert_eq!(call.initiator, operator);
        assert_eq!(call.amounts, vec![plan().debt_amount_to_cover]);
        assert_eq!(call.premiums, vec![premium]);
        assert_eq!(decode_params(&call.params).unwrap(), plan());
    }

    #[test]
    fn test_swap_selector() {
        // swapExactTokensForTokens(uint256,uint256,address[],address,uint256)
        assert_eq!(
            IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR,
            [0x38, 0xed, 0x17, 0x39]
        );
    }

    #[test]
    fn test_encode_swap_follows_route() {
        let (a, b) = (plan().collateral_asset, plan().debt_asset);
        let wad = U256::from(10u64).pow(U256::from(18u64));
        let pool = Pool::fixed_rate(
            address!("00000000000000000000000000000000000000aa"),
            a,
            b,
            wad * U256::from(1_000u64),
            wad * U256::from(1_000u64),
            U256::from(2u64),
            U256::from(1u64),
            0,
        );
        let planner = SwapPlanner::new(SwapConfig::default());
        let quote = planner
            .quote(&PoolSnapshot::new(vec![pool]), a, wad, b)
            .unwrap();

        let to = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let data = encode_swap(&quote, to, 1_700_000_000);
        let call = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(&data, true).unwrap();
        assert_eq!(call.path, vec![a, b]);
        assert_eq!(call.amountIn, wad);
        assert_eq!(call.amountOutMin, quote.min_output_amount);
        assert_eq!(call.to, to);
    }
}
