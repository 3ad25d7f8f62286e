//! Flash-loan liquidation engine.
//!
//! Commands:
//! - `flashliq plan <user>`: read a position over RPC, size the liquidation,
//!   quote the collateral swap and print the calldata of the flash loan, the
//!   receiver callback, the liquidation and the swap. Sends nothing.
//! - `flashliq simulate`: run one full attempt against a simulated fork of
//!   the WBTC/USDT position liquidated at mainnet block 12489619.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{bail, ensure, Context, Result};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashliq_chain::calldata::{
    encode_execute_operation, encode_flash_loan, encode_liquidation_call, encode_swap,
};
use flashliq_core::sim::{scenario, SimChain};
use flashliq_core::{
    AssetRegistry, Deployment, EngineConfig, ExecutionResult, LiquidationError,
    LiquidationPreparer, Liquidator, Outcome, PreparedLiquidation, ReadServices, StateHandle,
    SwapQuote,
};

/// Environment variable names.
mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_DEPLOYMENT: &str = "deployments/mainnet.toml";

/// Validity window for the router call in `plan` output.
const SWAP_DEADLINE_SECS: u64 = 300;

const USAGE: &str = "usage: flashliq plan <user> | flashliq simulate";

enum Command {
    Plan(Address),
    Simulate,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    match args.next().as_deref() {
        Some("plan") => {
            let user = args.next().context(USAGE)?;
            let user = user
                .parse()
                .with_context(|| format!("invalid user address {user}"))?;
            Ok(Command::Plan(user))
        }
        Some("simulate") => Ok(Command::Simulate),
        _ => bail!(USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = parse_args(std::env::args().skip(1))?;
    let output = match command {
        Command::Plan(user) => plan(user).await?,
        Command::Simulate => simulate().await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flashliq_core=debug,flashliq_chain=debug"));

    let json_logs = std::env::var(env::LOG_FORMAT).is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

async fn plan(user: Address) -> Result<Value> {
    let deployment = Deployment::from_env(DEFAULT_DEPLOYMENT)?;
    let positions = Arc::new(flashliq_chain::position_reader(&deployment));

    let chain_id = positions.connect_check().await?;
    ensure!(
        chain_id == deployment.chain_id,
        "rpc_url serves chain {chain_id}, deployment {} expects {}",
        deployment.name,
        deployment.chain_id
    );

    // size the loan with the premium the pool actually charges
    let mut config = deployment.engine_config();
    config.flash_loan.premium_bps = positions
        .flash_loan_premium_bps()
        .await
        .context("reading FLASHLOAN_PREMIUM_TOTAL")?;
    config.log_config();

    let assets = deployment.asset_registry();
    let preparer = LiquidationPreparer::new(
        &config,
        assets.clone(),
        flashliq_chain::read_services(&deployment, positions),
    )?;

    info!(user = %user, deployment = %deployment.name, "Planning liquidation");
    match preparer.prepare(user).await {
        Ok(prepared) => Ok(prepared_json(&prepared, &deployment, &assets)),
        Err(e) if e.is_expected() => Ok(json!({
            "user": user.to_string(),
            "liquidatable": false,
            "reason": e.kind(),
            "error": e.to_string(),
        })),
        Err(e) => Err(e.into()),
    }
}

async fn simulate() -> Result<Value> {
    let config = EngineConfig::from_env();
    config.log_config();

    let s = scenario::mainnet_replica();
    let state = StateHandle::new(s.world);
    let chain = Arc::new(SimChain::new(state.clone()));
    let liquidator = Liquidator::new(
        &config,
        s.assets.clone(),
        s.accounts,
        ReadServices::shared(chain),
        state,
    )?;

    info!(user = %s.user, "Simulating liquidation on mainnet replica");
    let result = liquidator.attempt_liquidation(s.user).await?;
    Ok(result_json(&result, &s.assets))
}

fn quote_json(quote: &SwapQuote, assets: &AssetRegistry) -> Value {
    let path: Vec<String> = quote.route.path().iter().map(|t| assets.symbol(t)).collect();
    json!({
        "route": path,
        "pools": quote.route.pools().map(|p| p.to_string()).collect::<Vec<_>>(),
        "input_amount": quote.input_amount.to_string(),
        "expected_output": quote.expected_output.to_string(),
        "min_output_amount": quote.min_output_amount.to_string(),
        "price_impact_bps": quote.price_impact_bps,
    })
}

fn prepared_json(prepared: &PreparedLiquidation, deployment: &Deployment, assets: &AssetRegistry) -> Value {
    let plan = &prepared.plan;
    let premium = prepared.owed - plan.debt_amount_to_cover;
    let deadline = chrono::Utc::now().timestamp().unsigned_abs() + SWAP_DEADLINE_SECS;
    json!({
        "user": plan.user.to_string(),
        "liquidatable": true,
        "health_factor": prepared.position.health_factor_f64(),
        "plan": {
            "debt_asset": assets.symbol(&plan.debt_asset),
            "debt_amount_to_cover": plan.debt_amount_to_cover.to_string(),
            "collateral_asset": assets.symbol(&plan.collateral_asset),
            "expected_collateral_out": plan.expected_collateral_out.to_string(),
            "liquidation_bonus_bps": plan.liquidation_bonus_bps,
        },
        "quote": quote_json(&prepared.quote, assets),
        "flash_loan_premium": premium.to_string(),
        "flash_loan_owed": prepared.owed.to_string(),
        "transaction": {
            "to": deployment.contracts.lending_pool.to_string(),
            "data": format!("0x{}", hex::encode(encode_flash_loan(deployment.operator, plan))),
        },
        "callback": {
            "to": deployment.operator.to_string(),
            "data": format!(
                "0x{}",
                hex::encode(encode_execute_operation(deployment.operator, plan, premium))
            ),
        },
        "liquidation_call": format!("0x{}", hex::encode(encode_liquidation_call(plan))),
        "swap": {
            "to": deployment.contracts.uniswap_v2_router.to_string(),
            "data": format!(
                "0x{}",
                hex::encode(encode_swap(&prepared.quote, deployment.operator, deadline))
            ),
        },
    })
}

fn result_json(result: &ExecutionResult, assets: &AssetRegistry) -> Value {
    let outcome = match &result.outcome {
        Outcome::Liquidated(report) => json!({
            "liquidated": {
                "debt_repaid": report.debt_repaid.to_string(),
                "collateral_received": report.collateral_received.to_string(),
                "swap_output": report.swap_output.to_string(),
                "flash_loan_owed": report.flash_loan_owed.to_string(),
                "balance_after_swap": report.balance_after_swap.to_string(),
            }
        }),
        Outcome::Failed(e) => error_json(e),
    };

    json!({
        "user": result.user.to_string(),
        "success": result.success,
        "profit": result.profit.to_string(),
        "outcome": outcome,
        "states": result.states.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>(),
        "plan": result.plan.as_ref().map(|p| json!({
            "debt_asset": assets.symbol(&p.debt_asset),
            "debt_amount_to_cover": p.debt_amount_to_cover.to_string(),
            "collateral_asset": assets.symbol(&p.collateral_asset),
            "expected_collateral_out": p.expected_collateral_out.to_string(),
        })),
        "quote": result.quote.as_ref().map(|q| quote_json(q, assets)),
    })
}

fn error_json(e: &LiquidationError) -> Value {
    json!({ "failed": { "reason": e.kind(), "error": e.to_string() } })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args() {
        let user = "0x59CE4a2AC5bC3f5F225439B2993b86B42f6d3e9F";
        assert!(matches!(parse_args(args(&["plan", user])), Ok(Command::Plan(u)) if u == scenario::FORK_TARGET_USER));
        assert!(matches!(parse_args(args(&["simulate"])), Ok(Command::Simulate)));
        assert!(parse_args(args(&["plan"])).is_err());
        assert!(parse_args(args(&["plan", "0x1234"])).is_err());
        assert!(parse_args(args(&[])).is_err());
    }

    #[tokio::test]
    async fn test_simulate_reports_success() {
        let output = simulate().await.unwrap();
        assert_eq!(output["success"], json!(true));
        assert_eq!(output["quote"]["route"], json!(["WBTC", "WETH", "USDT"]));
        assert_eq!(output["states"].as_array().unwrap().len(), 5);
    }
}
