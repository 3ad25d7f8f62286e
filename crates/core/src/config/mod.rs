//! Configuration for the liquidation engine.
//!
//! - Engine configuration (profiles, sizing, routing, settlement)
//! - Deployment configuration (RPC, contract addresses, operator, assets)

mod deployment;
mod engine;

pub use deployment::{expand_env, Deployment, DeploymentAsset, DeploymentContracts};
pub use engine::{
    BonusOverride, EngineConfig, FlashLoanConfig, LiquidationConfig, ProfitConfig, SwapConfig,
};
