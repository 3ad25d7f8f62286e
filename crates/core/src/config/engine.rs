//! Engine configuration with profile support.
//!
//! Every component receives its slice of this struct explicitly; there is no
//! process-wide configuration.

use alloy::primitives::{Address, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assets::{USDC, WETH};
use crate::swap::MAX_ROUTE_HOPS;

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Sizing parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Route search and slippage bound
    #[serde(default)]
    pub swap: SwapConfig,

    /// Flash-loan source parameters
    #[serde(default)]
    pub flash_loan: FlashLoanConfig,

    /// Settlement threshold
    #[serde(default)]
    pub profit: ProfitConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Liquidation sizing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Share of a debt reserve one call may repay (basis points)
    #[serde(default = "default_close_factor")]
    pub close_factor_bps: u64,

    /// Bonus assumed when the protocol reports none (basis points above par)
    #[serde(default = "default_liquidation_bonus")]
    pub default_liquidation_bonus_bps: u64,

    /// Per-asset bonus that replaces the protocol figure
    #[serde(default)]
    pub bonus_overrides: Vec<BonusOverride>,
}

/// Fixed liquidation bonus for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusOverride {
    pub asset: Address,
    pub bonus_bps: u64,
}

fn default_close_factor() -> u64 {
    5_000
}
fn default_liquidation_bonus() -> u64 {
    500
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            close_factor_bps: default_close_factor(),
            default_liquidation_bonus_bps: default_liquidation_bonus(),
            bonus_overrides: Vec::new(),
        }
    }
}

impl LiquidationConfig {
    /// Bonus for `asset`: override, else the protocol value, else the default.
    pub fn bonus_for(&self, asset: &Address, protocol_bonus_bps: u64) -> u64 {
        if let Some(o) = self.bonus_overrides.iter().find(|o| &o.asset == asset) {
            return o.bonus_bps;
        }
        if protocol_bonus_bps > 0 {
            protocol_bonus_bps
        } else {
            self.default_liquidation_bonus_bps
        }
    }
}

/// Swap routing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Largest admitted shortfall of simulated against marginal output
    #[serde(default = "default_max_price_impact")]
    pub max_price_impact_bps: u16,

    /// Longest route searched
    #[serde(default = "default_max_hops")]
    pub max_hops: u8,

    /// Intermediate tokens for multi-hop routes
    #[serde(default = "default_hub_tokens")]
    pub hub_tokens: Vec<Address>,
}

fn default_max_price_impact() -> u16 {
    100
}
fn default_max_hops() -> u8 {
    2
}
fn default_hub_tokens() -> Vec<Address> {
    vec![WETH.token, USDC.token]
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            max_price_impact_bps: default_max_price_impact(),
            max_hops: default_max_hops(),
            hub_tokens: default_hub_tokens(),
        }
    }
}

/// Flash-loan parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLoanConfig {
    /// Premium assumed for the pre-execution check (basis points)
    #[serde(default = "default_premium")]
    pub premium_bps: u64,
}

fn default_premium() -> u64 {
    9
}

impl Default for FlashLoanConfig {
    fn default() -> Self {
        Self {
            premium_bps: default_premium(),
        }
    }
}

/// Profit threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitConfig {
    /// Residual below this (in debt-asset units) aborts the unit
    #[serde(default)]
    pub min_profit_wei: U256,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            liquidation: LiquidationConfig::default(),
            swap: SwapConfig::default(),
            flash_loan: FlashLoanConfig::default(),
            profit: ProfitConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Tight slippage and a profit floor.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            liquidation: LiquidationConfig::default(),
            swap: SwapConfig {
                max_price_impact_bps: 50,
                max_hops: 1,
                hub_tokens: Vec::new(),
            },
            flash_loan: FlashLoanConfig::default(),
            profit: ProfitConfig {
                // 0.01 units of an 18-decimal debt asset
                min_profit_wei: U256::from(10_000_000_000_000_000u64),
            },
        }
    }

    /// Wider routes and slippage, any positive residual settles.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            liquidation: LiquidationConfig::default(),
            swap: SwapConfig {
                max_price_impact_bps: 300,
                max_hops: MAX_ROUTE_HOPS as u8,
                hub_tokens: default_hub_tokens(),
            },
            flash_loan: FlashLoanConfig::default(),
            profit: ProfitConfig::default(),
        }
    }

    /// Get profile from environment variable ENGINE_PROFILE, or default.
    /// Supported values: default, conservative, aggressive
    pub fn from_env() -> Self {
        let profile = std::env::var("ENGINE_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::from_profile(&profile)
    }

    /// Named profile; unknown names fall back to the default.
    pub fn from_profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=10_000).contains(&self.liquidation.close_factor_bps),
            "close_factor_bps must be in 1..=10000, got {}",
            self.liquidation.close_factor_bps
        );
        anyhow::ensure!(
            self.swap.max_price_impact_bps <= 10_000,
            "max_price_impact_bps must be at most 10000, got {}",
            self.swap.max_price_impact_bps
        );
        anyhow::ensure!(
            (1..=MAX_ROUTE_HOPS as u8).contains(&self.swap.max_hops),
            "max_hops must be in 1..={MAX_ROUTE_HOPS}, got {}",
            self.swap.max_hops
        );
        anyhow::ensure!(
            self.flash_loan.premium_bps < 10_000,
            "premium_bps must be below 10000, got {}",
            self.flash_loan.premium_bps
        );
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            close_factor_bps = self.liquidation.close_factor_bps,
            default_bonus_bps = self.liquidation.default_liquidation_bonus_bps,
            bonus_overrides = self.liquidation.bonus_overrides.len(),
            "Liquidation parameters"
        );
        tracing::info!(
            max_price_impact_bps = self.swap.max_price_impact_bps,
            max_hops = self.swap.max_hops,
            hub_tokens = self.swap.hub_tokens.len(),
            "Swap parameters"
        );
        tracing::info!(
            premium_bps = self.flash_loan.premium_bps,
            min_profit = %self.profit.min_profit_wei,
            "Settlement parameters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.liquidation.close_factor_bps, 5_000);
        assert_eq!(config.flash_loan.premium_bps, 9);
        assert_eq!(config.swap.max_hops, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(EngineConfig::from_profile("conservative").swap.max_price_impact_bps, 50);
        assert_eq!(EngineConfig::from_profile("AGGRO").profile, "aggressive");
        assert_eq!(EngineConfig::from_profile("unknown").profile, "default");
        assert!(EngineConfig::conservative().validate().is_ok());
        assert!(EngineConfig::aggressive().validate().is_ok());
    }

    #[test]
    fn test_bonus_resolution() {
        let asset = Address::repeat_byte(1);
        let mut config = LiquidationConfig::default();
        assert_eq!(config.bonus_for(&asset, 0), 500);
        assert_eq!(config.bonus_for(&asset, 750), 750);
        config.bonus_overrides.push(BonusOverride {
            asset,
            bonus_bps: 1_000,
        });
        assert_eq!(config.bonus_for(&asset, 750), 1_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.liquidation.close_factor_bps = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.swap.max_hops = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            profile = "custom"

            [swap]
            max_price_impact_bps = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.profile, "custom");
        assert_eq!(config.swap.max_price_impact_bps, 250);
        assert_eq!(config.swap.max_hops, 2);
        assert_eq!(config.liquidation, LiquidationConfig::default());
    }

    #[test]
    fn test_serialization() {
        let config = EngineConfig::aggressive();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"aggressive\""));

        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
