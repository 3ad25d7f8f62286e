//! Deployment file: where the protocol lives and who receives profit.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::EngineConfig;
use crate::assets::{Asset, AssetRegistry};

/// One deployment (chain + protocol instance + operator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment name (e.g., "aave-v2-mainnet")
    pub name: String,
    pub chain_id: u64,
    /// HTTP endpoint, usually given as `${VAR}`
    pub rpc_url: String,
    pub contracts: DeploymentContracts,
    /// Flash-loan receiver contract that runs the callback
    pub operator: Address,
    /// Address the residual debt asset is swept to
    pub profit_receiver: Address,
    /// Engine profile name, overridden by ENGINE_PROFILE
    #[serde(default)]
    pub engine_profile: Option<String>,
    /// Supported assets; the mainnet set when empty
    #[serde(default)]
    pub assets: Vec<DeploymentAsset>,
}

/// Protocol and venue contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContracts {
    /// Lending pool (also the flash-loan source)
    pub lending_pool: Address,
    pub data_provider: Address,
    pub price_oracle: Address,
    pub uniswap_v2_factory: Address,
    /// Router the receiver swaps seized collateral through
    pub uniswap_v2_router: Address,
}

/// Asset entry in a deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentAsset {
    pub symbol: String,
    pub token: Address,
    pub decimals: u8,
}

impl Deployment {
    /// Load a deployment from a TOML file and expand environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment file {}", path.display()))?;
        let deployment = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse deployment file {}", path.display()))?;
        info!(
            name = %deployment.name,
            chain_id = deployment.chain_id,
            assets = deployment.assets.len(),
            "Deployment loaded"
        );
        Ok(deployment)
    }

    /// Parse a deployment from TOML text, expanding `${VAR}` first.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let deployment: Self = toml::from_str(&expand_env(content))?;
        anyhow::ensure!(
            !deployment.rpc_url.contains("${"),
            "rpc_url references an unset environment variable: {}",
            deployment.rpc_url
        );
        Ok(deployment)
    }

    /// Deployment named by DEPLOYMENT_FILE, falling back to `default_path`.
    pub fn from_env(default_path: &str) -> Result<Self> {
        let path = std::env::var("DEPLOYMENT_FILE").unwrap_or_else(|_| default_path.to_string());
        Self::from_file(path)
    }

    /// Supported assets as a registry.
    pub fn asset_registry(&self) -> AssetRegistry {
        if self.assets.is_empty() {
            return AssetRegistry::mainnet();
        }
        AssetRegistry::new(self.assets.iter().map(|a| Asset {
            symbol: a.symbol.clone().into(),
            token: a.token,
            decimals: a.decimals,
        }))
    }

    /// Engine configuration: ENGINE_PROFILE wins over the file's profile.
    pub fn engine_config(&self) -> EngineConfig {
        match (std::env::var("ENGINE_PROFILE").ok(), &self.engine_profile) {
            (Some(profile), _) => EngineConfig::from_profile(&profile),
            (None, Some(profile)) => EngineConfig::from_profile(profile),
            (None, None) => EngineConfig::default(),
        }
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left in place.
pub fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
