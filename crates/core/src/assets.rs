//! Supported asset set.
//!
//! The engine only liquidates into and out of assets it knows. The set is
//! fixed at startup and always iterated in ascending address order, so every
//! "pick the best asset" decision has a deterministic tie-break that does not
//! depend on the order the protocol happens to list its reserves in.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Asset configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset symbol (e.g., "WETH", "USDT")
    pub symbol: Cow<'static, str>,
    /// Token contract address
    pub token: Address,
    /// Token decimals
    pub decimals: u8,
}

impl Asset {
    pub const fn new(symbol: &'static str, token: Address, decimals: u8) -> Self {
        Self {
            symbol: Cow::Borrowed(symbol),
            token,
            decimals,
        }
    }
}

// ============================================================================
// Ethereum mainnet reserves
// ============================================================================

/// WETH - Wrapped Ether
pub const WETH: Asset = Asset::new(
    "WETH",
    address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    18,
);

/// WBTC - Wrapped Bitcoin
pub const WBTC: Asset = Asset::new(
    "WBTC",
    address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
    8,
);

/// USDT - Tether USD
pub const USDT: Asset = Asset::new(
    "USDT",
    address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
    6,
);

/// USDC - USD Coin
pub const USDC: Asset = Asset::new(
    "USDC",
    address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    6,
);

/// DAI - Dai Stablecoin
pub const DAI: Asset = Asset::new(
    "DAI",
    address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
    18,
);

/// All mainnet assets supported out of the box.
pub const MAINNET_ASSETS: [Asset; 5] = [WETH, WBTC, USDT, USDC, DAI];

/// Registry of supported assets keyed (and ordered) by token address.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: BTreeMap<Address, Asset>,
}

impl AssetRegistry {
    /// Create a registry from an explicit list.
    ///
    /// A token listed twice keeps its last entry.
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.token, a)).collect(),
        }
    }

    /// Registry with the mainnet reserves.
    pub fn mainnet() -> Self {
        Self::new(MAINNET_ASSETS)
    }

    /// Look up an asset by token address.
    pub fn get(&self, token: &Address) -> Option<&Asset> {
        self.assets.get(token)
    }

    /// Whether the engine may select this token.
    pub fn is_supported(&self, token: &Address) -> bool {
        self.assets.contains_key(token)
    }

    /// Symbol for logging, falling back to the address.
    pub fn symbol(&self, token: &Address) -> String {
        self.assets
            .get(token)
            .map(|a| a.symbol.to_string())
            .unwrap_or_else(|| token.to_string())
    }

    /// Assets in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
