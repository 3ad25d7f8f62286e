//! Chain adapters for the liquidation engine.
//!
//! - Contract bindings for the lending pool, data provider, price oracle,
//!   Uniswap V2 and the flash-loan receiver
//! - RPC implementations of the engine's read services
//! - Calldata for the flash-loan transaction a plan turns into

pub mod calldata;
pub mod contracts;
mod pools;
mod provider;

pub use pools::{token_pairs, UniswapV2PoolReader, UNISWAP_V2_FEE_BPS};
pub use provider::{ReserveParams, RpcPositionReader};

use flashliq_core::{Deployment, ReadServices};
use std::sync::Arc;

/// Lending-protocol reader for a deployment.
pub fn position_reader(deployment: &Deployment) -> RpcPositionReader {
    let contracts = &deployment.contracts;
    RpcPositionReader::new(
        deployment.rpc_url.clone(),
        contracts.lending_pool,
        contracts.data_provider,
        contracts.price_oracle,
    )
}

/// Read services for a deployment, all over its `rpc_url`.
pub fn read_services(deployment: &Deployment, positions: Arc<RpcPositionReader>) -> ReadServices {
    let contracts = &deployment.contracts;
    ReadServices {
        positions: positions.clone(),
        prices: positions,
        pools: Arc::new(UniswapV2PoolReader::new(
            deployment.rpc_url.clone(),
            contracts.uniswap_v2_factory,
        )),
    }
}
