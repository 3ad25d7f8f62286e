//! Swap venues and route planning.
//!
//! Converts seized collateral back into the debt asset. Quotes are
//! conservative: the minimum output handed to the venue is what the
//! price-impact bound admits, never the optimistic simulation.

mod planner;
mod pool;

pub use planner::{Hop, SwapPlanner, SwapQuote, SwapRoute, MAX_ROUTE_HOPS};
pub use pool::{Pool, PoolKind, PoolSnapshot};
