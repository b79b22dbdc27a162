//! Market data gateway.
//!
//! Read-only access to Hyperliquid perpetuals market data. A snapshot for a
//! symbol (funding, mark, oracle, open interest) always comes from one
//! `metaAndAssetCtxs` response.

mod client;
mod types;

#[cfg(test)]
pub use client::MockMarketDataSource;
pub use client::{snapshot_from_response, HyperliquidClient, MarketDataSource, TESTNET_API_URL};
pub use types::*;
