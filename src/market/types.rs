//! Type definitions for the Hyperliquid info API and the snapshot built from it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request type for the Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Universe listing plus per-asset contexts (funding, prices, OI).
    #[serde(rename = "metaAndAssetCtxs")]
    MetaAndAssetCtxs,
}

/// Response from metaAndAssetCtxs: `[meta, assetCtxs]`, parallel by index.
pub type MetaAndAssetCtxsResponse = (Meta, Vec<AssetCtx>);

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Asset name (e.g., "BTC", "ETH")
    pub name: String,
    /// Size decimal precision
    #[serde(default)]
    pub sz_decimals: u8,
}

/// Real-time context for an asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    /// Current funding rate per interval
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub funding: Decimal,
    /// Open interest in base units
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub open_interest: Decimal,
    /// Previous day price (24h ago)
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub prev_day_px: Decimal,
    /// Oracle price
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub oracle_px: Decimal,
    /// Mark price
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub mark_px: Decimal,
}

/// Internally consistent market view for one symbol, taken from a single
/// upstream response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Signed funding rate per funding interval
    pub funding_rate: Decimal,
    pub mark_price: Decimal,
    pub oracle_price: Decimal,
    /// Open interest in base-asset units
    pub open_interest: Decimal,
    pub observed_at: DateTime<Utc>,
}

fn deserialize_decimal_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}
