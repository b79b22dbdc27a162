//! Hyperliquid REST client for market snapshots.
//!
//! One `metaAndAssetCtxs` round trip yields funding, mark, oracle and open
//! interest for every perpetual, so a snapshot never mixes fields from two
//! upstream calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::*;
use crate::error::KeeperError;

/// Base URL for the Hyperliquid testnet API.
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Source of market snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch a consistent snapshot for `symbol` in a single upstream call.
    async fn fetch_market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, KeeperError>;
}

/// Hyperliquid API client for fetching market data.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
}

impl HyperliquidClient {
    /// Create a new client against `base_url` with a request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get metadata and asset contexts for all perpetuals.
    #[instrument(skip(self), name = "hl_meta_and_asset_ctxs")]
    pub async fn get_meta_and_asset_ctxs(&self) -> Result<MetaAndAssetCtxsResponse> {
        let url = format!("{}/info", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&InfoRequest::MetaAndAssetCtxs)
            .send()
            .await
            .context("Failed to send metaAndAssetCtxs request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, body);
        }

        let data: MetaAndAssetCtxsResponse = response
            .json()
            .await
            .context("Failed to parse metaAndAssetCtxs response")?;

        if data.0.universe.len() != data.1.len() {
            anyhow::bail!(
                "Mismatch between universe ({}) and contexts ({})",
                data.0.universe.len(),
                data.1.len()
            );
        }

        debug!("Fetched {} assets from Hyperliquid", data.0.universe.len());
        Ok(data)
    }

    /// Snapshots for several symbols from one upstream response.
    ///
    /// The outer error covers the round trip; each symbol carries its own
    /// lookup result.
    pub async fn fetch_market_snapshots(
        &self,
        symbols: &[String],
    ) -> Result<Vec<(String, Result<MarketSnapshot, KeeperError>)>, KeeperError> {
        let response = self
            .get_meta_and_asset_ctxs()
            .await
            .map_err(|e| KeeperError::MarketDataUnavailable(format!("{:#}", e)))?;

        Ok(symbols
            .iter()
            .map(|symbol| (symbol.clone(), snapshot_from_response(&response, symbol)))
            .collect())
    }
}

#[async_trait]
impl MarketDataSource for HyperliquidClient {
    #[instrument(skip(self), name = "hl_market_snapshot")]
    async fn fetch_market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, KeeperError> {
        let response = self
            .get_meta_and_asset_ctxs()
            .await
            .map_err(|e| KeeperError::MarketDataUnavailable(format!("{:#}", e)))?;

        snapshot_from_response(&response, symbol)
    }
}

/// Resolve `symbol` in the universe listing and build its snapshot.
pub fn snapshot_from_response(
    response: &MetaAndAssetCtxsResponse,
    symbol: &str,
) -> Result<MarketSnapshot, KeeperError> {
    let (meta, ctxs) = response;

    let index = meta
        .universe
        .iter()
        .position(|asset| asset.name.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| KeeperError::SymbolNotFound(symbol.to_string()))?;

    let ctx = ctxs.get(index).ok_or_else(|| {
        KeeperError::MarketDataUnavailable(format!("no asset context for {} at index {}", symbol, index))
    })?;

    if ctx.mark_px <= Decimal::ZERO || ctx.oracle_px <= Decimal::ZERO {
        return Err(KeeperError::MarketDataUnavailable(format!(
            "non-positive price for {}: mark {} oracle {}",
            symbol, ctx.mark_px, ctx.oracle_px
        )));
    }

    Ok(MarketSnapshot {
        symbol: meta.universe[index].name.clone(),
        funding_rate: ctx.funding,
        mark_price: ctx.mark_px,
        oracle_price: ctx.oracle_px,
        open_interest: ctx.open_interest,
        observed_at: Utc::now(),
    })
}
