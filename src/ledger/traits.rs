//! Ledger read/write interfaces.
//!
//! These mirror the contracts' ABI one call per method so the reader and
//! sync writer can be exercised against in-memory ledgers in tests.

use anyhow::Result;
use async_trait::async_trait;

use super::types::TxReceipt;

/// Lookup of submitted transactions.
#[async_trait]
pub trait TransactionWatcher: Send + Sync {
    /// `None` while the transaction has not been included.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}

/// First-ledger vault holding the perp short.
#[async_trait]
pub trait VaultLedger: TransactionWatcher {
    /// Lifecycle state code.
    async fn state(&self) -> Result<u8>;
    /// 6-decimal USD.
    async fn spot_value_usd(&self) -> Result<u128>;
    /// 18-decimal base units.
    async fn perp_short_size_wei(&self) -> Result<u128>;
    /// `(delta_usd, delta_ratio_bps)`; may fail independently of other reads.
    async fn calculate_delta(&self) -> Result<(i128, u128)>;
    async fn needs_rebalance(&self) -> Result<bool>;

    /// Returns the transaction hash.
    async fn open_short(&self, size_wei: u128, max_slippage_bps: u128) -> Result<String>;
    async fn close_short(&self) -> Result<String>;
}

/// Second-ledger delta coordinator.
#[async_trait]
pub trait CoordinatorLedger: TransactionWatcher {
    async fn perp_short_size_wei(&self) -> Result<u128>;
    async fn perp_short_value_usd(&self) -> Result<u128>;
    async fn last_sync_time(&self) -> Result<u64>;
    async fn is_strategy_active(&self) -> Result<bool>;
    async fn spot_value_usd(&self) -> Result<u128>;
    async fn calculate_delta(&self) -> Result<(i128, u128)>;
    async fn needs_rebalance(&self) -> Result<bool>;

    /// Replace the coordinator's perp position. Returns the transaction hash.
    async fn sync_perp_position(&self, size_wei: u128, value_usd: u128) -> Result<String>;
    async fn execute_rebalance(&self, min_amount_out: u128) -> Result<String>;
}
