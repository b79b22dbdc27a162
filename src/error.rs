//! Error taxonomy for the reconciliation loop.
//!
//! Every per-cycle step reports one of these at its boundary. Only
//! `ConfigurationInvalid` is fatal, and only at startup.

use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by keeper steps.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail")]
pub enum KeeperError {
    /// Market-data service unreachable, non-2xx, or returned garbage
    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),

    /// Symbol is missing from the market-data universe listing
    #[error("symbol {0} not found in market universe")]
    SymbolNotFound(String),

    /// Transient ledger read failure (RPC timeout, revert on a view call)
    #[error("ledger read failed: {0}")]
    LedgerReadFailed(String),

    /// The ledger cannot compute delta in this environment
    #[error("on-chain delta computation unavailable")]
    DeltaComputationUnavailable,

    /// Sync transaction rejected at submission or reverted on inclusion
    #[error("sync transaction failed: {0}")]
    SyncTransactionFailed(String),

    /// Sync transaction not observed on-chain within the bounded wait
    #[error("sync transaction {tx_hash} not included after {waited_secs}s")]
    SyncTransactionTimeout { tx_hash: String, waited_secs: u64 },

    /// Required configuration missing or malformed
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

impl KeeperError {
    /// Whether this error should raise an operator alert.
    ///
    /// The delta probe being unavailable is an expected degraded mode.
    pub fn is_alertable(&self) -> bool {
        !matches!(self, KeeperError::DeltaComputationUnavailable)
    }

    /// Short machine-readable code used in log fields and metric tags.
    pub fn code(&self) -> &'static str {
        match self {
            KeeperError::MarketDataUnavailable(_) => "market_data_unavailable",
            KeeperError::SymbolNotFound(_) => "symbol_not_found",
            KeeperError::LedgerReadFailed(_) => "ledger_read_failed",
            KeeperError::DeltaComputationUnavailable => "delta_computation_unavailable",
            KeeperError::SyncTransactionFailed(_) => "sync_transaction_failed",
            KeeperError::SyncTransactionTimeout { .. } => "sync_transaction_timeout",
            KeeperError::ConfigurationInvalid(_) => "configuration_invalid",
        }
    }
}
