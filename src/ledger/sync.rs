//! Position sync writer and operator write paths.
//!
//! Every write is submit-then-wait: the transaction hash comes back from the
//! ledger and the receipt is polled until inclusion or the wait policy
//! expires.

use rust_decimal::Decimal;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use super::traits::{CoordinatorLedger, TransactionWatcher, VaultLedger};
use super::types::TxReceipt;
use crate::error::KeeperError;
use crate::utils::decimal::{from_fixed, to_fixed_floor, USD_DECIMALS, WEI_DECIMALS};

/// Bounded receipt wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// USD value of the perp short in 6-decimal units, floored.
pub fn perp_value_usd_units(perp_short_size_wei: u128, mark_price: Decimal) -> anyhow::Result<u128> {
    let size = from_fixed(perp_short_size_wei, WEI_DECIMALS)?;
    let value = size
        .checked_mul(mark_price)
        .ok_or_else(|| anyhow::anyhow!("perp value overflow"))?;
    to_fixed_floor(value, USD_DECIMALS)
}

/// Poll for a receipt until it lands or `policy.timeout` elapses.
///
/// Lookup errors while polling are treated as "not yet included".
pub async fn wait_for_receipt<W>(
    watcher: &W,
    tx_hash: &str,
    policy: &WaitPolicy,
) -> Result<TxReceipt, KeeperError>
where
    W: TransactionWatcher + ?Sized,
{
    let started = Instant::now();

    let poll = async {
        loop {
            match watcher.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => warn!(tx_hash, error = %format!("{:#}", e), "Receipt lookup failed"),
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    };

    let receipt = tokio::time::timeout(policy.timeout, poll)
        .await
        .map_err(|_| KeeperError::SyncTransactionTimeout {
            tx_hash: tx_hash.to_string(),
            waited_secs: started.elapsed().as_secs(),
        })?;

    if !receipt.success {
        return Err(KeeperError::SyncTransactionFailed(format!(
            "transaction {} reverted in block {}",
            receipt.tx_hash, receipt.block_number
        )));
    }

    Ok(receipt)
}

async fn submit_and_wait<W, F>(
    watcher: &W,
    action: &str,
    submit: F,
    policy: &WaitPolicy,
) -> Result<TxReceipt, KeeperError>
where
    W: TransactionWatcher + ?Sized,
    F: Future<Output = anyhow::Result<String>>,
{
    let tx_hash = submit
        .await
        .map_err(|e| KeeperError::SyncTransactionFailed(format!("{} rejected: {:#}", action, e)))?;

    info!(action, tx_hash = %tx_hash, "Waiting for confirmation");
    let receipt = wait_for_receipt(watcher, &tx_hash, policy).await?;
    info!(action, tx_hash = %receipt.tx_hash, block = receipt.block_number, "Transaction confirmed");
    Ok(receipt)
}

/// Push the first ledger's perp exposure to the coordinator.
#[instrument(skip(coordinator, policy), name = "sync_position")]
pub async fn sync_position<C>(
    coordinator: &C,
    perp_short_size_wei: u128,
    perp_value_usd: u128,
    policy: &WaitPolicy,
) -> Result<TxReceipt, KeeperError>
where
    C: CoordinatorLedger + ?Sized,
{
    submit_and_wait(
        coordinator,
        "syncPerpPosition",
        coordinator.sync_perp_position(perp_short_size_wei, perp_value_usd),
        policy,
    )
    .await
}

/// Operator-triggered `executeRebalance`.
pub async fn execute_rebalance<C>(
    coordinator: &C,
    min_amount_out: u128,
    policy: &WaitPolicy,
) -> Result<TxReceipt, KeeperError>
where
    C: CoordinatorLedger + ?Sized,
{
    submit_and_wait(
        coordinator,
        "executeRebalance",
        coordinator.execute_rebalance(min_amount_out),
        policy,
    )
    .await
}

pub async fn open_short<V>(
    vault: &V,
    size_wei: u128,
    max_slippage_bps: u128,
    policy: &WaitPolicy,
) -> Result<TxReceipt, KeeperError>
where
    V: VaultLedger + ?Sized,
{
    submit_and_wait(
        vault,
        "openShort",
        vault.open_short(size_wei, max_slippage_bps),
        policy,
    )
    .await
}

pub async fn close_short<V>(vault: &V, policy: &WaitPolicy) -> Result<TxReceipt, KeeperError>
where
    V: VaultLedger + ?Sized,
{
    submit_and_wait(vault, "closeShort", vault.close_short(), policy).await
}
