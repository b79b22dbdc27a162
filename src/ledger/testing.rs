//! In-memory ledgers for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::traits::{CoordinatorLedger, TransactionWatcher, VaultLedger};
use super::types::TxReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    Never,
}

/// Issues hashes and answers receipt lookups.
#[derive(Debug)]
struct TxBook {
    next: AtomicU64,
    mode: Mutex<ReceiptMode>,
    mined: Mutex<HashMap<String, bool>>,
}

impl TxBook {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            mode: Mutex::new(ReceiptMode::Success),
            mined: Mutex::new(HashMap::new()),
        }
    }

    fn mode(&self) -> ReceiptMode {
        *self.mode.lock().unwrap()
    }

    /// Returns the hash and whether the write should take effect.
    fn submit(&self) -> (String, bool) {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let hash = format!("0x{:064x}", n);
        let mode = self.mode();
        if mode != ReceiptMode::Never {
            self.mined
                .lock()
                .unwrap()
                .insert(hash.clone(), mode == ReceiptMode::Success);
        }
        (hash, mode == ReceiptMode::Success)
    }

    fn receipt(&self, tx_hash: &str) -> Option<TxReceipt> {
        self.mined.lock().unwrap().get(tx_hash).map(|success| TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 100,
            success: *success,
        })
    }
}

#[derive(Debug)]
pub struct FakeVault {
    state: u8,
    spot_value_usd: u128,
    perp_short_size_wei: Mutex<u128>,
    delta: Mutex<Option<(i128, u128)>>,
    fail_reads: AtomicBool,
    txs: TxBook,
}

impl FakeVault {
    pub fn new(state: u8, spot_value_usd: u128, perp_short_size_wei: u128) -> Self {
        Self {
            state,
            spot_value_usd,
            perp_short_size_wei: Mutex::new(perp_short_size_wei),
            delta: Mutex::new(None),
            fail_reads: AtomicBool::new(false),
            txs: TxBook::new(),
        }
    }

    pub fn set_delta(&self, delta: Option<(i128, u128)>) {
        *self.delta.lock().unwrap() = delta;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn perp_short_size_wei_now(&self) -> u128 {
        *self.perp_short_size_wei.lock().unwrap()
    }

    fn check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionWatcher for FakeVault {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        Ok(self.txs.receipt(tx_hash))
    }
}

#[async_trait]
impl VaultLedger for FakeVault {
    async fn state(&self) -> Result<u8> {
        self.check()?;
        Ok(self.state)
    }

    async fn spot_value_usd(&self) -> Result<u128> {
        self.check()?;
        Ok(self.spot_value_usd)
    }

    async fn perp_short_size_wei(&self) -> Result<u128> {
        self.check()?;
        Ok(self.perp_short_size_wei_now())
    }

    async fn calculate_delta(&self) -> Result<(i128, u128)> {
        match *self.delta.lock().unwrap() {
            Some(delta) => Ok(delta),
            None => bail!("execution reverted: oracle precompile unavailable"),
        }
    }

    async fn needs_rebalance(&self) -> Result<bool> {
        match *self.delta.lock().unwrap() {
            Some((_, bps)) => Ok(bps >= 500),
            None => bail!("execution reverted: oracle precompile unavailable"),
        }
    }

    async fn open_short(&self, size_wei: u128, _max_slippage_bps: u128) -> Result<String> {
        let (hash, applied) = self.txs.submit();
        if applied {
            *self.perp_short_size_wei.lock().unwrap() += size_wei;
        }
        Ok(hash)
    }

    async fn close_short(&self) -> Result<String> {
        let (hash, applied) = self.txs.submit();
        if applied {
            *self.perp_short_size_wei.lock().unwrap() = 0;
        }
        Ok(hash)
    }
}

/// Last-write-wins coordinator.
#[derive(Debug)]
pub struct FakeCoordinator {
    spot_value_usd: u128,
    position: Mutex<(u128, u128)>,
    last_sync_time: AtomicU64,
    fail_reads: AtomicBool,
    fail_submissions: AtomicBool,
    sync_calls: AtomicUsize,
    rebalance_calls: AtomicUsize,
    txs: TxBook,
}

impl FakeCoordinator {
    pub fn new(spot_value_usd: u128) -> Self {
        Self {
            spot_value_usd,
            position: Mutex::new((0, 0)),
            last_sync_time: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_submissions: AtomicBool::new(false),
            sync_calls: AtomicUsize::new(0),
            rebalance_calls: AtomicUsize::new(0),
            txs: TxBook::new(),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.txs.mode.lock().unwrap() = mode;
    }

    /// `(perp_short_size_wei, perp_short_value_usd)`
    pub fn position(&self) -> (u128, u128) {
        *self.position.lock().unwrap()
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn rebalance_calls(&self) -> usize {
        self.rebalance_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionWatcher for FakeCoordinator {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        Ok(self.txs.receipt(tx_hash))
    }
}

#[async_trait]
impl CoordinatorLedger for FakeCoordinator {
    async fn perp_short_size_wei(&self) -> Result<u128> {
        self.check()?;
        Ok(self.position().0)
    }

    async fn perp_short_value_usd(&self) -> Result<u128> {
        self.check()?;
        Ok(self.position().1)
    }

    async fn last_sync_time(&self) -> Result<u64> {
        self.check()?;
        Ok(self.last_sync_time.load(Ordering::SeqCst))
    }

    async fn is_strategy_active(&self) -> Result<bool> {
        self.check()?;
        Ok(true)
    }

    async fn spot_value_usd(&self) -> Result<u128> {
        self.check()?;
        Ok(self.spot_value_usd)
    }

    async fn calculate_delta(&self) -> Result<(i128, u128)> {
        self.check()?;
        let perp = self.position().1 as i128;
        Ok((self.spot_value_usd as i128 - perp, 0))
    }

    async fn needs_rebalance(&self) -> Result<bool> {
        self.check()?;
        Ok(self.spot_value_usd != self.position().1)
    }

    async fn sync_perp_position(&self, size_wei: u128, value_usd: u128) -> Result<String> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            bail!("execution reverted: caller is not keeper");
        }
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let (hash, applied) = self.txs.submit();
        if applied {
            *self.position.lock().unwrap() = (size_wei, value_usd);
            self.last_sync_time.fetch_add(1, Ordering::SeqCst);
        }
        Ok(hash)
    }

    async fn execute_rebalance(&self, _min_amount_out: u128) -> Result<String> {
        self.rebalance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.txs.submit().0)
    }
}
