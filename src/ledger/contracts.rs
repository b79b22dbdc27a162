//! Contract bindings over JSON-RPC.
//!
//! - `FundingCaptureVaultV2` on HyperEVM (perp short)
//! - `DeltaCoordinator` on Arbitrum (sync target, delta view)
//! - `SpotLongVault` on Arbitrum (spot balances, status only)

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::abi::{self, Address, Token};
use super::rpc::{parse_quantity, parse_quantity_u64, RpcClient};
use super::traits::{CoordinatorLedger, TransactionWatcher, VaultLedger};
use super::tx::{LegacyTransaction, Signer};
use super::types::{LifecycleState, SpotVaultState, TxReceipt};

/// One network: RPC transport plus the keeper's signer.
#[derive(Debug)]
pub struct LedgerClient {
    name: &'static str,
    rpc: RpcClient,
    signer: Arc<Signer>,
    gas_buffer_bps: u64,
    chain_id: OnceCell<u64>,
}

impl LedgerClient {
    pub fn new(name: &'static str, rpc: RpcClient, signer: Arc<Signer>, gas_buffer_bps: u64) -> Self {
        Self {
            name,
            rpc,
            signer,
            gas_buffer_bps,
            chain_id: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn keeper_address(&self) -> Address {
        self.signer.address()
    }

    /// Native balance of the keeper wallet, in wei.
    pub async fn keeper_balance(&self) -> Result<u128> {
        self.rpc.balance(&self.signer.address()).await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| self.rpc.chain_id())
            .await
            .copied()
    }

    /// `eth_call` returning the first `words` return words.
    pub async fn call(
        &self,
        to: &Address,
        signature: &str,
        args: &[Token],
        words: usize,
    ) -> Result<Vec<[u8; 32]>> {
        let data = abi::encode_call(signature, args);
        let output = self
            .rpc
            .eth_call(to, &data)
            .await
            .with_context(|| format!("{} call {} failed", self.name, signature))?;
        abi::decode_words(&output, words).with_context(|| format!("{} decode {}", self.name, signature))
    }

    /// Sign and broadcast a state-changing call. Gas is estimated first, so a
    /// call that would revert is rejected before broadcast.
    #[instrument(skip(self, args), fields(network = self.name))]
    pub async fn transact(&self, to: &Address, signature: &str, args: &[Token]) -> Result<String> {
        let from = self.signer.address();
        let data = abi::encode_call(signature, args);

        let chain_id = self.chain_id().await?;
        let nonce = self.rpc.pending_nonce(&from).await?;
        let gas_price = self.rpc.gas_price().await?;
        let estimate = self
            .rpc
            .estimate_gas(&from, to, &data)
            .await
            .with_context(|| format!("gas estimation for {} failed", signature))?;
        let gas_limit = estimate + estimate * self.gas_buffer_bps / 10_000;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: *to,
            value: 0,
            data,
            chain_id,
        };

        debug!(nonce, gas_price, gas_limit, chain_id, "Submitting transaction");

        let raw = tx.sign(&self.signer)?;
        let hash = self.rpc.send_raw_transaction(&raw).await?;

        info!(network = self.name, %signature, tx_hash = %hash, "Transaction submitted");
        Ok(hash)
    }

    pub async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? else {
            return Ok(None);
        };

        // Some nodes return a receipt before the block number is assigned
        let Some(block) = receipt.block_number.as_deref() else {
            return Ok(None);
        };

        Ok(Some(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: parse_quantity_u64(block, "block number")?,
            success: receipt.status.as_deref().map(parse_quantity).transpose()? == Some(1),
        }))
    }
}

/// `FundingCaptureVaultV2` on HyperEVM.
#[derive(Debug, Clone)]
pub struct EvmVault {
    client: Arc<LedgerClient>,
    address: Address,
}

impl EvmVault {
    pub fn new(client: Arc<LedgerClient>, address: Address) -> Self {
        Self { client, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn uint(&self, signature: &str) -> Result<u128> {
        let words = self.client.call(&self.address, signature, &[], 1).await?;
        abi::decode_uint(&words[0])
    }
}

#[async_trait]
impl TransactionWatcher for EvmVault {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        self.client.receipt(tx_hash).await
    }
}

#[async_trait]
impl VaultLedger for EvmVault {
    async fn state(&self) -> Result<u8> {
        let words = self.client.call(&self.address, "state()", &[], 1).await?;
        abi::decode_u8(&words[0])
    }

    async fn spot_value_usd(&self) -> Result<u128> {
        self.uint("spotValueUsd()").await
    }

    async fn perp_short_size_wei(&self) -> Result<u128> {
        self.uint("perpShortSizeWei()").await
    }

    async fn calculate_delta(&self) -> Result<(i128, u128)> {
        let words = self.client.call(&self.address, "calculateDelta()", &[], 2).await?;
        Ok((abi::decode_int(&words[0])?, abi::decode_uint(&words[1])?))
    }

    async fn needs_rebalance(&self) -> Result<bool> {
        let words = self.client.call(&self.address, "needsRebalance()", &[], 1).await?;
        abi::decode_bool(&words[0])
    }

    async fn open_short(&self, size_wei: u128, max_slippage_bps: u128) -> Result<String> {
        self.client
            .transact(
                &self.address,
                "openShort(uint256,uint256)",
                &[Token::Uint(size_wei), Token::Uint(max_slippage_bps)],
            )
            .await
    }

    async fn close_short(&self) -> Result<String> {
        self.client.transact(&self.address, "closeShort()", &[]).await
    }
}

/// `DeltaCoordinator` on Arbitrum.
#[derive(Debug, Clone)]
pub struct EvmCoordinator {
    client: Arc<LedgerClient>,
    address: Address,
}

impl EvmCoordinator {
    pub fn new(client: Arc<LedgerClient>, address: Address) -> Self {
        Self { client, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn uint(&self, signature: &str) -> Result<u128> {
        let words = self.client.call(&self.address, signature, &[], 1).await?;
        abi::decode_uint(&words[0])
    }
}

#[async_trait]
impl TransactionWatcher for EvmCoordinator {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        self.client.receipt(tx_hash).await
    }
}

#[async_trait]
impl CoordinatorLedger for EvmCoordinator {
    async fn perp_short_size_wei(&self) -> Result<u128> {
        self.uint("perpShortSizeWei()").await
    }

    async fn perp_short_value_usd(&self) -> Result<u128> {
        self.uint("perpShortValueUsd()").await
    }

    async fn last_sync_time(&self) -> Result<u64> {
        let value = self.uint("lastSyncTime()").await?;
        u64::try_from(value).context("lastSyncTime out of range")
    }

    async fn is_strategy_active(&self) -> Result<bool> {
        let words = self.client.call(&self.address, "isStrategyActive()", &[], 1).await?;
        abi::decode_bool(&words[0])
    }

    async fn spot_value_usd(&self) -> Result<u128> {
        self.uint("getSpotValueUsd()").await
    }

    async fn calculate_delta(&self) -> Result<(i128, u128)> {
        let words = self.client.call(&self.address, "calculateDelta()", &[], 2).await?;
        Ok((abi::decode_int(&words[0])?, abi::decode_uint(&words[1])?))
    }

    async fn needs_rebalance(&self) -> Result<bool> {
        let words = self.client.call(&self.address, "needsRebalance()", &[], 1).await?;
        abi::decode_bool(&words[0])
    }

    async fn sync_perp_position(&self, size_wei: u128, value_usd: u128) -> Result<String> {
        self.client
            .transact(
                &self.address,
                "syncPerpPosition(uint256,uint256)",
                &[Token::Uint(size_wei), Token::Uint(value_usd)],
            )
            .await
    }

    async fn execute_rebalance(&self, min_amount_out: u128) -> Result<String> {
        self.client
            .transact(
                &self.address,
                "executeRebalance(uint256)",
                &[Token::Uint(min_amount_out)],
            )
            .await
    }
}

/// `SpotLongVault` on Arbitrum.
#[derive(Debug, Clone)]
pub struct EvmSpotVault {
    client: Arc<LedgerClient>,
    address: Address,
}

impl EvmSpotVault {
    pub fn new(client: Arc<LedgerClient>, address: Address) -> Self {
        Self { client, address }
    }

    async fn uint(&self, signature: &str) -> Result<u128> {
        let words = self.client.call(&self.address, signature, &[], 1).await?;
        abi::decode_uint(&words[0])
    }

    pub async fn read_state(&self) -> Result<SpotVaultState> {
        let (state, target, weth, usdc) = tokio::try_join!(
            self.uint("state()"),
            self.uint("targetEthAmount()"),
            self.uint("getWethBalance()"),
            self.uint("getUsdcBalance()"),
        )?;

        Ok(SpotVaultState {
            lifecycle_state: LifecycleState::from_code(u8::try_from(state).unwrap_or(u8::MAX)),
            target_eth_wei: target,
            weth_balance_wei: weth,
            usdc_balance: usdc,
        })
    }
}
