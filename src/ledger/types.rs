//! Snapshots of on-chain state taken by the keeper.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::error::KeeperError;
use crate::utils::decimal::{from_fixed, USD_DECIMALS, WEI_DECIMALS};

/// Vault lifecycle as reported by `state()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Active,
    Exiting,
    Unknown,
}

impl LifecycleState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Active,
            2 => LifecycleState::Exiting,
            _ => LifecycleState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Exiting => "EXITING",
            LifecycleState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing a ledger's own `calculateDelta()`.
///
/// `Unavailable` is the expected degraded mode (e.g. a missing oracle
/// precompile), not a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeltaProbe {
    Computed {
        /// Signed USD delta as computed on-chain
        delta_usd: Decimal,
        delta_ratio_bps: u128,
    },
    Unavailable,
}

impl DeltaProbe {
    pub fn is_available(&self) -> bool {
        matches!(self, DeltaProbe::Computed { .. })
    }

    /// Computed values, or `DeltaComputationUnavailable`.
    pub fn require(&self) -> Result<(Decimal, u128), KeeperError> {
        match self {
            DeltaProbe::Computed {
                delta_usd,
                delta_ratio_bps,
            } => Ok((*delta_usd, *delta_ratio_bps)),
            DeltaProbe::Unavailable => Err(KeeperError::DeltaComputationUnavailable),
        }
    }
}

/// A contract's own `calculateDelta()` and `needsRebalance()` views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnChainCheck {
    pub delta: DeltaProbe,
    /// `None` when the view reverted or the node was unreachable
    pub needs_rebalance: Option<bool>,
}

/// First-ledger vault snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultState {
    pub lifecycle_state: LifecycleState,
    /// 6-decimal USD
    pub spot_value_usd: u128,
    /// 18-decimal base-asset units
    pub perp_short_size_wei: u128,
    pub on_chain_delta: DeltaProbe,
}

impl VaultState {
    pub fn spot_value(&self) -> anyhow::Result<Decimal> {
        from_fixed(self.spot_value_usd, USD_DECIMALS)
    }

    pub fn perp_short_size(&self) -> anyhow::Result<Decimal> {
        from_fixed(self.perp_short_size_wei, WEI_DECIMALS)
    }
}

/// Second-ledger coordinator snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorState {
    pub perp_short_size_wei: u128,
    /// 6-decimal USD
    pub perp_short_value_usd: u128,
    /// Unix seconds of the last accepted sync
    pub last_sync_time: u64,
    pub is_strategy_active: bool,
    /// 6-decimal USD value of the spot leg
    pub spot_value_usd: u128,
}

impl CoordinatorState {
    pub fn spot_value(&self) -> anyhow::Result<Decimal> {
        from_fixed(self.spot_value_usd, USD_DECIMALS)
    }

    pub fn perp_value(&self) -> anyhow::Result<Decimal> {
        from_fixed(self.perp_short_value_usd, USD_DECIMALS)
    }
}

/// Second-ledger spot vault balances, shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotVaultState {
    pub lifecycle_state: LifecycleState,
    pub target_eth_wei: u128,
    pub weth_balance_wei: u128,
    /// 6-decimal USDC
    pub usdc_balance: u128,
}

/// Mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}
