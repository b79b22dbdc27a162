//! Ledger state reads with partial degradation.

use futures_util::future::try_join3;
use tracing::{debug, instrument};

use super::traits::{CoordinatorLedger, VaultLedger};
use super::types::{CoordinatorState, DeltaProbe, LifecycleState, OnChainCheck, VaultState};
use crate::error::KeeperError;
use crate::utils::decimal::{from_fixed_signed, USD_DECIMALS};

fn read_failed(what: &str, e: anyhow::Error) -> KeeperError {
    KeeperError::LedgerReadFailed(format!("{}: {:#}", what, e))
}

fn probe_delta(result: anyhow::Result<(i128, u128)>) -> DeltaProbe {
    match result {
        Ok((delta_raw, delta_ratio_bps)) => match from_fixed_signed(delta_raw, USD_DECIMALS) {
            Ok(delta_usd) => DeltaProbe::Computed {
                delta_usd,
                delta_ratio_bps,
            },
            Err(e) => {
                debug!(error = %e, "On-chain delta out of range");
                DeltaProbe::Unavailable
            }
        },
        Err(e) => {
            debug!(error = %format!("{:#}", e), "On-chain delta unavailable");
            DeltaProbe::Unavailable
        }
    }
}

fn flag_view(result: anyhow::Result<bool>) -> Option<bool> {
    match result {
        Ok(flag) => Some(flag),
        Err(e) => {
            debug!(error = %format!("{:#}", e), "needsRebalance() unavailable");
            None
        }
    }
}

/// Read the first-ledger vault.
///
/// Lifecycle, spot value and perp size must all succeed. The on-chain delta
/// is probed afterwards and degrades to `DeltaProbe::Unavailable`.
#[instrument(skip(vault), name = "read_vault_state")]
pub async fn read_vault_state(vault: &dyn VaultLedger) -> Result<VaultState, KeeperError> {
    let (state, spot_value_usd, perp_short_size_wei) = try_join3(
        vault.state(),
        vault.spot_value_usd(),
        vault.perp_short_size_wei(),
    )
    .await
    .map_err(|e| read_failed("vault", e))?;

    let on_chain_delta = probe_delta(vault.calculate_delta().await);

    Ok(VaultState {
        lifecycle_state: LifecycleState::from_code(state),
        spot_value_usd,
        perp_short_size_wei,
        on_chain_delta,
    })
}

/// Read the second-ledger coordinator. Any failed field fails the read.
#[instrument(skip(coordinator), name = "read_coordinator_state")]
pub async fn read_coordinator_state(
    coordinator: &dyn CoordinatorLedger,
) -> Result<CoordinatorState, KeeperError> {
    let (perp_short_size_wei, perp_short_value_usd, last_sync_time, is_strategy_active, spot_value_usd) =
        tokio::try_join!(
            coordinator.perp_short_size_wei(),
            coordinator.perp_short_value_usd(),
            coordinator.last_sync_time(),
            coordinator.is_strategy_active(),
            coordinator.spot_value_usd(),
        )
        .map_err(|e| read_failed("coordinator", e))?;

    Ok(CoordinatorState {
        perp_short_size_wei,
        perp_short_value_usd,
        last_sync_time,
        is_strategy_active,
        spot_value_usd,
    })
}

/// The vault's own delta views. Each degrades independently.
pub async fn check_vault_on_chain(vault: &dyn VaultLedger) -> OnChainCheck {
    let (delta, needs_rebalance) = tokio::join!(vault.calculate_delta(), vault.needs_rebalance());
    OnChainCheck {
        delta: probe_delta(delta),
        needs_rebalance: flag_view(needs_rebalance),
    }
}

/// The coordinator's own delta views. Each degrades independently.
pub async fn check_coordinator_on_chain(coordinator: &dyn CoordinatorLedger) -> OnChainCheck {
    let (delta, needs_rebalance) =
        tokio::join!(coordinator.calculate_delta(), coordinator.needs_rebalance());
    OnChainCheck {
        delta: probe_delta(delta),
        needs_rebalance: flag_view(needs_rebalance),
    }
}
