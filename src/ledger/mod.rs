//! On-chain side of the keeper.
//!
//! Transport, codec and signing live in `rpc`, `abi` and `tx`; `contracts`
//! binds them to the three deployed contracts. `reader` and `sync` are what
//! the cycle scheduler calls.

pub mod abi;
pub mod contracts;
pub mod reader;
pub mod rpc;
pub mod sync;
mod traits;
pub mod tx;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use abi::Address;
pub use contracts::{EvmCoordinator, EvmSpotVault, EvmVault, LedgerClient};
pub use reader::{
    check_coordinator_on_chain, check_vault_on_chain, read_coordinator_state, read_vault_state,
};
pub use rpc::RpcClient;
pub use sync::{perp_value_usd_units, sync_position, WaitPolicy};
pub use traits::{CoordinatorLedger, TransactionWatcher, VaultLedger};
pub use tx::Signer;
pub use types::*;
