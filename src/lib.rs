//! # Delta Neutral Keeper
//!
//! Reconciles a delta-neutral position split across two ledgers: a perp
//! short held by a vault on HyperEVM and a spot long tracked on Arbitrum by
//! a spot vault and a delta coordinator.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `market`: Hyperliquid market-data gateway
//! - `ledger`: JSON-RPC, ABI, signing, contract bindings, state reads and sync writes
//! - `strategy`: Delta evaluation and funding signals
//! - `keeper`: Reconciliation cycle scheduler
//! - `alerts`: Metrics and alert sink
//! - `utils`: Fixed-point decimal helpers

pub mod alerts;
pub mod config;
pub mod error;
pub mod keeper;
pub mod ledger;
pub mod market;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::KeeperError;
