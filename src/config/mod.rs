//! Configuration management for the keeper.
//!
//! Sources, later wins:
//! 1. optional `keeper.{toml,yaml,json}` file
//! 2. `KEEPER_<SECTION>__<KEY>` environment variables
//! 3. the flat variables of existing deployments (`KEEPER_PRIVATE_KEY`,
//!    `HYPEREVM_VAULT`, `DELTA_THRESHOLD_BPS`, ...)

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::KeeperError;
use crate::ledger::{Address, Signer, WaitPolicy};

/// Flat variable → config key. These override everything else.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("KEEPER_PRIVATE_KEY", "wallet.private_key"),
    ("HYPEREVM_RPC", "networks.hyperevm_rpc"),
    ("ARBITRUM_RPC", "networks.arbitrum_rpc"),
    ("HYPEREVM_VAULT", "contracts.hyperevm_vault"),
    ("ARBITRUM_SPOT_VAULT", "contracts.arbitrum_spot_vault"),
    ("ARBITRUM_COORDINATOR", "contracts.arbitrum_coordinator"),
    ("DELTA_THRESHOLD_BPS", "strategy.delta_threshold_bps"),
    ("MIN_FUNDING_RATE", "strategy.min_funding_rate"),
    ("SCAN_INTERVAL_MS", "strategy.scan_interval_ms"),
    ("HYPERLIQUID_API_URL", "market.api_url"),
];

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub networks: NetworkConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Hex secret key authorizing on-chain writes
    #[serde(default)]
    pub private_key: String,
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("private_key", &if self.private_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// First ledger (perp vault)
    #[serde(default = "default_hyperevm_rpc")]
    pub hyperevm_rpc: String,
    /// Second ledger (spot vault, coordinator)
    #[serde(default = "default_arbitrum_rpc")]
    pub arbitrum_rpc: String,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub hyperevm_vault: String,
    /// Empty means not deployed
    #[serde(default)]
    pub arbitrum_spot_vault: String,
    /// Empty means monitoring-only mode
    #[serde(default)]
    pub arbitrum_coordinator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Rebalance is recommended at or above this delta ratio
    #[serde(default = "default_delta_threshold_bps")]
    pub delta_threshold_bps: u32,
    /// Funding per interval must exceed this to be favorable
    #[serde(default = "default_min_funding_rate")]
    pub min_funding_rate: Decimal,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Hyperliquid settles funding every 8h
    #[serde(default = "default_funding_periods_per_day")]
    pub funding_periods_per_day: u32,
    #[serde(default = "default_unfavorable_funding_alert_cycles")]
    pub unfavorable_funding_alert_cycles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_market_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Added on top of `eth_estimateGas` (2000 = +20%)
    #[serde(default = "default_gas_buffer_bps")]
    pub gas_buffer_bps: u64,
}

// Default value functions

fn default_hyperevm_rpc() -> String {
    "https://rpc.hyperliquid-testnet.xyz/evm".to_string()
}

fn default_arbitrum_rpc() -> String {
    "https://arb1.arbitrum.io/rpc".to_string()
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_symbol() -> String {
    "ETH".to_string()
}

fn default_delta_threshold_bps() -> u32 {
    500 // 5%
}

fn default_min_funding_rate() -> Decimal {
    Decimal::new(1, 4) // 0.0001 = 0.01% per interval
}

fn default_scan_interval_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_funding_periods_per_day() -> u32 {
    crate::strategy::DEFAULT_FUNDING_PERIODS_PER_DAY
}

fn default_unfavorable_funding_alert_cycles() -> u32 {
    3
}

fn default_api_url() -> String {
    crate::market::TESTNET_API_URL.to_string()
}

fn default_market_timeout() -> u64 {
    30
}

fn default_receipt_timeout() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_gas_buffer_bps() -> u64 {
    2_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hyperevm_rpc: default_hyperevm_rpc(),
            arbitrum_rpc: default_arbitrum_rpc(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            delta_threshold_bps: default_delta_threshold_bps(),
            min_funding_rate: default_min_funding_rate(),
            scan_interval_ms: default_scan_interval_ms(),
            funding_periods_per_day: default_funding_periods_per_day(),
            unfavorable_funding_alert_cycles: default_unfavorable_funding_alert_cycles(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_market_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: default_receipt_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            gas_buffer_bps: default_gas_buffer_bps(),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, an optional `keeper` file and the
    /// process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_sources(
            config::File::with_name("keeper").required(false),
            std::env::vars().collect(),
        )
    }

    fn from_sources<S>(file: S, env: HashMap<String, String>) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = config::Config::builder().add_source(file).add_source(
            config::Environment::with_prefix("KEEPER")
                .prefix_separator("_")
                .separator("__")
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_VARS {
            builder = builder
                .set_override_option(*key, env.get(*var).filter(|v| !v.is_empty()).cloned())
                .with_context(|| format!("Failed to apply {}", var))?;
        }

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Run once before any cycle.
    pub fn validate(&self) -> Result<(), KeeperError> {
        self.signer()?;
        self.vault_address()?;
        self.coordinator_address()?;
        self.spot_vault_address()?;

        ensure(
            !self.networks.hyperevm_rpc.trim().is_empty(),
            "networks.hyperevm_rpc must not be empty",
        )?;
        ensure(
            !self.networks.arbitrum_rpc.trim().is_empty(),
            "networks.arbitrum_rpc must not be empty",
        )?;
        ensure(
            self.strategy.delta_threshold_bps > 0 && self.strategy.delta_threshold_bps <= 10_000,
            "strategy.delta_threshold_bps must be in 1..=10000",
        )?;
        ensure(
            self.strategy.scan_interval_ms > 0,
            "strategy.scan_interval_ms must be > 0",
        )?;
        ensure(
            self.strategy.funding_periods_per_day > 0,
            "strategy.funding_periods_per_day must be > 0",
        )?;
        ensure(
            self.sync.receipt_timeout_secs > 0,
            "sync.receipt_timeout_secs must be > 0",
        )?;

        Ok(())
    }

    pub fn signer(&self) -> Result<Signer, KeeperError> {
        if self.wallet.private_key.trim().is_empty() {
            return Err(invalid("KEEPER_PRIVATE_KEY is required"));
        }
        Signer::from_hex(self.wallet.private_key.trim())
            .map_err(|e| invalid(format!("wallet.private_key: {:#}", e)))
    }

    pub fn vault_address(&self) -> Result<Address, KeeperError> {
        let raw = self.contracts.hyperevm_vault.trim();
        if raw.is_empty() {
            return Err(invalid("HYPEREVM_VAULT is required"));
        }
        raw.parse()
            .map_err(|e| invalid(format!("contracts.hyperevm_vault: {:#}", e)))
    }

    /// `None` runs the keeper in monitoring-only mode.
    pub fn coordinator_address(&self) -> Result<Option<Address>, KeeperError> {
        optional_address("contracts.arbitrum_coordinator", &self.contracts.arbitrum_coordinator)
    }

    pub fn spot_vault_address(&self) -> Result<Option<Address>, KeeperError> {
        optional_address("contracts.arbitrum_spot_vault", &self.contracts.arbitrum_spot_vault)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.strategy.scan_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.networks.rpc_timeout_secs)
    }

    pub fn market_timeout(&self) -> Duration {
        Duration::from_secs(self.market.timeout_secs)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(self.sync.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms.max(1)),
        }
    }
}

fn invalid(msg: impl Into<String>) -> KeeperError {
    KeeperError::ConfigurationInvalid(msg.into())
}

fn ensure(condition: bool, msg: &str) -> Result<(), KeeperError> {
    if condition {
        Ok(())
    } else {
        Err(invalid(msg))
    }
}

fn optional_address(key: &str, raw: &str) -> Result<Option<Address>, KeeperError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| invalid(format!("{}: {:#}", key, e)))
}
