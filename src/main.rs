//! Delta Neutral Keeper - Main Entry Point
//!
//! Keeps the HyperEVM perp-short vault and the Arbitrum coordinator in sync
//! and reports delta and funding every cycle.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use delta_neutral_keeper::alerts::{SinkSettings, TracingSink};
use delta_neutral_keeper::config::Config;
use delta_neutral_keeper::keeper::{CoordinatorMode, Scheduler, SchedulerSettings, ShutdownHandle};
use delta_neutral_keeper::ledger::{
    self, check_coordinator_on_chain, check_vault_on_chain, read_coordinator_state,
    read_vault_state, EvmCoordinator, EvmSpotVault, EvmVault, LedgerClient, OnChainCheck,
    RpcClient,
};
use delta_neutral_keeper::market::HyperliquidClient;
use delta_neutral_keeper::strategy::{annualized_apr_pct, evaluate, is_funding_favorable};
use delta_neutral_keeper::utils::decimal::{from_fixed, to_fixed_floor, USD_DECIMALS, WEI_DECIMALS};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Delta Neutral Keeper CLI
#[derive(Parser)]
#[command(name = "delta-neutral-keeper")]
#[command(version, about = "Keeper for a HyperEVM perp short hedged by an Arbitrum spot long")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop (default)
    Run,

    /// Run a single cycle and print its outcome as JSON
    Cycle,

    /// Show wallet, vault and coordinator state
    Status,

    /// Show Hyperliquid funding rates (no wallet needed)
    Funding {
        /// Coins to show
        #[arg(long, num_args = 1.., default_values = ["BTC", "ETH", "SOL", "DOGE", "ARB"])]
        coins: Vec<String>,
    },

    /// Execute a rebalance on the coordinator
    Rebalance {
        /// Minimum swap output, in the output token's base units
        #[arg(long)]
        min_amount_out: u128,

        /// Confirm the on-chain write
        #[arg(long)]
        yes: bool,
    },

    /// Open the perp short on the HyperEVM vault
    OpenShort {
        /// Short size in ETH
        #[arg(long)]
        size: Decimal,

        #[arg(long, default_value_t = 50)]
        max_slippage_bps: u128,

        /// Confirm the on-chain write
        #[arg(long)]
        yes: bool,
    },

    /// Close the perp short on the HyperEVM vault
    CloseShort {
        /// Confirm the on-chain write
        #[arg(long)]
        yes: bool,
    },
}

/// Contracts and clients built from a validated config.
struct Wiring {
    hyperevm: Arc<LedgerClient>,
    arbitrum: Arc<LedgerClient>,
    vault: Arc<EvmVault>,
    coordinator: Option<Arc<EvmCoordinator>>,
    spot_vault: Option<EvmSpotVault>,
}

impl Wiring {
    fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let signer = Arc::new(config.signer()?);
        let buffer = config.sync.gas_buffer_bps;

        let hyperevm = Arc::new(LedgerClient::new(
            "hyperevm",
            RpcClient::new(&config.networks.hyperevm_rpc, config.rpc_timeout())?,
            signer.clone(),
            buffer,
        ));
        let arbitrum = Arc::new(LedgerClient::new(
            "arbitrum",
            RpcClient::new(&config.networks.arbitrum_rpc, config.rpc_timeout())?,
            signer,
            buffer,
        ));

        let vault = Arc::new(EvmVault::new(hyperevm.clone(), config.vault_address()?));
        let coordinator = config
            .coordinator_address()?
            .map(|address| Arc::new(EvmCoordinator::new(arbitrum.clone(), address)));
        let spot_vault = config
            .spot_vault_address()?
            .map(|address| EvmSpotVault::new(arbitrum.clone(), address));

        Ok(Self {
            hyperevm,
            arbitrum,
            vault,
            coordinator,
            spot_vault,
        })
    }

    fn coordinator_mode(&self) -> CoordinatorMode {
        match &self.coordinator {
            Some(coordinator) => CoordinatorMode::Configured(coordinator.clone()),
            None => CoordinatorMode::MonitoringOnly,
        }
    }

    fn require_coordinator(&self) -> Result<&EvmCoordinator> {
        self.coordinator
            .as_deref()
            .context("ARBITRUM_COORDINATOR is not configured")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Cycle => run_once(&config).await,
        Commands::Status => show_status(&config).await,
        Commands::Funding { coins } => show_funding(&config, &coins).await,
        Commands::Rebalance { min_amount_out, yes } => {
            confirm(yes, "executeRebalance")?;
            let wiring = Wiring::new(&config)?;
            let receipt = ledger::sync::execute_rebalance(
                wiring.require_coordinator()?,
                min_amount_out,
                &config.wait_policy(),
            )
            .await?;
            info!("✅ Rebalance confirmed: {} (block {})", receipt.tx_hash, receipt.block_number);
            Ok(())
        }
        Commands::OpenShort {
            size,
            max_slippage_bps,
            yes,
        } => {
            confirm(yes, "openShort")?;
            if size <= Decimal::ZERO {
                bail!("--size must be positive");
            }
            let size_wei = to_fixed_floor(size, WEI_DECIMALS)?;
            let wiring = Wiring::new(&config)?;
            let receipt = ledger::sync::open_short(
                &*wiring.vault,
                size_wei,
                max_slippage_bps,
                &config.wait_policy(),
            )
            .await?;
            info!("✅ Short of {} ETH opened: {} (block {})", size, receipt.tx_hash, receipt.block_number);
            Ok(())
        }
        Commands::CloseShort { yes } => {
            confirm(yes, "closeShort")?;
            let wiring = Wiring::new(&config)?;
            let receipt = ledger::sync::close_short(&*wiring.vault, &config.wait_policy()).await?;
            info!("✅ Short closed: {} (block {})", receipt.tx_hash, receipt.block_number);
            Ok(())
        }
    }
}

fn confirm(yes: bool, action: &str) -> Result<()> {
    if !yes {
        bail!("{} sends an on-chain transaction; re-run with --yes to confirm", action);
    }
    Ok(())
}

fn build_scheduler(config: &Config, wiring: &Wiring) -> Result<Scheduler> {
    let market = HyperliquidClient::new(&config.market.api_url, config.market_timeout())?;

    let sink = TracingSink::new(SinkSettings {
        delta_threshold_bps: config.strategy.delta_threshold_bps,
        min_funding_rate: config.strategy.min_funding_rate,
        funding_periods_per_day: config.strategy.funding_periods_per_day,
        unfavorable_funding_alert_cycles: config.strategy.unfavorable_funding_alert_cycles,
    });

    Ok(Scheduler::new(
        Arc::new(market),
        wiring.vault.clone(),
        wiring.coordinator_mode(),
        Arc::new(sink),
        SchedulerSettings {
            symbol: config.strategy.symbol.clone(),
            delta_threshold_bps: config.strategy.delta_threshold_bps,
            min_funding_rate: config.strategy.min_funding_rate,
            scan_interval: config.scan_interval(),
            sync_wait: config.wait_policy(),
        },
    ))
}

async fn run(config: &Config) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║       Delta Neutral Keeper v{}                          ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("║       HyperEVM (Perp Short) + Arbitrum (Spot Long)         ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let wiring = match Wiring::new(config) {
        Ok(wiring) => wiring,
        Err(e) => {
            error!("❌ Configuration error: {:#}", e);
            return Err(e);
        }
    };
    log_config(config, &wiring);

    if wiring.coordinator.is_none() {
        warn!("⚠️  ARBITRUM_COORDINATOR not set. Running in monitoring-only mode.");
    }

    let mut scheduler = build_scheduler(config, &wiring)?;

    let (shutdown, stop) = ShutdownHandle::new();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown.stop();
    });

    scheduler.run(stop).await;

    info!("👋 Delta Neutral Keeper shutdown complete");
    Ok(())
}

async fn run_once(config: &Config) -> Result<()> {
    let wiring = Wiring::new(config)?;
    let mut scheduler = build_scheduler(config, &wiring)?;

    let outcome = scheduler.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&*outcome)?);
    Ok(())
}

/// Initialize logging to stdout and a daily rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "keeper.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("delta_neutral_keeper=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config, wiring: &Wiring) {
    info!("📋 Configuration:");
    info!("   Keeper: {}", wiring.hyperevm.keeper_address());
    info!("   HyperEVM RPC: {}", config.networks.hyperevm_rpc);
    info!("   Arbitrum RPC: {}", config.networks.arbitrum_rpc);
    info!("   Vault: {}", wiring.vault.address());
    match &wiring.coordinator {
        Some(coordinator) => info!("   Coordinator: {}", coordinator.address()),
        None => info!("   Coordinator: (not configured)"),
    }
    info!("   Symbol: {}", config.strategy.symbol);
    info!(
        "   Delta Threshold: {} bps ({}%)",
        config.strategy.delta_threshold_bps,
        Decimal::from(config.strategy.delta_threshold_bps) / Decimal::from(100)
    );
    info!(
        "   Min Funding Rate: {:.4}%",
        config.strategy.min_funding_rate * Decimal::from(100)
    );
    info!("   Scan Interval: {}s", config.strategy.scan_interval_ms / 1000);
}

/// Print wallet, vault, coordinator and spot vault state.
async fn show_status(config: &Config) -> Result<()> {
    let wiring = Wiring::new(config)?;
    let keeper = wiring.hyperevm.keeper_address();

    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║                    KEEPER STATUS                           ║");
    info!("╠════════════════════════════════════════════════════════════╣");
    info!("║ Keeper address: {}", keeper);

    let (hyper_balance, arb_balance) =
        tokio::join!(wiring.hyperevm.keeper_balance(), wiring.arbitrum.keeper_balance());
    log_balance(wiring.hyperevm.name(), hyper_balance);
    log_balance(wiring.arbitrum.name(), arb_balance);

    info!("╠════════════════════════════════════════════════════════════╣");
    info!("║ 📊 HYPEREVM VAULT {}", wiring.vault.address());
    match read_vault_state(&*wiring.vault).await {
        Ok(state) => {
            info!("║   State: {}", state.lifecycle_state);
            info!("║   Spot Value: ${}", state.spot_value()?);
            info!("║   Perp Short: {} ETH", state.perp_short_size()?);
        }
        Err(e) => error!("║   ❌ {}", e),
    }
    log_on_chain_check(&check_vault_on_chain(&*wiring.vault).await);

    if let Some(coordinator) = &wiring.coordinator {
        info!("╠════════════════════════════════════════════════════════════╣");
        info!("║ ⚖️  COORDINATOR {}", coordinator.address());
        match read_coordinator_state(&**coordinator).await {
            Ok(state) => {
                info!("║   Strategy Active: {}", state.is_strategy_active);
                info!("║   Spot Value: ${}", state.spot_value()?);
                info!("║   Perp Short Value: ${}", state.perp_value()?);
                info!(
                    "║   Perp Short Size: {} ETH",
                    from_fixed(state.perp_short_size_wei, WEI_DECIMALS)?
                );
                info!("║   Last Sync: {}", format_sync_time(state.last_sync_time));

                // priced at the last sync, not now
                let local = evaluate(
                    state.spot_value()?,
                    state.perp_value()?,
                    config.strategy.delta_threshold_bps,
                );
                info!(
                    "║   Local Delta: ${} ({} bps, rebalance {})",
                    local.delta_usd,
                    local.delta_ratio_bps,
                    if local.needs_rebalance { "recommended" } else { "not needed" }
                );
            }
            Err(e) => error!("║   ❌ {}", e),
        }
        log_on_chain_check(&check_coordinator_on_chain(&**coordinator).await);
    }

    if let Some(spot_vault) = &wiring.spot_vault {
        info!("╠════════════════════════════════════════════════════════════╣");
        info!("║ 🏦 SPOT VAULT");
        match spot_vault.read_state().await {
            Ok(state) => {
                info!("║   State: {}", state.lifecycle_state);
                info!("║   Target ETH: {}", from_fixed(state.target_eth_wei, WEI_DECIMALS)?);
                info!("║   WETH Balance: {}", from_fixed(state.weth_balance_wei, WEI_DECIMALS)?);
                info!("║   USDC Balance: {}", from_fixed(state.usdc_balance, USD_DECIMALS)?);
            }
            Err(e) => error!("║   ❌ {:#}", e),
        }
    }

    info!("╚════════════════════════════════════════════════════════════╝");
    Ok(())
}

fn log_on_chain_check(check: &OnChainCheck) {
    match check.delta.require() {
        Ok((delta, bps)) => info!("║   On-chain Delta: ${} ({} bps)", delta, bps),
        Err(e) => info!("║   On-chain Delta: {}", e),
    }
    match check.needs_rebalance {
        Some(flag) => info!("║   On-chain Needs Rebalance: {}", flag),
        None => info!("║   On-chain Needs Rebalance: unavailable"),
    }
}

fn log_balance(network: &str, balance: Result<u128>) {
    match balance.and_then(|wei| from_fixed(wei, WEI_DECIMALS)) {
        Ok(eth) => info!("║ Gas balance ({}): {} ETH", network, eth),
        Err(e) => warn!("║ Gas balance ({}): unavailable ({:#})", network, e),
    }
}

fn format_sync_time(secs: u64) -> String {
    if secs == 0 {
        return "never".to_string();
    }
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// Print the funding table. Requires no wallet configuration.
async fn show_funding(config: &Config, coins: &[String]) -> Result<()> {
    info!("📊 Checking Hyperliquid funding rates...");

    let client = HyperliquidClient::new(&config.market.api_url, config.market_timeout())?;
    let periods = config.strategy.funding_periods_per_day;
    let rows = client.fetch_market_snapshots(coins).await?;

    info!("┌─────────┬──────────────┬──────────┬──────────────┬──────────────┐");
    info!("│  Coin   │ Funding Rate │   APR    │   Mark Px    │  Oracle Px   │");
    info!("├─────────┼──────────────┼──────────┼──────────────┼──────────────┤");
    for (coin, row) in &rows {
        match row {
            Ok(snapshot) => {
                let funding_pct = (snapshot.funding_rate * Decimal::from(100)).round_dp(6);
                let apr = annualized_apr_pct(snapshot.funding_rate, periods).round_dp(1);
                info!(
                    "│ {:<7} │ {:>11}% │ {:>7}% │ ${:>11} │ ${:>11} │",
                    coin,
                    funding_pct,
                    apr,
                    snapshot.mark_price.round_dp(2),
                    snapshot.oracle_price.round_dp(2)
                );
            }
            Err(e) => {
                warn!("│ {:<7} │     ERROR    │  ERROR   │     ERROR    │     ERROR    │ {}", coin, e);
            }
        }
    }
    info!("└─────────┴──────────────┴──────────┴──────────────┴──────────────┘");

    let symbol = &config.strategy.symbol;
    if let Some((_, Ok(snapshot))) = rows.iter().find(|(coin, _)| coin.eq_ignore_ascii_case(symbol)) {
        let apr = annualized_apr_pct(snapshot.funding_rate, periods).round_dp(2);
        info!("📈 {} annualized funding: {}% APR", snapshot.symbol, apr);
        if is_funding_favorable(snapshot, config.strategy.min_funding_rate) {
            info!("   ✅ Favorable (short earns)");
        } else {
            info!("   ⚠️  Below minimum {} (short not earning enough)", config.strategy.min_funding_rate);
        }
    }

    Ok(())
}
