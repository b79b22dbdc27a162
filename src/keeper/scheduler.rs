//! Reconciliation cycle scheduler.
//!
//! One cycle: (market ∥ vault) → sync → coordinator → delta → record.
//! Step failures are caught at the step boundary and recorded in the
//! outcome; nothing escapes a cycle. Cycles never overlap.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::outcome::{CycleOutcome, Step};
use crate::alerts::MetricsSink;
use crate::error::KeeperError;
use crate::ledger::{
    perp_value_usd_units, read_coordinator_state, read_vault_state, sync_position,
    CoordinatorLedger, CoordinatorState, TxReceipt, VaultLedger, VaultState, WaitPolicy,
};
use crate::market::{MarketDataSource, MarketSnapshot};
use crate::strategy::{evaluate, is_funding_favorable};

/// Whether a second-ledger coordinator is available.
#[derive(Clone)]
pub enum CoordinatorMode {
    Configured(Arc<dyn CoordinatorLedger>),
    /// Observe and record the first ledger and market only
    MonitoringOnly,
}

impl CoordinatorMode {
    pub fn is_configured(&self) -> bool {
        matches!(self, CoordinatorMode::Configured(_))
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub symbol: String,
    pub delta_threshold_bps: u32,
    pub min_funding_rate: Decimal,
    pub scan_interval: Duration,
    pub sync_wait: WaitPolicy,
}

/// Stop signal for a running scheduler.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

pub type LatestOutcome = watch::Receiver<Option<Arc<CycleOutcome>>>;

pub struct Scheduler {
    market: Arc<dyn MarketDataSource>,
    vault: Arc<dyn VaultLedger>,
    coordinator: CoordinatorMode,
    sink: Arc<dyn MetricsSink>,
    settings: SchedulerSettings,
    cycle: u64,
    latest: watch::Sender<Option<Arc<CycleOutcome>>>,
}

impl Scheduler {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        vault: Arc<dyn VaultLedger>,
        coordinator: CoordinatorMode,
        sink: Arc<dyn MetricsSink>,
        settings: SchedulerSettings,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            market,
            vault,
            coordinator,
            sink,
            settings,
            cycle: 0,
            latest,
        }
    }

    /// Readers of the most recently completed cycle.
    pub fn subscribe(&self) -> LatestOutcome {
        self.latest.subscribe()
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Run cycles until `stop` flips to true.
    ///
    /// Stop is checked at cycle boundaries and interrupts the inter-cycle
    /// sleep; an in-flight cycle is allowed to finish.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        info!(
            "🚀 Starting reconciliation loop (interval {:?}, coordinator {})",
            self.settings.scan_interval,
            if self.coordinator.is_configured() { "configured" } else { "not configured" }
        );

        while !*stop.borrow() {
            self.run_cycle().await;

            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.scan_interval) => {}
                changed = stop.changed() => {
                    // sender dropped: nobody can stop us anymore, so stop now
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("🛑 Reconciliation loop stopped after {} cycles", self.cycle);
    }

    /// Run a single reconciliation cycle and publish its outcome.
    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> Arc<CycleOutcome> {
        self.cycle += 1;
        let mut outcome = CycleOutcome::new(self.cycle, Utc::now());

        info!("📡 [CYCLE] Starting cycle #{}", self.cycle);

        let (market, vault) = tokio::join!(
            self.market.fetch_market_snapshot(&self.settings.symbol),
            read_vault_state(self.vault.as_ref()),
        );

        match market {
            Ok(snapshot) => {
                let favorable = is_funding_favorable(&snapshot, self.settings.min_funding_rate);
                info!(
                    symbol = %snapshot.symbol,
                    funding_rate = %snapshot.funding_rate,
                    mark_price = %snapshot.mark_price,
                    favorable,
                    "📊 [MARKET] Snapshot fetched"
                );
                outcome.funding_favorable = Some(favorable);
                outcome.market = Some(snapshot);
            }
            Err(e) => fail(&mut outcome, Step::Market, e),
        }

        match vault {
            Ok(state) => {
                info!(
                    lifecycle = %state.lifecycle_state,
                    spot_value_usd = state.spot_value_usd,
                    perp_short_size_wei = state.perp_short_size_wei,
                    on_chain_delta = state.on_chain_delta.is_available(),
                    "🏦 [VAULT] State read"
                );
                outcome.vault = Some(state);
            }
            Err(e) => fail(&mut outcome, Step::Vault, e),
        }

        if let CoordinatorMode::Configured(coordinator) = &self.coordinator {
            let coordinator = coordinator.clone();

            let synced = match (&outcome.market, &outcome.vault) {
                (Some(market), Some(vault)) => {
                    Some(self.sync(coordinator.as_ref(), market, vault).await)
                }
                _ => {
                    warn!("⚠️  [SYNC] Skipped: market or vault data missing this cycle");
                    None
                }
            };

            // the coordinator's perp leg is only priced by this cycle once the sync lands
            let priced_this_cycle = match synced {
                Some(Ok(receipt)) => {
                    outcome.sync_tx_hash = Some(receipt.tx_hash);
                    true
                }
                Some(Err(e)) => {
                    fail(&mut outcome, Step::Sync, e);
                    false
                }
                None => false,
            };

            match read_coordinator_state(coordinator.as_ref()).await {
                Ok(state) => {
                    if priced_this_cycle {
                        outcome.delta = self.evaluate_delta(&state);
                    } else {
                        warn!("⚠️  [DELTA] Not evaluated: coordinator perp value was not synced this cycle");
                    }
                    outcome.coordinator = Some(state);
                }
                Err(e) => fail(&mut outcome, Step::Coordinator, e),
            }
        }

        if let Some(delta) = &outcome.delta {
            let msg = if delta.needs_rebalance { "REBALANCE RECOMMENDED" } else { "within threshold" };
            info!(
                delta_usd = %delta.delta_usd,
                delta_ratio_bps = delta.delta_ratio_bps,
                threshold_bps = self.settings.delta_threshold_bps,
                "⚖️  [DELTA] {}",
                msg
            );
        }

        info!(
            errors = outcome.errors.len(),
            "✅ [CYCLE] Cycle #{} complete",
            outcome.cycle
        );

        let outcome = Arc::new(outcome);
        self.latest.send_replace(Some(outcome.clone()));
        self.sink.record_cycle(&outcome);
        outcome
    }

    async fn sync(
        &self,
        coordinator: &dyn CoordinatorLedger,
        market: &MarketSnapshot,
        vault: &VaultState,
    ) -> Result<TxReceipt, KeeperError> {
        let value_usd = perp_value_usd_units(vault.perp_short_size_wei, market.mark_price)
            .map_err(|e| KeeperError::SyncTransactionFailed(format!("perp value: {:#}", e)))?;

        info!(
            perp_short_size_wei = vault.perp_short_size_wei,
            perp_value_usd = value_usd,
            "🔄 [SYNC] Syncing perp position to coordinator"
        );

        sync_position(
            coordinator,
            vault.perp_short_size_wei,
            value_usd,
            &self.settings.sync_wait,
        )
        .await
    }

    fn evaluate_delta(&self, state: &CoordinatorState) -> Option<crate::strategy::DeltaResult> {
        match (state.spot_value(), state.perp_value()) {
            (Ok(spot), Ok(perp)) => Some(evaluate(spot, perp, self.settings.delta_threshold_bps)),
            _ => {
                warn!("Coordinator values out of range; delta not evaluated");
                None
            }
        }
    }
}

fn fail(outcome: &mut CycleOutcome, step: Step, e: KeeperError) {
    error!(step = %step, code = e.code(), error = %e, "❌ Step failed");
    outcome.record_failure(step, e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::RecordingSink;
    use crate::ledger::testing::{FakeCoordinator, FakeVault};
    use crate::market::MockMarketDataSource;
    use rust_decimal_macros::dec;

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            symbol: "ETH".to_string(),
            delta_threshold_bps: 500,
            min_funding_rate: dec!(0.0001),
            scan_interval: Duration::from_secs(3600),
            sync_wait: WaitPolicy {
                timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
            },
        }
    }

    fn market_ok(mark: Decimal) -> MockMarketDataSource {
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_market_snapshot().returning(move |symbol| {
            Ok(MarketSnapshot {
                symbol: symbol.to_string(),
                funding_rate: dec!(0.00012),
                mark_price: mark,
                oracle_price: mark,
                open_interest: dec!(1000),
                observed_at: Utc::now(),
            })
        });
        market
    }

    fn market_down() -> MockMarketDataSource {
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_market_snapshot()
            .returning(|_| Err(KeeperError::MarketDataUnavailable("HTTP 503".into())));
        market
    }

    fn scheduler(
        market: MockMarketDataSource,
        vault: Arc<FakeVault>,
        coordinator: CoordinatorMode,
        sink: Arc<RecordingSink>,
    ) -> Scheduler {
        Scheduler::new(Arc::new(market), vault, coordinator, sink, settings())
    }

    #[tokio::test]
    async fn test_full_cycle_syncs_then_evaluates() {
        let vault = Arc::new(FakeVault::new(1, 100_000_000_000, 20 * ETH));
        let coordinator = Arc::new(FakeCoordinator::new(100_000_000_000));
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(
            market_ok(dec!(4750)),
            vault,
            CoordinatorMode::Configured(coordinator.clone()),
            sink.clone(),
        );

        let outcome = scheduler.run_cycle().await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.funding_favorable, Some(true));
        assert!(outcome.sync_tx_hash.is_some());
        assert_eq!(coordinator.position(), (20 * ETH, 95_000_000_000));

        // delta comes from the coordinator as read after the sync
        let delta = outcome.delta.unwrap();
        assert_eq!(delta.delta_usd, dec!(5000));
        assert_eq!(delta.delta_ratio_bps, 500);
        assert!(delta.needs_rebalance);
        assert_eq!(outcome.coordinator.as_ref().unwrap().perp_short_value_usd, 95_000_000_000);

        assert_eq!(sink.outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_market_failure_keeps_vault_data() {
        let vault = Arc::new(FakeVault::new(1, 100_000_000_000, 20 * ETH));
        let coordinator = Arc::new(FakeCoordinator::new(100_000_000_000));
        let mut scheduler = scheduler(
            market_down(),
            vault,
            CoordinatorMode::Configured(coordinator.clone()),
            Arc::new(RecordingSink::default()),
        );

        let outcome = scheduler.run_cycle().await;

        assert!(outcome.market.is_none());
        assert!(outcome.funding_favorable.is_none());
        assert_eq!(outcome.vault.as_ref().unwrap().spot_value_usd, 100_000_000_000);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.failed(Step::Market));

        // sync skipped, not failed
        assert_eq!(coordinator.sync_calls(), 0);
        assert!(outcome.sync_tx_hash.is_none());
        assert!(outcome.coordinator.is_some());
        assert!(outcome.delta.is_none());
    }

    #[tokio::test]
    async fn test_market_failure_ignores_previously_synced_value() {
        let vault = Arc::new(FakeVault::new(1, 100_000_000_000, 20 * ETH));
        let coordinator = Arc::new(FakeCoordinator::new(100_000_000_000));
        let sink = Arc::new(RecordingSink::default());

        let mut first = scheduler(
            market_ok(dec!(4750)),
            vault.clone(),
            CoordinatorMode::Configured(coordinator.clone()),
            sink.clone(),
        );
        assert!(first.run_cycle().await.delta.is_some());
        assert_eq!(coordinator.position(), (20 * ETH, 95_000_000_000));

        let mut second = scheduler(
            market_down(),
            vault,
            CoordinatorMode::Configured(coordinator.clone()),
            sink,
        );
        let outcome = second.run_cycle().await;

        // the coordinator still carries the earlier mark; it must not drive a decision
        assert!(outcome.failed(Step::Market));
        assert_eq!(outcome.coordinator.as_ref().unwrap().perp_short_value_usd, 95_000_000_000);
        assert!(outcome.delta.is_none());
    }

    #[tokio::test]
    async fn test_vault_failure_skips_sync() {
        let vault = Arc::new(FakeVault::new(1, 1, 1));
        vault.fail_reads(true);
        let coordinator = Arc::new(FakeCoordinator::new(1_000_000));
        let mut scheduler = scheduler(
            market_ok(dec!(3500)),
            vault,
            CoordinatorMode::Configured(coordinator.clone()),
            Arc::new(RecordingSink::default()),
        );

        let outcome = scheduler.run_cycle().await;

        assert!(outcome.market.is_some());
        assert!(outcome.failed(Step::Vault));
        assert!(!outcome.failed(Step::Sync));
        assert_eq!(coordinator.sync_calls(), 0);
    }

    #[tokio::test]
    async fn test_monitoring_only_skips_coordinator() {
        let vault = Arc::new(FakeVault::new(1, 100_000_000_000, 20 * ETH));
        let mut scheduler = scheduler(
            market_ok(dec!(4750)),
            vault,
            CoordinatorMode::MonitoringOnly,
            Arc::new(RecordingSink::default()),
        );

        let outcome = scheduler.run_cycle().await;

        assert!(outcome.is_clean());
        assert!(outcome.market.is_some() && outcome.vault.is_some());
        assert!(outcome.coordinator.is_none());
        assert!(outcome.delta.is_none());
        assert!(outcome.sync_tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_block_coordinator_read() {
        let vault = Arc::new(FakeVault::new(1, 100_000_000_000, 20 * ETH));
        let coordinator = Arc::new(FakeCoordinator::new(100_000_000_000));
        coordinator.fail_submissions(true);
        let mut scheduler = scheduler(
            market_ok(dec!(4750)),
            vault,
            CoordinatorMode::Configured(coordinator.clone()),
            Arc::new(RecordingSink::default()),
        );

        let outcome = scheduler.run_cycle().await;

        assert!(outcome.failed(Step::Sync));
        assert!(outcome.coordinator.is_some());
        // coordinator values predate this cycle's price
        assert!(outcome.delta.is_none());
    }

    #[tokio::test]
    async fn test_latest_outcome_is_published() {
        let vault = Arc::new(FakeVault::new(0, 0, 0));
        let mut scheduler = scheduler(
            market_ok(dec!(3500)),
            vault,
            CoordinatorMode::MonitoringOnly,
            Arc::new(RecordingSink::default()),
        );
        let latest = scheduler.subscribe();
        assert!(latest.borrow().is_none());

        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        assert_eq!(latest.borrow().as_ref().unwrap().cycle, 2);
        assert_eq!(scheduler.cycles_run(), 2);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let vault = Arc::new(FakeVault::new(0, 0, 0));
        let mut scheduler = scheduler(
            market_ok(dec!(3500)),
            vault,
            CoordinatorMode::MonitoringOnly,
            Arc::new(RecordingSink::default()),
        );
        let mut latest = scheduler.subscribe();
        let (shutdown, stop) = ShutdownHandle::new();

        let task = tokio::spawn(async move {
            scheduler.run(stop).await;
            scheduler.cycles_run()
        });

        latest.changed().await.unwrap();
        shutdown.stop();

        let cycles = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(cycles, 1);
    }

    #[tokio::test]
    async fn test_stopped_before_start_runs_nothing() {
        let vault = Arc::new(FakeVault::new(0, 0, 0));
        let mut scheduler = scheduler(
            MockMarketDataSource::new(),
            vault,
            CoordinatorMode::MonitoringOnly,
            Arc::new(RecordingSink::default()),
        );
        let (shutdown, stop) = ShutdownHandle::new();
        shutdown.stop();

        scheduler.run(stop).await;
        assert_eq!(scheduler.cycles_run(), 0);
    }
}
