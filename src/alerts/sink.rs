//! Metrics/alert sink.
//!
//! The sink owns process-level counters (cycle count, last cycle time, the
//! unfavorable-funding streak). The scheduler only hands it outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

use super::types::{Alert, AlertKind, AlertSeverity};
use crate::keeper::CycleOutcome;
use crate::strategy::annualized_apr_pct;

/// Destination for metrics and alerts. Fire-and-forget.
pub trait MetricsSink: Send + Sync {
    fn metric(&self, name: &str, value: Decimal, timestamp: DateTime<Utc>, tags: &[(&str, &str)]);
    fn alert(&self, alert: Alert);
    fn record_cycle(&self, outcome: &CycleOutcome);
}

/// Thresholds the tracker needs to derive alerts.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub delta_threshold_bps: u32,
    pub min_funding_rate: Decimal,
    pub funding_periods_per_day: u32,
    /// Consecutive unfavorable cycles before alerting
    pub unfavorable_funding_alert_cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: &'static str,
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<(String, String)>,
}

/// Turns outcomes into metric points and alerts.
#[derive(Debug)]
pub struct CycleTracker {
    settings: SinkSettings,
    cycle_count: u64,
    last_cycle_at: Option<DateTime<Utc>>,
    unfavorable_streak: u32,
}

impl CycleTracker {
    pub fn new(settings: SinkSettings) -> Self {
        Self {
            settings,
            cycle_count: 0,
            last_cycle_at: None,
            unfavorable_streak: 0,
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.last_cycle_at
    }

    pub fn unfavorable_streak(&self) -> u32 {
        self.unfavorable_streak
    }

    pub fn observe(&mut self, outcome: &CycleOutcome) -> (Vec<MetricPoint>, Vec<Alert>) {
        self.cycle_count += 1;
        self.last_cycle_at = Some(outcome.timestamp);

        let ts = outcome.timestamp;
        let mut metrics = Vec::new();
        let mut alerts = Vec::new();

        let point = |name: &'static str, value: Decimal, tags: Vec<(String, String)>| MetricPoint {
            name,
            value,
            timestamp: ts,
            tags,
        };

        if let Some(market) = &outcome.market {
            let tags = vec![("symbol".to_string(), market.symbol.clone())];
            metrics.push(point("funding_rate", market.funding_rate, tags.clone()));
            metrics.push(point("mark_price", market.mark_price, tags.clone()));
            metrics.push(point("oracle_price", market.oracle_price, tags.clone()));
            metrics.push(point(
                "annualized_apr_pct",
                annualized_apr_pct(market.funding_rate, self.settings.funding_periods_per_day),
                tags,
            ));
        }

        if let Some(vault) = &outcome.vault {
            if let Ok(spot) = vault.spot_value() {
                metrics.push(point("vault_spot_value_usd", spot, Vec::new()));
            }
            if let Ok(size) = vault.perp_short_size() {
                metrics.push(point("vault_perp_short_eth", size, Vec::new()));
            }
        }

        if let Some(delta) = &outcome.delta {
            metrics.push(point("delta_usd", delta.delta_usd, Vec::new()));
            metrics.push(point("delta_ratio_bps", Decimal::from(delta.delta_ratio_bps), Vec::new()));

            if delta.needs_rebalance {
                alerts.push(Alert::new(
                    outcome.cycle,
                    AlertSeverity::Warning,
                    AlertKind::RebalanceRecommended {
                        delta_usd: delta.delta_usd,
                        delta_ratio_bps: delta.delta_ratio_bps,
                        threshold_bps: self.settings.delta_threshold_bps,
                    },
                    format!(
                        "Delta {} bps (${}) at or above threshold {} bps; operator rebalance recommended",
                        delta.delta_ratio_bps, delta.delta_usd, self.settings.delta_threshold_bps
                    ),
                ));
            }
        }

        match outcome.funding_favorable {
            Some(true) => self.unfavorable_streak = 0,
            Some(false) => {
                self.unfavorable_streak += 1;
                let every = self.settings.unfavorable_funding_alert_cycles.max(1);
                if self.unfavorable_streak % every == 0 {
                    if let Some(market) = &outcome.market {
                        alerts.push(Alert::new(
                            outcome.cycle,
                            AlertSeverity::Warning,
                            AlertKind::FundingUnfavorable {
                                symbol: market.symbol.clone(),
                                funding_rate: market.funding_rate,
                                min_funding_rate: self.settings.min_funding_rate,
                                consecutive_cycles: self.unfavorable_streak,
                            },
                            format!(
                                "{} funding {} at or below {} for {} consecutive cycles",
                                market.symbol,
                                market.funding_rate,
                                self.settings.min_funding_rate,
                                self.unfavorable_streak
                            ),
                        ));
                    }
                }
            }
            // not fetched: streak carries over
            None => {}
        }

        for failure in outcome.errors.iter().filter(|f| f.error.is_alertable()) {
            alerts.push(Alert::new(
                outcome.cycle,
                AlertSeverity::Error,
                AlertKind::StepFailed {
                    step: failure.step,
                    error: failure.error.clone(),
                },
                format!("{} step failed: {}", failure.step, failure.error),
            ));
        }

        metrics.push(point("cycle_errors", Decimal::from(outcome.errors.len()), Vec::new()));
        metrics.push(point("cycle_count", Decimal::from(self.cycle_count), Vec::new()));

        (metrics, alerts)
    }
}

/// Sink writing to `tracing` under the `keeper_metric` and `keeper_alert`
/// targets.
#[derive(Debug)]
pub struct TracingSink {
    tracker: Mutex<CycleTracker>,
}

impl TracingSink {
    pub fn new(settings: SinkSettings) -> Self {
        Self {
            tracker: Mutex::new(CycleTracker::new(settings)),
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cycle_count()
    }
}

impl MetricsSink for TracingSink {
    fn metric(&self, name: &str, value: Decimal, timestamp: DateTime<Utc>, tags: &[(&str, &str)]) {
        info!(
            target: "keeper_metric",
            metric = name,
            value = %value,
            timestamp = %timestamp.to_rfc3339(),
            tags = ?tags,
            "KEEPER_METRIC"
        );
    }

    fn alert(&self, alert: Alert) {
        alert.emit();
    }

    fn record_cycle(&self, outcome: &CycleOutcome) {
        let (metrics, alerts) = self
            .tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .observe(outcome);

        for point in &metrics {
            let tags: Vec<(&str, &str)> = point
                .tags
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            self.metric(point.name, point.value, point.timestamp, &tags);
        }
        for alert in alerts {
            self.alert(alert);
        }
    }
}

/// Sink that keeps everything in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub outcomes: Mutex<Vec<CycleOutcome>>,
    pub metrics: Mutex<Vec<(String, DateTime<Utc>)>>,
    pub alerts: Mutex<Vec<Alert>>,
}

#[cfg(test)]
impl MetricsSink for RecordingSink {
    fn metric(&self, name: &str, _value: Decimal, timestamp: DateTime<Utc>, _tags: &[(&str, &str)]) {
        self.metrics.lock().unwrap().push((name.to_string(), timestamp));
    }

    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }

    fn record_cycle(&self, outcome: &CycleOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeeperError;
    use crate::keeper::Step;
    use crate::market::MarketSnapshot;
    use crate::strategy::DeltaResult;
    use rust_decimal_macros::dec;

    fn settings() -> SinkSettings {
        SinkSettings {
            delta_threshold_bps: 500,
            min_funding_rate: dec!(0.0001),
            funding_periods_per_day: 3,
            unfavorable_funding_alert_cycles: 3,
        }
    }

    fn snapshot(rate: Decimal) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "ETH".to_string(),
            funding_rate: rate,
            mark_price: dec!(3500),
            oracle_price: dec!(3499.5),
            open_interest: dec!(1000),
            observed_at: Utc::now(),
        }
    }

    fn outcome_with_funding(cycle: u64, favorable: bool) -> CycleOutcome {
        let mut outcome = CycleOutcome::new(cycle, Utc::now());
        outcome.market = Some(snapshot(if favorable { dec!(0.00012) } else { dec!(0.00005) }));
        outcome.funding_favorable = Some(favorable);
        outcome
    }

    fn metric<'a>(metrics: &'a [MetricPoint], name: &str) -> Option<&'a MetricPoint> {
        metrics.iter().find(|m| m.name == name)
    }

    #[test]
    fn test_market_metrics_and_counter() {
        let mut tracker = CycleTracker::new(settings());
        let (metrics, alerts) = tracker.observe(&outcome_with_funding(1, true));

        assert!(alerts.is_empty());
        assert_eq!(metric(&metrics, "annualized_apr_pct").unwrap().value, dec!(13.14));
        assert_eq!(metric(&metrics, "cycle_count").unwrap().value, dec!(1));
        assert_eq!(metric(&metrics, "cycle_errors").unwrap().value, dec!(0));
        assert!(metric(&metrics, "delta_usd").is_none());
        assert!(tracker.last_cycle_at().is_some());
    }

    #[test]
    fn test_rebalance_alert_is_warning() {
        let mut tracker = CycleTracker::new(settings());
        let mut outcome = CycleOutcome::new(1, Utc::now());
        outcome.delta = Some(DeltaResult {
            delta_usd: dec!(5000),
            delta_ratio_bps: 500,
            needs_rebalance: true,
        });

        let (metrics, alerts) = tracker.observe(&outcome);
        assert_eq!(metric(&metrics, "delta_ratio_bps").unwrap().value, dec!(500));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert!(matches!(alerts[0].kind, AlertKind::RebalanceRecommended { .. }));
    }

    #[test]
    fn test_unfavorable_funding_alerts_after_streak() {
        let mut tracker = CycleTracker::new(settings());

        assert!(tracker.observe(&outcome_with_funding(1, false)).1.is_empty());
        assert!(tracker.observe(&outcome_with_funding(2, false)).1.is_empty());
        // a cycle without market data keeps the streak
        assert!(tracker.observe(&CycleOutcome::new(3, Utc::now())).1.is_empty());

        let (_, alerts) = tracker.observe(&outcome_with_funding(4, false));
        assert_eq!(alerts.len(), 1);
        match &alerts[0].kind {
            AlertKind::FundingUnfavorable {
                consecutive_cycles, ..
            } => assert_eq!(*consecutive_cycles, 3),
            other => panic!("unexpected alert: {other:?}"),
        }

        tracker.observe(&outcome_with_funding(5, true));
        assert_eq!(tracker.unfavorable_streak(), 0);
    }

    #[test]
    fn test_step_failures_alert_except_delta_unavailable() {
        let mut tracker = CycleTracker::new(settings());
        let mut outcome = CycleOutcome::new(1, Utc::now());
        outcome.record_failure(Step::Market, KeeperError::MarketDataUnavailable("503".into()));
        outcome.record_failure(Step::Coordinator, KeeperError::DeltaComputationUnavailable);

        let (metrics, alerts) = tracker.observe(&outcome);
        assert_eq!(metric(&metrics, "cycle_errors").unwrap().value, dec!(2));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Error);
        assert_eq!(alerts[0].category, "step_failure");
    }

    #[test]
    fn test_metric_points_carry_cycle_timestamp() {
        let mut tracker = CycleTracker::new(settings());
        let at = Utc::now() - chrono::Duration::minutes(5);
        let mut outcome = outcome_with_funding(1, true);
        outcome.timestamp = at;

        let (metrics, _) = tracker.observe(&outcome);
        assert!(!metrics.is_empty());
        assert!(metrics.iter().all(|m| m.timestamp == at));

        let recorder = RecordingSink::default();
        for point in &metrics {
            recorder.metric(point.name, point.value, point.timestamp, &[]);
        }
        assert!(recorder.metrics.lock().unwrap().iter().all(|(_, ts)| *ts == at));
    }

    #[test]
    fn test_tracing_sink_counts_cycles() {
        let sink = TracingSink::new(settings());
        sink.record_cycle(&outcome_with_funding(1, true));
        sink.record_cycle(&outcome_with_funding(2, false));
        assert_eq!(sink.cycle_count(), 2);
    }
}
