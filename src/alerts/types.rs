//! Alert records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::KeeperError;
use crate::keeper::Step;

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// What an alert is about.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum AlertKind {
    /// Delta ratio at or above the rebalance threshold
    RebalanceRecommended {
        delta_usd: Decimal,
        delta_ratio_bps: u32,
        threshold_bps: u32,
    },
    /// Funding has been at or below the minimum for several cycles
    FundingUnfavorable {
        symbol: String,
        funding_rate: Decimal,
        min_funding_rate: Decimal,
        consecutive_cycles: u32,
    },
    /// A cycle step failed
    StepFailed { step: Step, error: KeeperError },
}

impl AlertKind {
    pub fn category(&self) -> &'static str {
        match self {
            AlertKind::RebalanceRecommended { .. } => "rebalance",
            AlertKind::FundingUnfavorable { .. } => "funding",
            AlertKind::StepFailed { .. } => "step_failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    pub severity: AlertSeverity,
    pub category: &'static str,
    pub message: String,
    pub kind: AlertKind,
}

impl Alert {
    pub fn new(cycle: u64, severity: AlertSeverity, kind: AlertKind, message: String) -> Self {
        let timestamp = Utc::now();
        Self {
            alert_id: format!("{}-{}-{}", kind.category(), cycle, timestamp.timestamp_millis()),
            timestamp,
            cycle,
            severity,
            category: kind.category(),
            message,
            kind,
        }
    }

    /// Emit alert as a structured log line under the `keeper_alert` target.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();

        match self.severity {
            AlertSeverity::Info => info!(target: "keeper_alert", "KEEPER_ALERT: {}", json),
            AlertSeverity::Warning => warn!(target: "keeper_alert", "KEEPER_ALERT: {}", json),
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(target: "keeper_alert", "KEEPER_ALERT: {}", json)
            }
        }
    }
}
