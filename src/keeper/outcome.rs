//! Per-cycle outcome record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::KeeperError;
use crate::ledger::{CoordinatorState, VaultState};
use crate::market::MarketSnapshot;
use crate::strategy::DeltaResult;

/// Cycle step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Market,
    Vault,
    Sync,
    Coordinator,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Market => "market",
            Step::Vault => "vault",
            Step::Sync => "sync",
            Step::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub step: Step,
    pub error: KeeperError,
}

/// Everything observed in one reconciliation pass.
///
/// `None` fields were not fetched (or could not be derived) this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub market: Option<MarketSnapshot>,
    pub funding_favorable: Option<bool>,
    pub vault: Option<VaultState>,
    pub coordinator: Option<CoordinatorState>,
    pub delta: Option<DeltaResult>,
    pub sync_tx_hash: Option<String>,
    pub errors: Vec<StepFailure>,
}

impl CycleOutcome {
    pub fn new(cycle: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            cycle,
            timestamp,
            market: None,
            funding_favorable: None,
            vault: None,
            coordinator: None,
            delta: None,
            sync_tx_hash: None,
            errors: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, step: Step, error: KeeperError) {
        self.errors.push(StepFailure { step, error });
    }

    pub fn failed(&self, step: Step) -> bool {
        self.errors.iter().any(|f| f.step == step)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
