//! Reconciliation loop.

mod outcome;
mod scheduler;

pub use outcome::{CycleOutcome, Step, StepFailure};
pub use scheduler::{CoordinatorMode, LatestOutcome, Scheduler, SchedulerSettings, ShutdownHandle};
