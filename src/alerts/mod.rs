//! Metrics and alert emission.

mod sink;
mod types;

#[cfg(test)]
pub use sink::RecordingSink;
pub use sink::{CycleTracker, MetricPoint, MetricsSink, SinkSettings, TracingSink};
pub use types::{Alert, AlertKind, AlertSeverity};
