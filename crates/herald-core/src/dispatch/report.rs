//! Batch outcome reporting: controller feedback and UI-facing events.

use serde::{Deserialize, Serialize};

/// Aggregate outcome of one batch, read once by the controller at batch end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Accepted by the provider.
    pub sent: usize,

    /// Structured provider failures (undeliverable + transient).
    pub failed: usize,

    /// Claimed but not attempted: overload requeues and similar releases.
    pub skipped: usize,

    /// At least one send hit the provider's throughput-limit signal.
    pub overload_observed: bool,

    pub elapsed_ms: u64,
}

/// One batch-completion event on the dispatch stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    /// 1-based position in this campaign run.
    pub batch_index: usize,

    #[serde(flatten)]
    pub report: BatchReport,

    /// Target rate after the controller consumed the report.
    pub target_mps: f64,
}

/// Final tally returned when the dispatch loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub batches: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}
