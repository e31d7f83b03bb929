//! Per-sender throttle configuration.
//!
//! Owned by the tenant, mutated only through an explicit save; the dispatch
//! loop reads it and never writes it. Validation runs before every persist;
//! an invalid combination is rejected without touching storage.

use serde::{Deserialize, Serialize};

use crate::domain::errors::HeraldError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// When off, dispatch paces on `send_floor_delay_ms` alone and the
    /// controller makes no rate adjustments.
    pub enabled: bool,

    /// Parallel send workers per batch.
    pub send_concurrency: u32,

    /// Contacts claimed per batch.
    pub batch_size: usize,

    /// Initial target rate (messages per second) for a fresh state row.
    pub start_mps: f64,

    /// Upper bound the controller may grow into.
    pub max_mps: f64,

    /// Lower bound backoff may shrink to.
    pub min_mps: f64,

    /// How long increases stay blocked after a provider overload signal.
    pub cooldown_sec: u32,

    /// Minimum spacing between two consecutive increases.
    pub min_increase_gap_sec: u32,

    /// Hard per-send minimum spacing, regardless of target rate.
    pub send_floor_delay_ms: u64,
}

impl ThrottleConfig {
    /// Check the structural invariants. `min_mps <= start_mps <= max_mps`
    /// must hold, all rates positive and finite, concurrency and batch size
    /// at least 1.
    pub fn validate(&self) -> Result<(), HeraldError> {
        if self.send_concurrency < 1 {
            return Err(HeraldError::ConfigInvalid(
                "send_concurrency must be at least 1".to_string(),
            ));
        }
        if self.batch_size < 1 {
            return Err(HeraldError::ConfigInvalid(
                "batch_size must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("min_mps", self.min_mps),
            ("start_mps", self.start_mps),
            ("max_mps", self.max_mps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HeraldError::ConfigInvalid(format!(
                    "{field} must be a positive rate, got {value}"
                )));
            }
        }
        if self.min_mps > self.start_mps || self.start_mps > self.max_mps {
            return Err(HeraldError::ConfigInvalid(format!(
                "rates must satisfy min <= start <= max, got {} <= {} <= {}",
                self.min_mps, self.start_mps, self.max_mps
            )));
        }
        Ok(())
    }
}

/// Conservative preset for senders with no delivery history.
pub const SAFE: ThrottleConfig = ThrottleConfig {
    enabled: true,
    send_concurrency: 2,
    batch_size: 50,
    start_mps: 5.0,
    max_mps: 20.0,
    min_mps: 1.0,
    cooldown_sec: 120,
    min_increase_gap_sec: 60,
    send_floor_delay_ms: 100,
};

/// Default preset for warmed-up senders.
pub const BALANCED: ThrottleConfig = ThrottleConfig {
    enabled: true,
    send_concurrency: 4,
    batch_size: 200,
    start_mps: 20.0,
    max_mps: 80.0,
    min_mps: 5.0,
    cooldown_sec: 60,
    min_increase_gap_sec: 30,
    send_floor_delay_ms: 50,
};

/// Aggressive preset for high-tier senders.
pub const BOOST: ThrottleConfig = ThrottleConfig {
    enabled: true,
    send_concurrency: 8,
    batch_size: 500,
    start_mps: 40.0,
    max_mps: 250.0,
    min_mps: 10.0,
    cooldown_sec: 45,
    min_increase_gap_sec: 15,
    send_floor_delay_ms: 0,
};
