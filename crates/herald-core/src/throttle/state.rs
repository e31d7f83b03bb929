//! Per-sender throttle state: the controller's current belief about a safe
//! sending rate.
//!
//! Exactly one live row per sender. `target_mps` is the only field mutated
//! under normal operation; the timestamps exist to enforce cooldown and
//! increase-gap hysteresis. All transitions go through methods here so the
//! `min_mps <= target_mps <= max_mps` invariant holds after every mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::ThrottleConfig;
use super::policy::RatePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Current belief about safe messages-per-second.
    pub target_mps: f64,

    /// Increases are blocked until this passes.
    pub cooldown_until: Option<DateTime<Utc>>,

    pub last_increase_at: Option<DateTime<Utc>>,
    pub last_decrease_at: Option<DateTime<Utc>>,

    /// CAS token for the single-writer discipline.
    pub updated_at: DateTime<Utc>,
}

impl ThrottleState {
    /// Fresh row, created lazily on first dispatch.
    pub fn initial(config: &ThrottleConfig, now: DateTime<Utc>) -> Self {
        Self {
            target_mps: config.start_mps,
            cooldown_until: None,
            last_increase_at: None,
            last_decrease_at: None,
            updated_at: now,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now <= until)
    }

    /// Has enough time passed since the last increase? A state that never
    /// increased is always eligible.
    pub fn increase_gap_elapsed(&self, config: &ThrottleConfig, now: DateTime<Utc>) -> bool {
        match self.last_increase_at {
            Some(at) => now - at >= Duration::seconds(i64::from(config.min_increase_gap_sec)),
            None => true,
        }
    }

    /// Opportunistic growth step. Caller is responsible for the cooldown and
    /// gap guards; the bound on `max_mps` is enforced here.
    pub fn apply_increase(&mut self, config: &ThrottleConfig, policy: &RatePolicy, now: DateTime<Utc>) {
        self.target_mps = policy.next_increase(self.target_mps, config.max_mps);
        self.last_increase_at = Some(now);
        self.updated_at = now;
    }

    /// Overload backoff step. Always wins over a same-batch increase: the
    /// controller applies it first and skips the increase path entirely.
    pub fn apply_decrease(&mut self, config: &ThrottleConfig, policy: &RatePolicy, now: DateTime<Utc>) {
        self.target_mps = policy.next_decrease(self.target_mps, config.min_mps);
        self.cooldown_until = Some(now + Duration::seconds(i64::from(config.cooldown_sec)));
        self.last_decrease_at = Some(now);
        self.updated_at = now;
    }

    /// Operator reset: back to `start_mps`, hysteresis cleared.
    pub fn reset(&mut self, config: &ThrottleConfig, now: DateTime<Utc>) {
        self.target_mps = config.start_mps;
        self.cooldown_until = None;
        self.last_increase_at = None;
        self.last_decrease_at = None;
        self.updated_at = now;
    }
}
