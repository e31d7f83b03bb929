//! Rate policy: how far one adjustment step moves the target rate.
//!
//! Multiplicative in both directions, AIMD-flavored: small conservative
//! growth so the rate creeps up without overshooting, a harder cut on
//! overload so the provider signal is respected immediately.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Multiplier applied on an increase step. Kept small (1.1..=1.3 is the
    /// sane band) so growth stays gradual.
    pub growth_factor: f64,

    /// Multiplier applied on an overload decrease. Must be < 1.
    pub backoff_factor: f64,
}

impl RatePolicy {
    /// Default policy: +20% per eligible quiet batch, -40% on overload.
    pub fn default_conservative() -> Self {
        Self {
            growth_factor: 1.2,
            backoff_factor: 0.6,
        }
    }

    /// Next target after a growth step, capped at `max_mps`.
    pub fn next_increase(&self, target_mps: f64, max_mps: f64) -> f64 {
        (target_mps * self.growth_factor).min(max_mps)
    }

    /// Next target after a backoff step, floored at `min_mps`.
    pub fn next_decrease(&self, target_mps: f64, min_mps: f64) -> f64 {
        (target_mps * self.backoff_factor).max(min_mps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_reasonable_factors() {
        let policy = RatePolicy::default_conservative();
        assert!(policy.growth_factor > 1.0 && policy.growth_factor <= 1.3);
        assert!(policy.backoff_factor >= 0.5 && policy.backoff_factor < 1.0);
    }

    #[test]
    fn increase_is_multiplicative_and_capped() {
        let policy = RatePolicy::default_conservative();

        assert_eq!(policy.next_increase(20.0, 80.0), 24.0);
        assert_eq!(policy.next_increase(75.0, 80.0), 80.0);
    }

    #[test]
    fn decrease_is_multiplicative_and_floored() {
        let policy = RatePolicy::default_conservative();

        assert_eq!(policy.next_decrease(20.0, 5.0), 12.0);
        assert_eq!(policy.next_decrease(6.0, 5.0), 5.0);
    }
}
