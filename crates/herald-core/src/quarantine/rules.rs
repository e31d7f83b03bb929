//! Suppression rules: when failure evidence becomes a quarantine entry.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::failure::FailureClass;

/// Rule for one failure class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRule {
    pub enabled: bool,

    /// Occurrences are counted within this sliding window.
    pub window_days: u32,

    /// Occurrence count that trips a quarantine entry.
    pub threshold: u32,

    /// TTL of a destination's first quarantine cycle.
    pub ttl_base_days: u32,

    /// TTL of the second cycle.
    pub ttl2_days: u32,

    /// TTL of the third and every later cycle.
    pub ttl3_days: u32,
}

impl ClassRule {
    pub fn window(&self) -> Duration {
        Duration::days(i64::from(self.window_days))
    }

    /// Escalated TTL for a destination with `prior_cycles` earlier
    /// quarantine entries.
    pub fn ttl_for_cycle(&self, prior_cycles: usize) -> Duration {
        let days = match prior_cycles {
            0 => self.ttl_base_days,
            1 => self.ttl2_days,
            _ => self.ttl3_days,
        };
        Duration::days(i64::from(days))
    }
}

/// The full rule set, read-only input to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRuleConfig {
    pub enabled: bool,

    pub undeliverable: ClassRule,

    /// Exists so tenants who want it can turn it on; off by default because
    /// transient failures are usually the network's fault, not the number's.
    pub transient: ClassRule,
}

impl SuppressionRuleConfig {
    /// The rule that applies to a failure class, if quarantine accounting is
    /// active for it. Throughput-limit failures never feed quarantine: they
    /// are the controller's signal.
    pub fn rule_for(&self, class: FailureClass) -> Option<&ClassRule> {
        if !self.enabled {
            return None;
        }
        let rule = match class {
            FailureClass::Undeliverable => &self.undeliverable,
            FailureClass::Transient => &self.transient,
            FailureClass::ThroughputLimit => return None,
        };
        rule.enabled.then_some(rule)
    }
}

impl Default for SuppressionRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            undeliverable: ClassRule {
                enabled: true,
                window_days: 30,
                threshold: 3,
                ttl_base_days: 7,
                ttl2_days: 30,
                ttl3_days: 90,
            },
            transient: ClassRule {
                enabled: false,
                window_days: 7,
                threshold: 10,
                ttl_base_days: 1,
                ttl2_days: 3,
                ttl3_days: 7,
            },
        }
    }
}
