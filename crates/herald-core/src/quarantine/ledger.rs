//! Quarantine ledger: per-destination failure accounting and the
//! is-suppressed predicate.
//!
//! The predicate is consulted by precheck only; the dispatch loop does not
//! re-check it, so there is exactly one point of truth and no race between
//! two layers disagreeing. Expiry is lazy: an expired entry is deactivated
//! the next time anything looks at the destination, there is no background
//! sweep.

use std::sync::Arc;

use crate::domain::contact::Destination;
use crate::domain::failure::FailureClass;
use crate::ports::clock::Clock;
use crate::ports::id_generator::IdGenerator;
use crate::ports::store::{QuarantineStore, StoreError};

use super::entry::{FailureOccurrence, QuarantineEntry, QuarantineFilter};
use super::rules::SuppressionRuleConfig;

pub struct QuarantineLedger {
    store: Arc<dyn QuarantineStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    rules: SuppressionRuleConfig,
}

impl QuarantineLedger {
    pub fn new(
        store: Arc<dyn QuarantineStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        rules: SuppressionRuleConfig,
    ) -> Self {
        Self {
            store,
            ids,
            clock,
            rules,
        }
    }

    /// Record one failure against a destination. Returns the entry if this
    /// occurrence tripped (or re-tripped) quarantine.
    ///
    /// Append/escalate-only: safe to call from any worker in any order.
    pub async fn record_failure(
        &self,
        destination: &Destination,
        class: FailureClass,
        reason: &str,
    ) -> Result<Option<QuarantineEntry>, StoreError> {
        let Some(rule) = self.rules.rule_for(class) else {
            return Ok(None);
        };

        let now = self.clock.now();
        self.store
            .append_occurrence(FailureOccurrence {
                destination: destination.clone(),
                class,
                reason: reason.to_string(),
                at: now,
            })
            .await?;

        let window_start = now - rule.window();
        let count = self
            .store
            .count_occurrences(destination, class, window_start)
            .await?;
        if count < rule.threshold as usize {
            return Ok(None);
        }

        if let Some(active) = self.store.active_entry(destination).await? {
            if !active.is_expired(now) {
                // Already quarantined; nothing to escalate yet.
                return Ok(None);
            }
            self.store.deactivate_entry(destination).await?;
        }

        let prior_cycles = self.store.count_cycles(destination).await?;
        let ttl = rule.ttl_for_cycle(prior_cycles);
        let entry = QuarantineEntry {
            entry_id: self.ids.generate_entry_id(),
            destination: destination.clone(),
            is_active: true,
            reason: format!("{reason} ({count}x {class} in {}d)", rule.window_days),
            source: format!("auto:{class}"),
            window_start,
            window_end: now,
            expires_at: Some(now + ttl),
            created_at: now,
        };
        self.store.insert_entry(entry.clone()).await?;
        log::info!(
            "quarantined {destination} for {}d (cycle {}): {}",
            ttl.num_days(),
            prior_cycles + 1,
            entry.reason
        );
        Ok(Some(entry))
    }

    /// Is this destination currently suppressed?
    ///
    /// Expired entries are deactivated on the way out, so the read doubles
    /// as the lazy expiry pass.
    pub async fn is_suppressed(&self, destination: &Destination) -> Result<bool, StoreError> {
        let Some(entry) = self.store.active_entry(destination).await? else {
            return Ok(false);
        };
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.store.deactivate_entry(destination).await?;
            log::debug!("quarantine expired for {destination}");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn list(&self, filter: QuarantineFilter) -> Result<Vec<QuarantineEntry>, StoreError> {
        self.store.list_entries(filter).await
    }

    /// Operator removal; the destination becomes sendable immediately.
    pub async fn remove(&self, destination: &Destination) -> Result<bool, StoreError> {
        let removed = self.store.remove_entry(destination).await?;
        if removed {
            log::info!("quarantine entry removed for {destination}");
        }
        Ok(removed)
    }
}
