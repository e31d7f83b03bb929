//! In-memory store implementation.
//!
//! Dev/test adapter for every storage port. The inner state struct is the
//! single source of truth; the port impls lock, delegate, and clone results
//! out. Conditional updates (claims, CAS) are atomic because every mutation
//! runs under the one state lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::attempt::{AttemptStatus, DispatchAttempt};
use crate::domain::contact::Destination;
use crate::domain::failure::{FailureClass, ProviderFailure};
use crate::domain::ids::{AttemptId, CampaignId, ContactId, SenderId};
use crate::ports::store::{AttemptStore, QuarantineStore, StoreError, ThrottleStore};
use crate::quarantine::entry::{FailureOccurrence, QuarantineEntry, QuarantineFilter};
use crate::status::AttemptCounts;
use crate::throttle::config::ThrottleConfig;
use crate::throttle::state::ThrottleState;

/// In-memory state behind the lock.
#[derive(Default)]
struct StoreState {
    /// All attempt rows (single source of truth for attempts).
    attempts: HashMap<AttemptId, DispatchAttempt>,

    /// Attempt ids per campaign, in seed order (claim order follows it).
    campaign_attempts: HashMap<CampaignId, Vec<AttemptId>>,

    /// (campaign, contact) -> attempt, for seed upserts.
    contact_index: HashMap<(CampaignId, ContactId), AttemptId>,

    throttle_configs: HashMap<SenderId, ThrottleConfig>,
    throttle_states: HashMap<SenderId, ThrottleState>,

    occurrences: Vec<FailureOccurrence>,
    entries: Vec<QuarantineEntry>,
}

impl StoreState {
    fn seed_one(&mut self, attempt: DispatchAttempt) {
        let key = (attempt.campaign_id, attempt.contact_id);
        if let Some(&existing_id) = self.contact_index.get(&key) {
            // Real outcomes and live claims win over a precheck re-run.
            let replaceable = matches!(
                self.attempts[&existing_id].status,
                AttemptStatus::Pending | AttemptStatus::Skipped
            );
            if !replaceable {
                return;
            }
            self.attempts.remove(&existing_id);
            if let Some(ids) = self.campaign_attempts.get_mut(&attempt.campaign_id) {
                ids.retain(|id| *id != existing_id);
            }
        }
        self.insert_attempt(key, attempt);
    }

    fn insert_attempt(&mut self, key: (CampaignId, ContactId), attempt: DispatchAttempt) {
        self.campaign_attempts
            .entry(attempt.campaign_id)
            .or_default()
            .push(attempt.attempt_id);
        self.contact_index.insert(key, attempt.attempt_id);
        self.attempts.insert(attempt.attempt_id, attempt);
    }

    fn claim_batch(
        &mut self,
        campaign_id: CampaignId,
        limit: usize,
        staleness: Duration,
        now: DateTime<Utc>,
    ) -> Vec<DispatchAttempt> {
        let ids = match self.campaign_attempts.get(&campaign_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        let mut claimed = Vec::new();
        for id in ids {
            if claimed.len() >= limit {
                break;
            }
            if let Some(attempt) = self.attempts.get_mut(&id)
                && attempt.claimable(staleness, now)
            {
                attempt.claim(now);
                claimed.push(attempt.clone());
            }
        }
        claimed
    }

    fn counts(&self, campaign_id: CampaignId) -> AttemptCounts {
        let mut counts = AttemptCounts::default();
        for id in self.campaign_attempts.get(&campaign_id).into_iter().flatten() {
            match self.attempts[id].status {
                AttemptStatus::Pending => counts.pending += 1,
                AttemptStatus::Sending => counts.sending += 1,
                AttemptStatus::Sent => counts.sent += 1,
                AttemptStatus::Failed => counts.failed += 1,
                AttemptStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

/// In-memory implementation of all storage ports.
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    /// Fetch one attempt row (observability / test assertions).
    pub async fn get_attempt(&self, attempt_id: AttemptId) -> Option<DispatchAttempt> {
        let state = self.state.lock().await;
        state.attempts.get(&attempt_id).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn seed_attempts(&self, attempts: Vec<DispatchAttempt>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for attempt in attempts {
            state.seed_one(attempt);
        }
        Ok(())
    }

    async fn claim_batch(
        &self,
        campaign_id: CampaignId,
        limit: usize,
        staleness: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DispatchAttempt>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.claim_batch(campaign_id, limit, staleness, now))
    }

    async fn mark_sent(
        &self,
        attempt_id: AttemptId,
        message_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        // A row no longer in Sending belongs to another claimant: no-op.
        if let Some(attempt) = state.attempts.get_mut(&attempt_id)
            && attempt.status == AttemptStatus::Sending
        {
            attempt.mark_sent(message_id, now);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        attempt_id: AttemptId,
        failure: ProviderFailure,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(attempt) = state.attempts.get_mut(&attempt_id)
            && attempt.status == AttemptStatus::Sending
        {
            attempt.mark_failed(failure, now);
        }
        Ok(())
    }

    async fn release_claim(&self, attempt_id: AttemptId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(attempt) = state.attempts.get_mut(&attempt_id)
            && attempt.status == AttemptStatus::Sending
        {
            attempt.release();
        }
        Ok(())
    }

    async fn counts(&self, campaign_id: CampaignId) -> Result<AttemptCounts, StoreError> {
        let state = self.state.lock().await;
        Ok(state.counts(campaign_id))
    }
}

#[async_trait]
impl ThrottleStore for InMemoryStore {
    async fn load_config(&self, sender: &SenderId) -> Result<Option<ThrottleConfig>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.throttle_configs.get(sender).cloned())
    }

    async fn save_config(
        &self,
        sender: &SenderId,
        config: ThrottleConfig,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.throttle_configs.insert(sender.clone(), config);
        Ok(())
    }

    async fn load_state(&self, sender: &SenderId) -> Result<Option<ThrottleState>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.throttle_states.get(sender).cloned())
    }

    async fn save_state(
        &self,
        sender: &SenderId,
        throttle_state: ThrottleState,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let current = state.throttle_states.get(sender);
        match (current, expected_updated_at) {
            (None, None) => {}
            (Some(existing), Some(expected)) if existing.updated_at == expected => {}
            _ => return Err(StoreError::Conflict),
        }
        state.throttle_states.insert(sender.clone(), throttle_state);
        Ok(())
    }

    async fn put_state(
        &self,
        sender: &SenderId,
        throttle_state: ThrottleState,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.throttle_states.insert(sender.clone(), throttle_state);
        Ok(())
    }
}

#[async_trait]
impl QuarantineStore for InMemoryStore {
    async fn append_occurrence(&self, occurrence: FailureOccurrence) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.occurrences.push(occurrence);
        Ok(())
    }

    async fn count_occurrences(
        &self,
        destination: &Destination,
        class: FailureClass,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .occurrences
            .iter()
            .filter(|o| o.destination == *destination && o.class == class && o.at >= since)
            .count())
    }

    async fn active_entry(
        &self,
        destination: &Destination,
    ) -> Result<Option<QuarantineEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.is_active && e.destination == *destination)
            .cloned())
    }

    async fn insert_entry(&self, entry: QuarantineEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.entries.push(entry);
        Ok(())
    }

    async fn deactivate_entry(&self, destination: &Destination) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for entry in &mut state.entries {
            if entry.destination == *destination {
                entry.is_active = false;
            }
        }
        Ok(())
    }

    async fn count_cycles(&self, destination: &Destination) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.destination == *destination)
            .count())
    }

    async fn list_entries(
        &self,
        filter: QuarantineFilter,
    ) -> Result<Vec<QuarantineEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| !filter.active_only || e.is_active)
            .filter(|e| {
                filter
                    .destination
                    .as_ref()
                    .is_none_or(|d| e.destination == *d)
            })
            .cloned()
            .collect())
    }

    async fn remove_entry(&self, destination: &Destination) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let mut removed = false;
        for entry in &mut state.entries {
            if entry.is_active && entry.destination == *destination {
                entry.is_active = false;
                removed = true;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::config::BALANCED;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn pending_row(campaign_id: CampaignId) -> DispatchAttempt {
        DispatchAttempt::pending(
            AttemptId::from_ulid(Ulid::new()),
            campaign_id,
            ContactId::from_ulid(Ulid::new()),
            Destination::parse("+5511999990000").unwrap(),
            "order_update",
            "pt_BR",
            BTreeMap::new(),
            t0(),
        )
    }

    #[tokio::test]
    async fn claim_batch_respects_limit_and_marks_sending() {
        let store = InMemoryStore::new();
        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let rows: Vec<_> = (0..5).map(|_| pending_row(campaign_id)).collect();
        store.seed_attempts(rows).await.unwrap();

        let claimed = store
            .claim_batch(campaign_id, 3, Duration::minutes(10), t0())
            .await
            .unwrap();
        assert_eq!(claimed.len(), 3);
        for attempt in &claimed {
            assert_eq!(attempt.status, AttemptStatus::Sending);
        }

        let counts = store.counts(campaign_id).await.unwrap();
        assert_eq!(counts.sending, 3);
        assert_eq!(counts.pending, 2);
    }

    #[tokio::test]
    async fn concurrent_claimants_never_share_a_row() {
        let store = Arc::new(InMemoryStore::new());
        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let rows: Vec<_> = (0..10).map(|_| pending_row(campaign_id)).collect();
        store.seed_attempts(rows).await.unwrap();

        let a = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .claim_batch(campaign_id, 10, Duration::minutes(10), t0())
                    .await
                    .unwrap()
            }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .claim_batch(campaign_id, 10, Duration::minutes(10), t0())
                    .await
                    .unwrap()
            }
        });

        let (claimed_a, claimed_b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(claimed_a.len() + claimed_b.len(), 10);

        let ids_a: Vec<_> = claimed_a.iter().map(|c| c.attempt_id).collect();
        assert!(claimed_b.iter().all(|c| !ids_a.contains(&c.attempt_id)));
    }

    #[tokio::test]
    async fn fresh_claims_are_not_reclaimable_but_stale_ones_are() {
        let store = InMemoryStore::new();
        let campaign_id = CampaignId::from_ulid(Ulid::new());
        store.seed_attempts(vec![pending_row(campaign_id)]).await.unwrap();

        let staleness = Duration::minutes(10);
        let first = store
            .claim_batch(campaign_id, 1, staleness, t0())
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // A live claim is invisible to a second claimant.
        let second = store
            .claim_batch(campaign_id, 1, staleness, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(second.is_empty());

        // Past the liveness window the row is claimable again.
        let third = store
            .claim_batch(campaign_id, 1, staleness, t0() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].attempt_id, first[0].attempt_id);
    }

    #[tokio::test]
    async fn marks_only_touch_sending_rows() {
        let store = InMemoryStore::new();
        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let row = pending_row(campaign_id);
        let attempt_id = row.attempt_id;
        store.seed_attempts(vec![row]).await.unwrap();

        // Not claimed: the mark is a silent no-op.
        store
            .mark_sent(attempt_id, "msg-1".to_string(), t0())
            .await
            .unwrap();
        let row = store.get_attempt(attempt_id).await.unwrap();
        assert_eq!(row.status, AttemptStatus::Pending);

        store
            .claim_batch(campaign_id, 1, Duration::minutes(10), t0())
            .await
            .unwrap();
        store
            .mark_sent(attempt_id, "msg-1".to_string(), t0())
            .await
            .unwrap();
        let row = store.get_attempt(attempt_id).await.unwrap();
        assert_eq!(row.status, AttemptStatus::Sent);
    }

    #[tokio::test]
    async fn seed_upsert_replaces_pending_but_not_outcomes() {
        let store = InMemoryStore::new();
        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let original = pending_row(campaign_id);
        let contact_id = original.contact_id;
        store.seed_attempts(vec![original.clone()]).await.unwrap();

        // Re-seed for the same contact: the pending row is replaced.
        let mut reseeded = pending_row(campaign_id);
        reseeded.contact_id = contact_id;
        store.seed_attempts(vec![reseeded.clone()]).await.unwrap();
        assert!(store.get_attempt(original.attempt_id).await.is_none());
        assert!(store.get_attempt(reseeded.attempt_id).await.is_some());

        // Once the row has a real outcome, a re-seed does not clobber it.
        store
            .claim_batch(campaign_id, 1, Duration::minutes(10), t0())
            .await
            .unwrap();
        store
            .mark_sent(reseeded.attempt_id, "msg-1".to_string(), t0())
            .await
            .unwrap();

        let mut late = pending_row(campaign_id);
        late.contact_id = contact_id;
        store.seed_attempts(vec![late.clone()]).await.unwrap();

        assert!(store.get_attempt(late.attempt_id).await.is_none());
        let kept = store.get_attempt(reseeded.attempt_id).await.unwrap();
        assert_eq!(kept.status, AttemptStatus::Sent);
    }

    #[tokio::test]
    async fn state_cas_detects_concurrent_writers() {
        let store = InMemoryStore::new();
        let sender = SenderId::new("wa:1");

        let initial = ThrottleState::initial(&BALANCED, t0());
        store.save_state(&sender, initial.clone(), None).await.unwrap();

        // Re-init against an existing row fails.
        let err = store
            .save_state(&sender, initial.clone(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        // CAS with the right token succeeds and moves updated_at.
        let mut next = initial.clone();
        next.updated_at = t0() + Duration::seconds(30);
        store
            .save_state(&sender, next.clone(), Some(initial.updated_at))
            .await
            .unwrap();

        // The stale token now loses.
        let err = store
            .save_state(&sender, next, Some(initial.updated_at))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }
}
