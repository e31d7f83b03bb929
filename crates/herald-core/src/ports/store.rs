//! Storage ports - the read/write contracts the engines depend on.
//!
//! The relational engine behind them is out of scope; these traits are the
//! seam. `impls::memory` provides the dev/test adapter. Contract points that
//! matter for correctness:
//!
//! - `claim_batch` is an atomic conditional update: a row is claimed only if
//!   it is `Pending`, or `Sending` with a stale claim. Two live claimants
//!   can never own the same row.
//! - `mark_sent` / `mark_failed` / `release_claim` only touch rows still in
//!   `Sending`; anything else is another worker's business and a silent
//!   no-op (claim conflicts are not errors).
//! - `save_state` is a compare-and-swap on `updated_at`, backing the
//!   single-writer discipline on throttle state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::attempt::DispatchAttempt;
use crate::domain::contact::Destination;
use crate::domain::failure::{FailureClass, ProviderFailure};
use crate::domain::ids::{AttemptId, CampaignId, SenderId};
use crate::quarantine::entry::{FailureOccurrence, QuarantineEntry, QuarantineFilter};
use crate::status::AttemptCounts;
use crate::throttle::config::ThrottleConfig;
use crate::throttle::state::ThrottleState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    /// A conditional update lost the race (CAS mismatch, claim taken).
    #[error("conflicting concurrent update")]
    Conflict,

    /// Fatal infrastructure failure; halts the batch loop.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Dispatch attempt rows.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Upsert precheck output. Rows keyed by (campaign, contact); terminal
    /// `Sent`/`Failed` rows and live `Sending` claims are left untouched so
    /// a precheck re-run never clobbers real outcomes.
    async fn seed_attempts(&self, attempts: Vec<DispatchAttempt>) -> Result<(), StoreError>;

    /// Claim up to `limit` claimable rows for this campaign, marking them
    /// `Sending` with `now` as the claim timestamp. Atomic per row.
    async fn claim_batch(
        &self,
        campaign_id: CampaignId,
        limit: usize,
        staleness: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DispatchAttempt>, StoreError>;

    async fn mark_sent(
        &self,
        attempt_id: AttemptId,
        message_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_failed(
        &self,
        attempt_id: AttemptId,
        failure: ProviderFailure,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Return a claimed row to `Pending` (overload requeue).
    async fn release_claim(&self, attempt_id: AttemptId) -> Result<(), StoreError>;

    /// Status counts for one campaign (observability surface).
    async fn counts(&self, campaign_id: CampaignId) -> Result<AttemptCounts, StoreError>;
}

/// Throttle config and state rows, one pair per sending identity.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    async fn load_config(&self, sender: &SenderId) -> Result<Option<ThrottleConfig>, StoreError>;

    async fn save_config(&self, sender: &SenderId, config: ThrottleConfig)
    -> Result<(), StoreError>;

    async fn load_state(&self, sender: &SenderId) -> Result<Option<ThrottleState>, StoreError>;

    /// Compare-and-swap write. `expected_updated_at == None` means the row
    /// must not exist yet (lazy init); otherwise it must match the stored
    /// `updated_at`. Mismatch is `StoreError::Conflict`.
    async fn save_state(
        &self,
        sender: &SenderId,
        state: ThrottleState,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Unconditional overwrite; operator reset only.
    async fn put_state(&self, sender: &SenderId, state: ThrottleState) -> Result<(), StoreError>;
}

/// Quarantine evidence and entries. Writes are append/escalate-only and
/// idempotent on (destination, window); workers may apply them out of order.
#[async_trait]
pub trait QuarantineStore: Send + Sync {
    async fn append_occurrence(&self, occurrence: FailureOccurrence) -> Result<(), StoreError>;

    async fn count_occurrences(
        &self,
        destination: &Destination,
        class: FailureClass,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// The destination's active entry, if any. At most one exists.
    async fn active_entry(
        &self,
        destination: &Destination,
    ) -> Result<Option<QuarantineEntry>, StoreError>;

    async fn insert_entry(&self, entry: QuarantineEntry) -> Result<(), StoreError>;

    async fn deactivate_entry(&self, destination: &Destination) -> Result<(), StoreError>;

    /// How many quarantine cycles this destination has been through, active
    /// or not. Drives TTL escalation.
    async fn count_cycles(&self, destination: &Destination) -> Result<usize, StoreError>;

    async fn list_entries(
        &self,
        filter: QuarantineFilter,
    ) -> Result<Vec<QuarantineEntry>, StoreError>;

    /// Operator removal. Returns whether an active entry existed.
    async fn remove_entry(&self, destination: &Destination) -> Result<bool, StoreError>;
}
