//! Dispatch attempt: per-contact record of one campaign send.
//!
//! Design:
//! - This is the "single source of truth" for a contact's dispatch state.
//! - All state transitions happen through methods here.
//! - `claimed_at` doubles as the claim token for at-least-once dispatch:
//!   a `Sending` row is owned by exactly one live worker until its claim
//!   goes stale.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::contact::Destination;
use super::failure::ProviderFailure;
use super::ids::{AttemptId, CampaignId, ContactId};

/// Attempt lifecycle.
///
/// State transitions:
/// - Pending -> Sending -> Sent
/// - Pending -> Sending -> Failed
/// - Pending -> Sending -> Pending (claim released: overload or stale claim)
/// - Skipped is terminal from creation (precheck rejected the contact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Approved by precheck, waiting to be claimed by a batch.
    Pending,

    /// Claimed by a live batch worker.
    Sending,

    /// Accepted by the provider; `message_id` recorded.
    Sent,

    /// Provider reported a structured failure.
    Failed,

    /// Precheck rejected the contact; `skip_code` says why.
    Skipped,
}

impl AttemptStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::Sent | AttemptStatus::Failed | AttemptStatus::Skipped
        )
    }
}

/// Machine-readable reason a contact never reached dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipCode {
    /// A required template placeholder resolved empty on the contact.
    MissingRequiredParam,

    /// The destination has an active quarantine entry.
    Suppressed,

    /// The contact's phone could not be normalized to a destination.
    InvalidDestination,
}

/// One contact's dispatch record within one campaign send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub attempt_id: AttemptId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,

    /// Absent only on `Skipped` rows whose phone never normalized.
    pub destination: Option<Destination>,

    /// Template identity, carried so the batch engine needs no template
    /// lookup at send time.
    pub template: String,
    pub language: String,

    /// Placeholder values resolved at precheck. BTreeMap keeps re-runs
    /// byte-identical.
    #[serde(default)]
    pub template_variables: BTreeMap<String, String>,

    pub status: AttemptStatus,

    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProviderFailure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_code: Option<SkipCode>,
}

impl DispatchAttempt {
    /// A precheck-approved row, ready to be claimed.
    pub fn pending(
        attempt_id: AttemptId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        destination: Destination,
        template: impl Into<String>,
        language: impl Into<String>,
        template_variables: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            campaign_id,
            contact_id,
            destination: Some(destination),
            template: template.into(),
            language: language.into(),
            template_variables,
            status: AttemptStatus::Pending,
            created_at: now,
            claimed_at: None,
            sent_at: None,
            failed_at: None,
            skipped_at: None,
            message_id: None,
            failure: None,
            skip_code: None,
        }
    }

    /// A precheck-rejected row; terminal from creation.
    pub fn skipped(
        attempt_id: AttemptId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        destination: Option<Destination>,
        template: impl Into<String>,
        language: impl Into<String>,
        skip_code: SkipCode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            campaign_id,
            contact_id,
            destination,
            template: template.into(),
            language: language.into(),
            template_variables: BTreeMap::new(),
            status: AttemptStatus::Skipped,
            created_at: now,
            claimed_at: None,
            sent_at: None,
            failed_at: None,
            skipped_at: Some(now),
            message_id: None,
            failure: None,
            skip_code: Some(skip_code),
        }
    }

    /// Mark as claimed by a batch worker.
    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.status = AttemptStatus::Sending;
        self.claimed_at = Some(now);
    }

    /// Mark as accepted by the provider.
    pub fn mark_sent(&mut self, message_id: String, now: DateTime<Utc>) {
        self.status = AttemptStatus::Sent;
        self.message_id = Some(message_id);
        self.sent_at = Some(now);
    }

    /// Mark as failed with the provider's structured error.
    pub fn mark_failed(&mut self, failure: ProviderFailure, now: DateTime<Utc>) {
        self.status = AttemptStatus::Failed;
        self.failure = Some(failure);
        self.failed_at = Some(now);
    }

    /// Return a claimed row to the pool (overload requeue, stale reclaim).
    pub fn release(&mut self) {
        self.status = AttemptStatus::Pending;
        self.claimed_at = None;
    }

    /// A `Sending` claim older than the liveness window belongs to a dead
    /// worker and may be taken over.
    pub fn claim_is_stale(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        match (self.status, self.claimed_at) {
            (AttemptStatus::Sending, Some(claimed_at)) => claimed_at + staleness <= now,
            _ => false,
        }
    }

    /// Eligible for claiming: pending, or sending with a stale claim.
    pub fn claimable(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::Pending || self.claim_is_stale(staleness, now)
    }
}
