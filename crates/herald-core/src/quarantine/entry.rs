//! Quarantine records: failure occurrences and suppression entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contact::Destination;
use crate::domain::failure::FailureClass;
use crate::domain::ids::EntryId;

/// One piece of failure evidence against a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureOccurrence {
    pub destination: Destination,
    pub class: FailureClass,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A suppression entry. At most one *active* entry exists per destination;
/// a destination with none is sendable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub entry_id: EntryId,
    pub destination: Destination,
    pub is_active: bool,

    /// Human-readable evidence summary.
    pub reason: String,

    /// What created the entry ("auto:undeliverable", "operator", ...).
    pub source: String,

    /// The occurrence window whose failures tripped the threshold.
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    /// `None` means indefinite (operator-created entries only).
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl QuarantineEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Does this entry currently suppress its destination?
    pub fn suppresses(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// Listing filter for the operator surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarantineFilter {
    pub destination: Option<Destination>,

    /// When set, only entries currently in force.
    pub active_only: bool,
}
