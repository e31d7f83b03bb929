//! Domain identifiers (strongly-typed IDs).
//!
//! ULID-based ids behind a phantom-typed `Id<T>` so a `CampaignId` can never
//! be passed where an `AttemptId` is expected. ULIDs sort by creation time
//! and can be generated on any node without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each id type.
///
/// Provides the prefix used by `Display` ("campaign-", "contact-", ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id type.
///
/// `T` is `PhantomData`: zero bytes at runtime, full type safety at compile
/// time.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// Marker types
// ========================================

/// Marker for a campaign send (the unit precheck and dispatch operate on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Campaign {}

impl IdMarker for Campaign {
    fn prefix() -> &'static str {
        "campaign-"
    }
}

/// Marker for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Contact {}

impl IdMarker for Contact {
    fn prefix() -> &'static str {
        "contact-"
    }
}

/// Marker for a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attempt {}

impl IdMarker for Attempt {
    fn prefix() -> &'static str {
        "attempt-"
    }
}

/// Marker for a quarantine entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entry {}

impl IdMarker for Entry {
    fn prefix() -> &'static str {
        "entry-"
    }
}

// ========================================
// Type aliases
// ========================================

/// Identifier of a campaign send (precheck/dispatch/cancel unit).
pub type CampaignId = Id<Campaign>;

/// Identifier of a contact (owner of the snapshot precheck reads).
pub type ContactId = Id<Contact>;

/// Identifier of a dispatch attempt (one contact within one campaign send).
pub type AttemptId = Id<Attempt>;

/// Identifier of a quarantine entry.
pub type EntryId = Id<Entry>;

/// The account/number on whose behalf messages are dispatched.
///
/// Sender identities come from tenant provisioning, not from this system, so
/// this stays an opaque string key rather than a ULID. One throttle
/// config/state pair exists per sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(String);

impl SenderId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
