//! Provider failure shape and its operational classification.
//!
//! The provider returns numeric code/subcode pairs plus a human title and a
//! trace id. The rest of the system never matches on raw codes; it matches
//! on `FailureClass`, which partitions codes into the three behaviors the
//! controller must distinguish.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational classification of a provider failure.
///
/// Serialized as SCREAMING_SNAKE_CASE, matching the wire format of the
/// campaign failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// Provider says we are sending too fast. Feeds the throughput
    /// controller; never a campaign failure and never quarantine evidence.
    ThroughputLimit,

    /// The destination is structurally undeliverable. Feeds quarantine
    /// accounting; never triggers controller backoff.
    Undeliverable,

    /// Everything else. Surfaced in the campaign failure report; eligible
    /// for a later manual or scheduled resume, never auto-retried in-batch.
    Transient,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::ThroughputLimit => "throughput_limit",
            FailureClass::Undeliverable => "undeliverable",
            FailureClass::Transient => "transient",
        };
        f.write_str(s)
    }
}

/// Provider codes that signal "rate exceeded" for the sending identity.
const THROUGHPUT_LIMIT_CODES: [u32; 4] = [80007, 130429, 131048, 131056];

/// Provider codes that mark the destination itself as undeliverable.
const UNDELIVERABLE_CODES: [u32; 2] = [131021, 131026];

/// Structured failure as reported by the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub code: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcode: Option<u32>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ProviderFailure {
    pub fn new(code: u32, title: impl Into<String>) -> Self {
        Self {
            code,
            subcode: None,
            title: title.into(),
            trace_id: None,
        }
    }

    pub fn with_subcode(mut self, subcode: u32) -> Self {
        self.subcode = Some(subcode);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Synthetic failure recorded when a send exceeds its bounded timeout.
    /// Code 0 is outside every provider range, so it classifies as transient.
    pub fn timeout() -> Self {
        Self::new(0, "send timed out waiting for the provider")
    }

    pub fn class(&self) -> FailureClass {
        if THROUGHPUT_LIMIT_CODES.contains(&self.code) {
            FailureClass::ThroughputLimit
        } else if UNDELIVERABLE_CODES.contains(&self.code) {
            FailureClass::Undeliverable
        } else {
            FailureClass::Transient
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error {}", self.code)?;
        if let Some(subcode) = self.subcode {
            write!(f, ".{subcode}")?;
        }
        write!(f, ": {}", self.title)?;
        if let Some(trace_id) = &self.trace_id {
            write!(f, " (trace {trace_id})")?;
        }
        Ok(())
    }
}
