//! Serializable status views for the campaign/UI layer.

use serde::{Deserialize, Serialize};

use crate::throttle::config::ThrottleConfig;
use crate::throttle::state::ThrottleState;

/// Attempt counts by status for one campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounts {
    pub pending: usize,
    pub sending: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Config + state pair for one sending identity. `state` is `None` until
/// the first dispatch lazily creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleStatus {
    pub config: ThrottleConfig,
    pub state: Option<ThrottleState>,
}
