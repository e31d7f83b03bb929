//! Crate-level error surface.

use thiserror::Error;

use super::ids::SenderId;
use crate::ports::store::StoreError;

#[derive(Debug, Error)]
pub enum HeraldError {
    /// Rejected synchronously on save; nothing is persisted.
    #[error("invalid throttle config: {0}")]
    ConfigInvalid(String),

    /// No throttle config has been saved for this sending identity.
    #[error("no throttle config for sender {0}")]
    SenderUnknown(SenderId),

    /// Storage-layer failure; `Unavailable` halts the batch loop.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The spawned dispatch task died without reporting a result.
    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}
