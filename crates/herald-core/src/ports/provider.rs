//! MessageProvider port - the external send boundary.
//!
//! One production adapter talks to the real messaging API; tests and the
//! demo binary use the scripted fake in `impls`. The engine only ever sees
//! this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::contact::Destination;
use crate::domain::failure::ProviderFailure;

/// Everything the provider needs for one templated send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub template: String,
    pub language: String,
    pub variables: BTreeMap<String, String>,
}

/// Delivery handle returned on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHandle {
    pub message_id: String,
}

#[async_trait]
pub trait MessageProvider: Send + Sync {
    /// Submit one message. A failure here is provider data, not an
    /// infrastructure error; classification happens via
    /// [`ProviderFailure::class`].
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryHandle, ProviderFailure>;
}
