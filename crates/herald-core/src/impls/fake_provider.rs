//! Scripted provider fake for tests and the demo binary.
//!
//! Sends succeed with generated message ids unless a failure has been
//! scripted for the destination; scripted failures are consumed in order,
//! so "fail once then recover" is one call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::contact::Destination;
use crate::domain::failure::ProviderFailure;
use crate::ports::provider::{DeliveryHandle, MessageProvider, OutboundMessage};

#[derive(Default)]
struct FakeState {
    scripted: HashMap<Destination, VecDeque<ProviderFailure>>,
    sent: Vec<OutboundMessage>,
    next_message_id: u64,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next send to this destination to fail.
    pub fn fail_next(&self, destination: Destination, failure: ProviderFailure) {
        let mut state = self.state.lock().expect("fake provider lock poisoned");
        state.scripted.entry(destination).or_default().push_back(failure);
    }

    /// Script the next `n` sends to this destination to fail.
    pub fn fail_times(&self, destination: Destination, failure: ProviderFailure, n: usize) {
        for _ in 0..n {
            self.fail_next(destination.clone(), failure.clone());
        }
    }

    /// Every message accepted so far, in acceptance order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        let state = self.state.lock().expect("fake provider lock poisoned");
        state.sent.clone()
    }
}

#[async_trait]
impl MessageProvider for FakeProvider {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryHandle, ProviderFailure> {
        let mut state = self.state.lock().expect("fake provider lock poisoned");

        if let Some(queue) = state.scripted.get_mut(&message.destination)
            && let Some(failure) = queue.pop_front()
        {
            return Err(failure);
        }

        state.next_message_id += 1;
        let message_id = format!("msg-{:06}", state.next_message_id);
        state.sent.push(message.clone());
        Ok(DeliveryHandle { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn message(phone: &str) -> OutboundMessage {
        OutboundMessage {
            destination: Destination::parse(phone).unwrap(),
            template: "order_update".to_string(),
            language: "pt_BR".to_string(),
            variables: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn unscripted_sends_succeed_with_fresh_ids() {
        let provider = FakeProvider::new();

        let a = provider.send(&message("+5511999990001")).await.unwrap();
        let b = provider.send(&message("+5511999990002")).await.unwrap();

        assert_ne!(a.message_id, b.message_id);
        assert_eq!(provider.sent().len(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let provider = FakeProvider::new();
        let msg = message("+5511999990001");
        provider.fail_next(
            msg.destination.clone(),
            ProviderFailure::new(130429, "Rate limit hit"),
        );

        let err = provider.send(&msg).await.unwrap_err();
        assert_eq!(err.code, 130429);

        // Script consumed: the retry goes through.
        provider.send(&msg).await.unwrap();
        assert_eq!(provider.sent().len(), 1);
    }
}
