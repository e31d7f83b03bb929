//! Per-sender lock registry.
//!
//! The throttle state row is a single-writer resource: only the batch
//! currently executing for a sender may read-then-write it. Campaigns that
//! share a sending identity serialize whole batches on this lock; the store
//! CAS backs it up across processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::ids::SenderId;

#[derive(Default)]
pub struct SenderLocks {
    inner: Mutex<HashMap<SenderId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a sender, created on first use and shared forever after.
    pub fn for_sender(&self, sender: &SenderId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("sender lock registry poisoned");
        map.entry(sender.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_sender_gets_the_same_lock() {
        let locks = SenderLocks::new();
        let a = locks.for_sender(&SenderId::new("wa:1"));
        let b = locks.for_sender(&SenderId::new("wa:1"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_senders_get_different_locks() {
        let locks = SenderLocks::new();
        let a = locks.for_sender(&SenderId::new("wa:1"));
        let b = locks.for_sender(&SenderId::new("wa:2"));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
