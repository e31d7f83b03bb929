//! HeraldBuilder - wiring and fail-fast construction.
//!
//! All ports are handed in explicitly; missing wiring is a build error, not
//! a runtime surprise. There are no module-level globals; the clock, rule
//! set and policy travel by reference through whatever is built here.

use std::sync::Arc;

use crate::dispatch::engine::DispatchEngine;
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::id_generator::{IdGenerator, UlidGenerator};
use crate::ports::provider::MessageProvider;
use crate::ports::store::{AttemptStore, QuarantineStore, ThrottleStore};
use crate::precheck::PrecheckEngine;
use crate::quarantine::ledger::QuarantineLedger;
use crate::quarantine::rules::SuppressionRuleConfig;
use crate::throttle::controller::ThrottleController;
use crate::throttle::policy::RatePolicy;

use super::Herald;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. Wire it before build().")]
    MissingComponent(&'static str),
}

pub struct HeraldBuilder {
    attempts: Option<Arc<dyn AttemptStore>>,
    throttle: Option<Arc<dyn ThrottleStore>>,
    quarantine: Option<Arc<dyn QuarantineStore>>,
    provider: Option<Arc<dyn MessageProvider>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    rules: SuppressionRuleConfig,
    policy: RatePolicy,
    claim_staleness: Option<chrono::Duration>,
    send_timeout: Option<std::time::Duration>,
}

impl HeraldBuilder {
    pub fn new() -> Self {
        Self {
            attempts: None,
            throttle: None,
            quarantine: None,
            provider: None,
            clock: Arc::new(SystemClock),
            ids: None,
            rules: SuppressionRuleConfig::default(),
            policy: RatePolicy::default_conservative(),
            claim_staleness: None,
            send_timeout: None,
        }
    }

    /// Wire one store that implements all three storage ports (the usual
    /// case: one database, or `InMemoryStore` in dev).
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: AttemptStore + ThrottleStore + QuarantineStore + 'static,
    {
        self.attempt_store(store.clone())
            .throttle_store(store.clone())
            .quarantine_store(store)
    }

    pub fn attempt_store(mut self, store: Arc<dyn AttemptStore>) -> Self {
        self.attempts = Some(store);
        self
    }

    pub fn throttle_store(mut self, store: Arc<dyn ThrottleStore>) -> Self {
        self.throttle = Some(store);
        self
    }

    pub fn quarantine_store(mut self, store: Arc<dyn QuarantineStore>) -> Self {
        self.quarantine = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn MessageProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn suppression_rules(mut self, rules: SuppressionRuleConfig) -> Self {
        self.rules = rules;
        self
    }

    pub fn rate_policy(mut self, policy: RatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn claim_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.claim_staleness = Some(staleness);
        self
    }

    pub fn send_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Herald, BuildError> {
        let attempts = self
            .attempts
            .ok_or(BuildError::MissingComponent("attempt store"))?;
        let throttle = self
            .throttle
            .ok_or(BuildError::MissingComponent("throttle store"))?;
        let quarantine = self
            .quarantine
            .ok_or(BuildError::MissingComponent("quarantine store"))?;
        let provider = self
            .provider
            .ok_or(BuildError::MissingComponent("message provider"))?;

        let clock = self.clock;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let controller = Arc::new(
            ThrottleController::new(throttle, clock.clone()).with_policy(self.policy),
        );
        let ledger = Arc::new(QuarantineLedger::new(
            quarantine,
            ids.clone(),
            clock.clone(),
            self.rules,
        ));
        let precheck = PrecheckEngine::new(ledger.clone());

        let mut engine = DispatchEngine::new(
            attempts.clone(),
            provider,
            controller.clone(),
            ledger.clone(),
            clock.clone(),
        );
        if let Some(staleness) = self.claim_staleness {
            engine = engine.with_claim_staleness(staleness);
        }
        if let Some(timeout) = self.send_timeout {
            engine = engine.with_send_timeout(timeout);
        }

        Ok(Herald {
            attempts,
            engine: Arc::new(engine),
            controller,
            ledger,
            precheck,
            ids,
            clock,
        })
    }
}

impl Default for HeraldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::fake_provider::FakeProvider;
    use crate::impls::memory::InMemoryStore;

    #[test]
    fn build_fails_fast_without_a_provider() {
        let result = HeraldBuilder::new()
            .store(Arc::new(InMemoryStore::new()))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponent("message provider"))
        ));
    }

    #[test]
    fn build_fails_fast_without_stores() {
        let result = HeraldBuilder::new()
            .provider(Arc::new(FakeProvider::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingComponent(_))));
    }

    #[test]
    fn build_succeeds_with_full_wiring() {
        let result = HeraldBuilder::new()
            .store(Arc::new(InMemoryStore::new()))
            .provider(Arc::new(FakeProvider::new()))
            .build();
        assert!(result.is_ok());
    }
}
