//! Adaptive throughput controller.
//!
//! Answers "what send rate is currently safe?" for one sending identity and
//! evolves that answer from batch outcomes. The controller never sleeps; it
//! owns the state transitions and exposes the pacing gap, and the batch
//! engine turns that into actual inter-send delays.
//!
//! Write discipline: the batch engine calls in here while holding the
//! per-sender lock, and every state write is a compare-and-swap on
//! `updated_at`. A lost CAS means another writer is live, which the lock is
//! supposed to prevent; it surfaces as an error instead of being retried.

use std::sync::Arc;

use crate::dispatch::report::BatchReport;
use crate::domain::errors::HeraldError;
use crate::domain::ids::SenderId;
use crate::ports::clock::Clock;
use crate::ports::store::{StoreError, ThrottleStore};
use crate::status::ThrottleStatus;

use super::config::ThrottleConfig;
use super::policy::RatePolicy;
use super::state::ThrottleState;

pub struct ThrottleController {
    store: Arc<dyn ThrottleStore>,
    clock: Arc<dyn Clock>,
    policy: RatePolicy,
}

impl ThrottleController {
    pub fn new(store: Arc<dyn ThrottleStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: RatePolicy::default_conservative(),
        }
    }

    pub fn with_policy(mut self, policy: RatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The sender's config. Dispatching for a sender nobody configured is an
    /// operator mistake, not a default.
    pub async fn load_config(&self, sender: &SenderId) -> Result<ThrottleConfig, HeraldError> {
        self.store
            .load_config(sender)
            .await?
            .ok_or_else(|| HeraldError::SenderUnknown(sender.clone()))
    }

    /// Load config + state, creating the state row lazily on first dispatch
    /// with `target_mps = start_mps`.
    pub async fn ensure_state(
        &self,
        sender: &SenderId,
    ) -> Result<(ThrottleConfig, ThrottleState), HeraldError> {
        let config = self.load_config(sender).await?;

        if let Some(state) = self.store.load_state(sender).await? {
            return Ok((config, state));
        }

        let state = ThrottleState::initial(&config, self.clock.now());
        match self.store.save_state(sender, state.clone(), None).await {
            Ok(()) => Ok((config, state)),
            // Another writer initialized it between our load and save; theirs
            // is the live row.
            Err(StoreError::Conflict) => {
                let state = self
                    .store
                    .load_state(sender)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                Ok((config, state))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Feed one completed batch back into the state.
    ///
    /// Decrease first: an overload signal always wins over a same-batch
    /// increase. Otherwise an increase happens only outside cooldown and
    /// after the configured gap since the last one.
    pub async fn on_batch_complete(
        &self,
        sender: &SenderId,
        report: &BatchReport,
    ) -> Result<ThrottleState, HeraldError> {
        let (config, mut state) = self.ensure_state(sender).await?;
        if !config.enabled {
            return Ok(state);
        }

        let expected = state.updated_at;
        let now = self.clock.now();

        if report.overload_observed {
            let before = state.target_mps;
            state.apply_decrease(&config, &self.policy, now);
            log::warn!(
                "sender {sender}: overload observed, target {before:.2} -> {:.2} mps, cooling down {}s",
                state.target_mps,
                config.cooldown_sec
            );
        } else if !state.in_cooldown(now) && state.increase_gap_elapsed(&config, now) {
            let before = state.target_mps;
            state.apply_increase(&config, &self.policy, now);
            if state.target_mps > before {
                log::debug!(
                    "sender {sender}: quiet batch, target {before:.2} -> {:.2} mps",
                    state.target_mps
                );
            }
        } else {
            return Ok(state);
        }

        self.store
            .save_state(sender, state.clone(), Some(expected))
            .await?;
        Ok(state)
    }

    /// Validate and persist a config. Rejection mutates nothing.
    pub async fn save_config(
        &self,
        sender: &SenderId,
        config: ThrottleConfig,
    ) -> Result<(), HeraldError> {
        config.validate()?;
        self.store.save_config(sender, config).await?;
        Ok(())
    }

    /// Operator reset: back to `start_mps`, hysteresis cleared.
    pub async fn reset(&self, sender: &SenderId) -> Result<ThrottleState, HeraldError> {
        let config = self.load_config(sender).await?;
        let now = self.clock.now();

        let mut state = self
            .store
            .load_state(sender)
            .await?
            .unwrap_or_else(|| ThrottleState::initial(&config, now));
        state.reset(&config, now);

        self.store.put_state(sender, state.clone()).await?;
        log::info!("sender {sender}: throttle state reset to {:.2} mps", state.target_mps);
        Ok(state)
    }

    pub async fn status(&self, sender: &SenderId) -> Result<ThrottleStatus, HeraldError> {
        let config = self.load_config(sender).await?;
        let state = self.store.load_state(sender).await?;
        Ok(ThrottleStatus { config, state })
    }

    /// Inter-send gap for the current target rate: the rate-derived spacing,
    /// never below the configured floor. The engine multiplies this by
    /// `send_concurrency` to get the per-worker gap.
    pub fn send_gap(config: &ThrottleConfig, state: &ThrottleState) -> std::time::Duration {
        let floor_ms = config.send_floor_delay_ms as f64;
        let gap_ms = if config.enabled && state.target_mps > 0.0 {
            (1000.0 / state.target_mps).max(floor_ms)
        } else {
            floor_ms
        };
        std::time::Duration::from_secs_f64(gap_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::memory::InMemoryStore;
    use crate::ports::clock::FixedClock;
    use crate::throttle::config::BALANCED;
    use chrono::{Duration, TimeZone, Utc};

    fn setup() -> (Arc<InMemoryStore>, Arc<FixedClock>, ThrottleController) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let controller = ThrottleController::new(store.clone(), clock.clone());
        (store, clock, controller)
    }

    fn quiet_report() -> BatchReport {
        BatchReport {
            sent: 10,
            failed: 0,
            skipped: 0,
            overload_observed: false,
            elapsed_ms: 500,
        }
    }

    fn overload_report() -> BatchReport {
        BatchReport {
            overload_observed: true,
            ..quiet_report()
        }
    }

    #[tokio::test]
    async fn state_is_created_lazily_at_start_mps() {
        let (_, _, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        let (_, state) = controller.ensure_state(&sender).await.unwrap();
        assert_eq!(state.target_mps, BALANCED.start_mps);
    }

    #[tokio::test]
    async fn unknown_sender_is_an_error() {
        let (_, _, controller) = setup();
        let err = controller
            .ensure_state(&SenderId::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::SenderUnknown(_)));
    }

    #[tokio::test]
    async fn invalid_config_save_leaves_store_untouched() {
        let (_, _, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        let bad = ThrottleConfig {
            min_mps: 90.0,
            ..BALANCED
        };
        assert!(controller.save_config(&sender, bad).await.is_err());

        let status = controller.status(&sender).await.unwrap();
        assert_eq!(status.config, BALANCED);
    }

    #[tokio::test]
    async fn overload_decreases_strictly_and_stays_above_min() {
        let (_, _, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        let state = controller
            .on_batch_complete(&sender, &overload_report())
            .await
            .unwrap();

        assert!(state.target_mps < BALANCED.start_mps);
        assert!(state.target_mps >= BALANCED.min_mps);
        assert!(state.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn no_increase_during_cooldown() {
        let (_, clock, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        let after_decrease = controller
            .on_batch_complete(&sender, &overload_report())
            .await
            .unwrap();

        // Still inside the cooldown window: a quiet batch must not grow.
        clock.advance(Duration::seconds(i64::from(BALANCED.cooldown_sec) - 5));
        let state = controller
            .on_batch_complete(&sender, &quiet_report())
            .await
            .unwrap();
        assert_eq!(state.target_mps, after_decrease.target_mps);

        // Past the cooldown the next quiet batch grows again.
        clock.advance(Duration::seconds(10));
        let state = controller
            .on_batch_complete(&sender, &quiet_report())
            .await
            .unwrap();
        assert!(state.target_mps > after_decrease.target_mps);
    }

    #[tokio::test]
    async fn consecutive_increases_respect_gap_and_max() {
        let (_, clock, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        let first = controller
            .on_batch_complete(&sender, &quiet_report())
            .await
            .unwrap();
        assert!(first.target_mps > BALANCED.start_mps);

        // Inside the minimum increase gap: no growth.
        clock.advance(Duration::seconds(5));
        let second = controller
            .on_batch_complete(&sender, &quiet_report())
            .await
            .unwrap();
        assert_eq!(second.target_mps, first.target_mps);

        // Grow until capped; target is non-decreasing throughout.
        let mut previous = second.target_mps;
        for _ in 0..30 {
            clock.advance(Duration::seconds(i64::from(BALANCED.min_increase_gap_sec)));
            let state = controller
                .on_batch_complete(&sender, &quiet_report())
                .await
                .unwrap();
            assert!(state.target_mps >= previous);
            assert!(state.target_mps <= BALANCED.max_mps);
            previous = state.target_mps;
        }
        assert_eq!(previous, BALANCED.max_mps);
    }

    #[tokio::test]
    async fn decrease_wins_over_same_batch_increase() {
        let (_, clock, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        // Eligible for an increase by every guard, but the batch saw
        // overload: the rate must drop.
        clock.advance(Duration::seconds(3600));
        let state = controller
            .on_batch_complete(&sender, &overload_report())
            .await
            .unwrap();
        assert!(state.target_mps < BALANCED.start_mps);
    }

    #[tokio::test]
    async fn reset_restores_start_rate() {
        let (_, _, controller) = setup();
        let sender = SenderId::new("wa:1");
        controller.save_config(&sender, BALANCED).await.unwrap();

        controller
            .on_batch_complete(&sender, &overload_report())
            .await
            .unwrap();

        let state = controller.reset(&sender).await.unwrap();
        assert_eq!(state.target_mps, BALANCED.start_mps);
        assert!(state.cooldown_until.is_none());
    }

    #[tokio::test]
    async fn disabled_config_freezes_the_rate() {
        let (_, _, controller) = setup();
        let sender = SenderId::new("wa:1");
        let config = ThrottleConfig {
            enabled: false,
            ..BALANCED
        };
        controller.save_config(&sender, config).await.unwrap();

        let state = controller
            .on_batch_complete(&sender, &overload_report())
            .await
            .unwrap();
        assert_eq!(state.target_mps, BALANCED.start_mps);
    }

    #[test]
    fn send_gap_is_rate_or_floor_whichever_is_larger() {
        let state = ThrottleState::initial(&BALANCED, Utc::now());

        // 20 mps -> 50ms gap, equal to the floor here.
        let gap = ThrottleController::send_gap(&BALANCED, &state);
        assert_eq!(gap, std::time::Duration::from_millis(50));

        // Slow rate: the rate-derived spacing dominates.
        let slow = ThrottleState {
            target_mps: 2.0,
            ..state.clone()
        };
        assert_eq!(
            ThrottleController::send_gap(&BALANCED, &slow),
            std::time::Duration::from_millis(500)
        );

        // High rate: the floor dominates.
        let fast = ThrottleState {
            target_mps: 80.0,
            ..state
        };
        assert_eq!(
            ThrottleController::send_gap(&BALANCED, &fast),
            std::time::Duration::from_millis(50)
        );
    }
}
