//! Dispatch batch engine: drives one campaign's sends to completion.
//!
//! Per batch: claim up to `batch_size` approved contacts, fan out to
//! `send_concurrency` paced workers, record outcomes, feed the aggregate
//! back to the throttle controller and the quarantine ledger, then loop.
//! Batches for one sending identity never overlap: the whole batch runs
//! under the per-sender lock, so the controller sees a single in-flight
//! decision per identity.
//!
//! Cancellation is cooperative and checked at batch boundaries only;
//! in-flight sends are allowed to finish, bounded by the per-send timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::attempt::DispatchAttempt;
use crate::domain::errors::HeraldError;
use crate::domain::failure::{FailureClass, ProviderFailure};
use crate::domain::ids::{CampaignId, SenderId};
use crate::ports::clock::Clock;
use crate::ports::provider::{MessageProvider, OutboundMessage};
use crate::ports::store::AttemptStore;
use crate::quarantine::ledger::QuarantineLedger;
use crate::throttle::controller::ThrottleController;

use super::locks::SenderLocks;
use super::report::{BatchEvent, BatchReport, DispatchSummary};

/// What the engine needs to know about one campaign run.
#[derive(Debug, Clone)]
pub struct CampaignPlan {
    pub campaign_id: CampaignId,
    pub sender: SenderId,
}

/// Running campaign dispatch: event stream + cancellation + final summary.
pub struct DispatchHandle {
    events: mpsc::Receiver<BatchEvent>,
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<Result<DispatchSummary, HeraldError>>,
}

impl DispatchHandle {
    /// Request cancellation. The current batch finishes; no new batch starts.
    pub fn cancel(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.cancel_tx.send(true);
    }

    /// Next batch-completion event; `None` once the loop has exited.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Wait for the loop to exit and take the final summary.
    pub async fn join(self) -> Result<DispatchSummary, HeraldError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(HeraldError::TaskFailed(e.to_string())),
        }
    }
}

pub struct DispatchEngine {
    attempts: Arc<dyn AttemptStore>,
    provider: Arc<dyn MessageProvider>,
    controller: Arc<ThrottleController>,
    ledger: Arc<QuarantineLedger>,
    clock: Arc<dyn Clock>,
    locks: Arc<SenderLocks>,

    /// Liveness window for `Sending` claims; older claims may be taken over.
    claim_staleness: chrono::Duration,

    /// Hard bound on one provider call; expiry becomes a transient failure.
    send_timeout: std::time::Duration,
}

impl DispatchEngine {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        provider: Arc<dyn MessageProvider>,
        controller: Arc<ThrottleController>,
        ledger: Arc<QuarantineLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attempts,
            provider,
            controller,
            ledger,
            clock,
            locks: Arc::new(SenderLocks::new()),
            claim_staleness: chrono::Duration::minutes(10),
            send_timeout: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_claim_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.claim_staleness = staleness;
        self
    }

    pub fn with_send_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Start the batch loop for one campaign on the runtime.
    pub fn spawn(self: Arc<Self>, plan: CampaignPlan) -> DispatchHandle {
        let (events_tx, events_rx) = mpsc::channel(32);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let join = tokio::spawn(async move { self.run_campaign(plan, events_tx, cancel_rx).await });

        DispatchHandle {
            events: events_rx,
            cancel_tx,
            join,
        }
    }

    async fn run_campaign(
        self: Arc<Self>,
        plan: CampaignPlan,
        events: mpsc::Sender<BatchEvent>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<DispatchSummary, HeraldError> {
        let mut summary = DispatchSummary::default();

        loop {
            if *cancel_rx.borrow() {
                log::info!("campaign {}: cancelled, stopping before next batch", plan.campaign_id);
                summary.cancelled = true;
                break;
            }

            // Whole-batch critical section per sender: claim, send, and the
            // controller's read-then-write all happen under this lock.
            let sender_lock = self.locks.for_sender(&plan.sender);
            let _sender_guard = sender_lock.lock().await;

            let (config, state) = self.controller.ensure_state(&plan.sender).await?;
            let claimed = self
                .attempts
                .claim_batch(
                    plan.campaign_id,
                    config.batch_size,
                    self.claim_staleness,
                    self.clock.now(),
                )
                .await?;
            if claimed.is_empty() {
                break;
            }

            let started = Instant::now();
            let gap = ThrottleController::send_gap(&config, &state);
            let batch = Arc::new(BatchContext {
                queue: tokio::sync::Mutex::new(claimed.into()),
                overload: AtomicBool::new(false),
                sent: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                skipped: AtomicUsize::new(0),
                per_worker_gap: gap * config.send_concurrency,
            });

            let mut joins = Vec::with_capacity(config.send_concurrency as usize);
            for worker_id in 0..config.send_concurrency as usize {
                let engine = Arc::clone(&self);
                let batch = Arc::clone(&batch);
                joins.push(tokio::spawn(async move {
                    engine.send_worker(worker_id, batch).await
                }));
            }
            for join in joins {
                match join.await {
                    Ok(result) => result?,
                    Err(e) => return Err(HeraldError::TaskFailed(e.to_string())),
                }
            }

            let report = BatchReport {
                sent: batch.sent.load(Ordering::Relaxed),
                failed: batch.failed.load(Ordering::Relaxed),
                skipped: batch.skipped.load(Ordering::Relaxed),
                overload_observed: batch.overload.load(Ordering::Relaxed),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            let state = self.controller.on_batch_complete(&plan.sender, &report).await?;

            summary.batches += 1;
            summary.sent += report.sent;
            summary.failed += report.failed;
            summary.skipped += report.skipped;

            log::debug!(
                "campaign {}: batch {} done, sent={} failed={} skipped={} overload={} target={:.2}mps",
                plan.campaign_id,
                summary.batches,
                report.sent,
                report.failed,
                report.skipped,
                report.overload_observed,
                state.target_mps
            );

            let event = BatchEvent {
                batch_index: summary.batches,
                report,
                target_mps: state.target_mps,
            };
            // The stream consumer may be gone; dispatch keeps going anyway.
            let _ = events.send(event).await;
        }

        Ok(summary)
    }

    async fn send_worker(&self, worker_id: usize, batch: Arc<BatchContext>) -> Result<(), HeraldError> {
        loop {
            let next = { batch.queue.lock().await.pop_front() };
            let Some(attempt) = next else {
                break;
            };

            // Pacing: the controller's inter-send gap spread across workers.
            tokio::time::sleep(batch.per_worker_gap).await;

            let Some(destination) = attempt.destination.clone() else {
                // Pending rows always carry a destination; a row without one
                // is corrupt and must not cycle through claims forever.
                log::error!(
                    "worker {worker_id}: claimed attempt {} has no destination",
                    attempt.attempt_id
                );
                self.attempts
                    .mark_failed(
                        attempt.attempt_id,
                        ProviderFailure::new(0, "claimed row has no destination"),
                        self.clock.now(),
                    )
                    .await?;
                batch.failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let message = OutboundMessage {
                destination: destination.clone(),
                template: attempt.template.clone(),
                language: attempt.language.clone(),
                variables: attempt.template_variables.clone(),
            };

            let outcome = match tokio::time::timeout(self.send_timeout, self.provider.send(&message)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderFailure::timeout()),
            };

            match outcome {
                Ok(handle) => {
                    self.attempts
                        .mark_sent(attempt.attempt_id, handle.message_id, self.clock.now())
                        .await?;
                    batch.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(failure) => match failure.class() {
                    // Never a campaign failure: flag the batch, return the
                    // claim so the contact retries at the reduced rate.
                    FailureClass::ThroughputLimit => {
                        log::warn!(
                            "worker {worker_id}: throughput limit on {destination}: {failure}"
                        );
                        batch.overload.store(true, Ordering::Relaxed);
                        self.attempts.release_claim(attempt.attempt_id).await?;
                        batch.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    FailureClass::Undeliverable => {
                        self.attempts
                            .mark_failed(attempt.attempt_id, failure.clone(), self.clock.now())
                            .await?;
                        self.ledger
                            .record_failure(&destination, FailureClass::Undeliverable, &failure.title)
                            .await?;
                        batch.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    FailureClass::Transient => {
                        self.attempts
                            .mark_failed(attempt.attempt_id, failure, self.clock.now())
                            .await?;
                        batch.failed.fetch_add(1, Ordering::Relaxed);
                    }
                },
            }
        }
        Ok(())
    }
}

/// Shared state of one in-flight batch.
struct BatchContext {
    queue: tokio::sync::Mutex<VecDeque<DispatchAttempt>>,
    overload: AtomicBool,
    sent: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    per_worker_gap: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attempt::AttemptStatus;
    use crate::domain::contact::Destination;
    use crate::domain::ids::{AttemptId, ContactId};
    use crate::impls::fake_provider::FakeProvider;
    use crate::impls::memory::InMemoryStore;
    use crate::ports::clock::FixedClock;
    use crate::ports::id_generator::UlidGenerator;
    use crate::quarantine::rules::{ClassRule, SuppressionRuleConfig};
    use crate::throttle::config::ThrottleConfig;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use ulid::Ulid;

    struct Fixture {
        store: Arc<InMemoryStore>,
        provider: Arc<FakeProvider>,
        clock: Arc<FixedClock>,
        controller: Arc<ThrottleController>,
        ledger: Arc<QuarantineLedger>,
        engine: Arc<DispatchEngine>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let controller = Arc::new(ThrottleController::new(store.clone(), clock.clone()));
        let ledger = Arc::new(QuarantineLedger::new(
            store.clone(),
            ids,
            clock.clone(),
            SuppressionRuleConfig {
                enabled: true,
                undeliverable: ClassRule {
                    enabled: true,
                    window_days: 30,
                    threshold: 1,
                    ttl_base_days: 7,
                    ttl2_days: 30,
                    ttl3_days: 90,
                },
                ..SuppressionRuleConfig::default()
            },
        ));
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            provider.clone(),
            controller.clone(),
            ledger.clone(),
            clock.clone(),
        ));
        Fixture {
            store,
            provider,
            clock,
            controller,
            ledger,
            engine,
        }
    }

    /// Fast test config: high rate, no floor delay.
    fn fast_config(batch_size: usize) -> ThrottleConfig {
        ThrottleConfig {
            enabled: true,
            send_concurrency: 2,
            batch_size,
            start_mps: 500.0,
            max_mps: 1000.0,
            min_mps: 1.0,
            cooldown_sec: 60,
            min_increase_gap_sec: 30,
            send_floor_delay_ms: 0,
        }
    }

    fn pending_row(
        fixture: &Fixture,
        campaign_id: CampaignId,
        phone: &str,
    ) -> DispatchAttempt {
        DispatchAttempt::pending(
            AttemptId::from_ulid(Ulid::new()),
            campaign_id,
            ContactId::from_ulid(Ulid::new()),
            Destination::parse(phone).unwrap(),
            "order_update",
            "pt_BR",
            BTreeMap::new(),
            fixture.clock.now(),
        )
    }

    async fn seed_contacts(fixture: &Fixture, campaign_id: CampaignId, n: usize) {
        let rows: Vec<_> = (0..n)
            .map(|i| pending_row(fixture, campaign_id, &format!("+55119999000{i:02}")))
            .collect();
        fixture.store.seed_attempts(rows).await.unwrap();
    }

    #[tokio::test]
    async fn all_contacts_sent_across_batches() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        f.controller.save_config(&sender, fast_config(2)).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        seed_contacts(&f, campaign_id, 5).await;

        let mut handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender,
        });

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        let summary = handle.join().await.unwrap();

        // 5 contacts at batch_size 2 -> 3 batches.
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.sent, 5);
        assert_eq!(summary.failed, 0);
        assert!(!summary.cancelled);
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().map(|e| e.report.sent).sum::<usize>(), 5);

        let counts = f.store.counts(campaign_id).await.unwrap();
        assert_eq!(counts.sent, 5);
        assert_eq!(counts.pending, 0);

        assert_eq!(f.provider.sent().len(), 5);
    }

    #[tokio::test]
    async fn overload_backs_off_and_requeues_the_contact() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        let config = fast_config(2);
        f.controller.save_config(&sender, config.clone()).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let victim = pending_row(&f, campaign_id, "+5511999990001");
        let other = pending_row(&f, campaign_id, "+5511999990002");
        f.provider.fail_next(
            victim.destination.clone().unwrap(),
            ProviderFailure::new(130429, "Rate limit hit"),
        );
        f.store.seed_attempts(vec![victim.clone(), other]).await.unwrap();

        let mut handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender: sender.clone(),
        });

        let first = handle.next_event().await.unwrap();
        assert!(first.report.overload_observed);
        assert_eq!(first.report.skipped, 1);
        // Strictly below the pre-decrease rate, still >= min.
        assert!(first.target_mps < config.start_mps);
        assert!(first.target_mps >= config.min_mps);

        // The victim went back to pending and the next batch delivers it.
        let second = handle.next_event().await.unwrap();
        assert_eq!(second.report.sent, 1);
        assert!(!second.report.overload_observed);

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 0);

        let counts = f.store.counts(campaign_id).await.unwrap();
        assert_eq!(counts.sent, 2);
    }

    #[tokio::test]
    async fn undeliverable_failure_feeds_quarantine() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        f.controller.save_config(&sender, fast_config(10)).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let bad = pending_row(&f, campaign_id, "+5511999990001");
        let bad_destination = bad.destination.clone().unwrap();
        let good = pending_row(&f, campaign_id, "+5511999990002");
        f.provider.fail_next(
            bad_destination.clone(),
            ProviderFailure::new(131026, "Message undeliverable").with_trace_id("tr-1"),
        );
        f.store.seed_attempts(vec![bad.clone(), good]).await.unwrap();

        let mut handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender,
        });
        while handle.next_event().await.is_some() {}
        let summary = handle.join().await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);

        // Threshold 1: the destination is suppressed immediately.
        assert!(f.ledger.is_suppressed(&bad_destination).await.unwrap());

        // And the attempt row carries the structured failure.
        let row = f.store.get_attempt(bad.attempt_id).await.unwrap();
        assert_eq!(row.status, AttemptStatus::Failed);
        let failure = row.failure.unwrap();
        assert_eq!(failure.code, 131026);
        assert_eq!(failure.trace_id.as_deref(), Some("tr-1"));
    }

    #[tokio::test]
    async fn transient_failure_does_not_quarantine() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        f.controller.save_config(&sender, fast_config(10)).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        let row = pending_row(&f, campaign_id, "+5511999990001");
        let destination = row.destination.clone().unwrap();
        f.provider.fail_next(
            destination.clone(),
            ProviderFailure::new(131000, "Something went wrong"),
        );
        f.store.seed_attempts(vec![row]).await.unwrap();

        let mut handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender,
        });
        while handle.next_event().await.is_some() {}
        let summary = handle.join().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!f.ledger.is_suppressed(&destination).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_before_first_batch_sends_nothing() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        f.controller.save_config(&sender, fast_config(2)).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        seed_contacts(&f, campaign_id, 3).await;

        // Current-thread runtime: the task has not run yet, so the cancel
        // lands before its first boundary check.
        let handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender,
        });
        handle.cancel();
        let summary = handle.join().await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.sent, 0);
        assert_eq!(f.store.counts(campaign_id).await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn cancel_mid_campaign_stops_at_the_batch_boundary() {
        let f = fixture();
        let sender = SenderId::new("wa:1");
        f.controller.save_config(&sender, fast_config(1)).await.unwrap();

        let campaign_id = CampaignId::from_ulid(Ulid::new());
        seed_contacts(&f, campaign_id, 10).await;

        let mut handle = f.engine.clone().spawn(CampaignPlan {
            campaign_id,
            sender,
        });

        // Consume one batch event, then cancel.
        let first = handle.next_event().await.unwrap();
        assert_eq!(first.report.sent, 1);
        handle.cancel();

        let summary = handle.join().await.unwrap();
        assert!(summary.cancelled);
        assert!(summary.sent < 10);

        let counts = f.store.counts(campaign_id).await.unwrap();
        assert_eq!(counts.sent + counts.pending, 10);
        assert_eq!(counts.sending, 0);
    }
}
