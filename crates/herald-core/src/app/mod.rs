//! App facade: the operations exposed to the campaign/UI layer.

pub mod builder;

pub use builder::{BuildError, HeraldBuilder};

use std::sync::Arc;

use crate::dispatch::engine::{CampaignPlan, DispatchEngine, DispatchHandle};
use crate::domain::attempt::DispatchAttempt;
use crate::domain::contact::{ContactSnapshot, Destination};
use crate::domain::errors::HeraldError;
use crate::domain::ids::{CampaignId, SenderId};
use crate::domain::template::TemplateContract;
use crate::ports::clock::Clock;
use crate::ports::id_generator::IdGenerator;
use crate::ports::store::AttemptStore;
use crate::precheck::{PrecheckEngine, PrecheckReport};
use crate::quarantine::entry::{QuarantineEntry, QuarantineFilter};
use crate::quarantine::ledger::QuarantineLedger;
use crate::status::{AttemptCounts, ThrottleStatus};
use crate::throttle::config::ThrottleConfig;
use crate::throttle::controller::ThrottleController;
use crate::throttle::state::ThrottleState;

/// The assembled system. Construct via [`HeraldBuilder`].
pub struct Herald {
    pub(crate) attempts: Arc<dyn AttemptStore>,
    pub(crate) engine: Arc<DispatchEngine>,
    pub(crate) controller: Arc<ThrottleController>,
    pub(crate) ledger: Arc<QuarantineLedger>,
    pub(crate) precheck: PrecheckEngine,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Herald {
    /// Classify every contact and seed the campaign's attempt rows from the
    /// result: `Pending` for sendable contacts, `Skipped` with a code for
    /// the rest. Safe to re-run after contact edits: rows with real
    /// outcomes are never clobbered.
    pub async fn run_precheck(
        &self,
        campaign_id: CampaignId,
        contract: &TemplateContract,
        contacts: &[ContactSnapshot],
    ) -> Result<PrecheckReport, HeraldError> {
        let report = self.precheck.run(campaign_id, contract, contacts).await?;

        let now = self.clock.now();
        let mut rows = Vec::with_capacity(report.results.len());
        for result in &report.results {
            let row = match (&result.skip_code, &result.destination) {
                (None, Some(destination)) => DispatchAttempt::pending(
                    self.ids.generate_attempt_id(),
                    campaign_id,
                    result.contact_id,
                    destination.clone(),
                    &contract.name,
                    &contract.language,
                    result.template_variables.clone(),
                    now,
                ),
                (Some(code), destination) => DispatchAttempt::skipped(
                    self.ids.generate_attempt_id(),
                    campaign_id,
                    result.contact_id,
                    destination.clone(),
                    &contract.name,
                    &contract.language,
                    *code,
                    now,
                ),
                // evaluate() never produces ok without a destination.
                (None, None) => continue,
            };
            rows.push(row);
        }
        self.attempts.seed_attempts(rows).await?;

        log::info!(
            "campaign {campaign_id}: precheck ok={} skipped={}",
            report.valid_count,
            report.skipped_count
        );
        Ok(report)
    }

    /// Start the batch loop for a prechecked campaign.
    pub fn dispatch(&self, plan: CampaignPlan) -> DispatchHandle {
        self.engine.clone().spawn(plan)
    }

    /// Validate and persist a throttle config. `min <= start <= max` is
    /// checked before anything touches storage.
    pub async fn save_throttle_config(
        &self,
        sender: &SenderId,
        config: ThrottleConfig,
    ) -> Result<(), HeraldError> {
        self.controller.save_config(sender, config).await
    }

    /// Operator reset of the target rate back to `start_mps`.
    pub async fn reset_throttle_state(&self, sender: &SenderId) -> Result<ThrottleState, HeraldError> {
        self.controller.reset(sender).await
    }

    pub async fn get_throttle_status(&self, sender: &SenderId) -> Result<ThrottleStatus, HeraldError> {
        self.controller.status(sender).await
    }

    pub async fn list_quarantine(
        &self,
        filter: QuarantineFilter,
    ) -> Result<Vec<QuarantineEntry>, HeraldError> {
        Ok(self.ledger.list(filter).await?)
    }

    pub async fn remove_quarantine_entry(
        &self,
        destination: &Destination,
    ) -> Result<bool, HeraldError> {
        Ok(self.ledger.remove(destination).await?)
    }

    pub async fn attempt_counts(&self, campaign_id: CampaignId) -> Result<AttemptCounts, HeraldError> {
        Ok(self.attempts.counts(campaign_id).await?)
    }
}
