//! Precheck: classify contacts as sendable or skipped before dispatch.
//!
//! A pure function of (template contract, suppression state, contact
//! snapshot): re-running it with unchanged inputs yields byte-identical
//! output. Callers re-run it after contact edits and seed dispatch attempts
//! from the result; it is not a system of record.

pub mod resolve;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::attempt::SkipCode;
use crate::domain::contact::{ContactSnapshot, Destination};
use crate::domain::ids::{CampaignId, ContactId};
use crate::domain::template::TemplateContract;
use crate::ports::store::StoreError;
use crate::quarantine::ledger::QuarantineLedger;

use self::resolve::{Resolved, resolve};

/// One unresolved required placeholder, with enough metadata for a caller
/// to build a targeted fix UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingParam {
    /// The raw token as it appears in the template ("{{2}}", "{{name}}").
    pub raw: String,

    /// Humanized label of the binding behind it ("Delivery Date").
    pub resolved_label: String,
}

/// Per-contact precheck classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub contact_id: ContactId,
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_code: Option<SkipCode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingParam>,

    /// Resolved placeholder values, keyed by raw token. BTreeMap keeps the
    /// serialized form deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_variables: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
}

/// Aggregate over one candidate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecheckReport {
    pub campaign_id: CampaignId,
    pub valid_count: usize,
    pub skipped_count: usize,
    pub results: Vec<PrecheckResult>,
}

pub struct PrecheckEngine {
    ledger: Arc<QuarantineLedger>,
}

impl PrecheckEngine {
    pub fn new(ledger: Arc<QuarantineLedger>) -> Self {
        Self { ledger }
    }

    /// Classify every contact in the list.
    pub async fn run(
        &self,
        campaign_id: CampaignId,
        contract: &TemplateContract,
        contacts: &[ContactSnapshot],
    ) -> Result<PrecheckReport, StoreError> {
        let mut results = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let suppressed = match contact.destination() {
                Ok(destination) => self.ledger.is_suppressed(&destination).await?,
                Err(_) => false,
            };
            results.push(evaluate(contract, contact, suppressed));
        }

        let valid_count = results.iter().filter(|r| r.ok).count();
        Ok(PrecheckReport {
            campaign_id,
            valid_count,
            skipped_count: results.len() - valid_count,
            results,
        })
    }
}

/// Classify one contact. Pure; the suppression verdict comes in as a plain
/// bool so the precedence rules live in one place:
///
/// 1. `INVALID_DESTINATION`: nothing can be sent to an unparseable number.
/// 2. `SUPPRESSED`: wins regardless of variable completeness.
/// 3. `MISSING_REQUIRED_PARAM`: any required non-dynamic binding empty.
pub fn evaluate(
    contract: &TemplateContract,
    contact: &ContactSnapshot,
    suppressed: bool,
) -> PrecheckResult {
    let destination = contact.destination().ok();

    let mut missing = Vec::new();
    let mut template_variables = BTreeMap::new();
    for placeholder in &contract.required {
        match resolve(contact, &placeholder.binding) {
            Resolved::Value(value) => {
                template_variables.insert(placeholder.raw.clone(), value);
            }
            Resolved::Empty => missing.push(MissingParam {
                raw: placeholder.raw.clone(),
                resolved_label: placeholder.binding.label(),
            }),
            // Resolved at send time against data outside the snapshot.
            Resolved::Dynamic => {}
        }
    }

    let skip_code = if destination.is_none() {
        Some(SkipCode::InvalidDestination)
    } else if suppressed {
        Some(SkipCode::Suppressed)
    } else if !missing.is_empty() {
        Some(SkipCode::MissingRequiredParam)
    } else {
        None
    };

    PrecheckResult {
        contact_id: contact.contact_id,
        ok: skip_code.is_none(),
        skip_code,
        missing,
        template_variables,
        destination,
    }
}
