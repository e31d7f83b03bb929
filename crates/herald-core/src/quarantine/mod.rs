//! Quarantine: failure accounting, suppression entries, escalating TTLs.

pub mod entry;
pub mod ledger;
pub mod rules;

pub use entry::{FailureOccurrence, QuarantineEntry, QuarantineFilter};
pub use ledger::QuarantineLedger;
pub use rules::{ClassRule, SuppressionRuleConfig};
