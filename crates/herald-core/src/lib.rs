//! herald-core
//!
//! Rate-governed bulk message dispatch: precheck, quarantine, adaptive
//! throughput control, and the batch engine that ties them together.
//!
//! Module map:
//! - **domain**: records and identities (attempts, contacts, templates,
//!   provider failures, typed ids)
//! - **ports**: abstraction layer (MessageProvider, stores, Clock,
//!   IdGenerator)
//! - **throttle**: per-sender config/state and the adaptive controller
//! - **quarantine**: failure accounting, suppression entries, the ledger
//! - **precheck**: contact classification before dispatch
//! - **dispatch**: the batch loop, pacing, batch events
//! - **impls**: in-memory adapters for development and tests
//! - **app**: builder + facade exposed to the campaign/UI layer

pub mod app;
pub mod dispatch;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod precheck;
pub mod quarantine;
pub mod status;
pub mod throttle;

pub use app::{BuildError, Herald, HeraldBuilder};
pub use dispatch::{BatchEvent, BatchReport, CampaignPlan, DispatchHandle, DispatchSummary};
pub use domain::{
    AttemptStatus, CampaignId, ContactId, ContactSnapshot, Destination, DispatchAttempt,
    FailureClass, HeraldError, ProviderFailure, SenderId, SkipCode, TemplateContract,
};
pub use precheck::{PrecheckReport, PrecheckResult};
pub use quarantine::{QuarantineEntry, QuarantineFilter, SuppressionRuleConfig};
pub use status::{AttemptCounts, ThrottleStatus};
pub use throttle::{RatePolicy, ThrottleConfig, ThrottleState};
