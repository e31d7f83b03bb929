//! Domain model (ids, contacts, templates, attempts, failures).

pub mod attempt;
pub mod contact;
pub mod errors;
pub mod failure;
pub mod ids;
pub mod template;

pub use attempt::{AttemptStatus, DispatchAttempt, SkipCode};
pub use contact::{ContactSnapshot, Destination, InvalidDestination};
pub use errors::HeraldError;
pub use failure::{FailureClass, ProviderFailure};
pub use ids::{AttemptId, CampaignId, ContactId, EntryId, Id, IdMarker, SenderId};
pub use template::{Binding, Placeholder, TemplateContract, TemplateSection};
