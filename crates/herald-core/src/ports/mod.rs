//! Ports - the abstraction layer between the engines and the outside world.
//!
//! Each trait hides an external system (messaging provider, relational
//! storage, wall clock) so the controller, ledger and batch engine are fully
//! testable without network or database access.

pub mod clock;
pub mod id_generator;
pub mod provider;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id_generator::{IdGenerator, UlidGenerator};
pub use provider::{DeliveryHandle, MessageProvider, OutboundMessage};
pub use store::{AttemptStore, QuarantineStore, StoreError, ThrottleStore};
