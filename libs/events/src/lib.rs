//! # yard-events
//!
//! Notification events emitted by the yard service after a committed change.
//!
//! ## Design Principles
//!
//! - Events describe a change that has already been committed; they are never
//!   the mechanism that enforces an invariant
//! - Delivery is best-effort: no acknowledgment, no replay
//! - Each event carries the affected container's full record, except
//!   `containerShipped`, which carries only `{id}`
//!
//! ## Event Names
//!
//! - `containerAdded` - a container was registered
//! - `containerUpdated` - an operator overrode a container's status
//! - `containerAssigned` - a container was placed into (or moved to) a zone
//! - `containerShipped` - a container left the yard

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
