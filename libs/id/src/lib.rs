//! # yard-id
//!
//! Typed identifiers for the yard service.
//!
//! Every record the service owns is addressed by a prefixed ULID:
//! `{prefix}_{ulid}`, for example `ctr_01HV4Z2WQXKJNM8GPQY6VBKC3D` for a
//! container or `zone_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for a zone.
//!
//! The prefix keeps a zone id from ever being accepted where a container id is
//! expected, and the ULID body sorts by creation time.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
