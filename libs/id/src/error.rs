//! Error types for ID parsing.

use thiserror::Error;

/// Errors that can occur when parsing an ID from its string form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID carries the prefix of a different record type.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}

