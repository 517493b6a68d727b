//! # Error Types
//!
//! Errors raised by the validated constructors in this crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.

use thiserror::Error;

/// Error constructing a core domain value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The text is not a valid textual principal.
    #[error("invalid principal {0:?}")]
    InvalidPrincipal(String),

    /// The input does not carry a well-formed authn-method registration id.
    #[error("invalid registration id {0:?}")]
    InvalidRegistrationId(String),

    /// The millisecond timestamp cannot be represented as a UTC datetime.
    #[error("timestamp out of range: {0} ms")]
    TimestampOutOfRange(u64),
}
