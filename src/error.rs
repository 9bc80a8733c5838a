//! Error types shared across the engine.
//!
//! Each concern gets its own `thiserror` enum so callers can match on
//! what went wrong.  The HTTP layer maps them onto status codes in
//! [`crate::api`].

use thiserror::Error;

/// Failures raised while pricing a position or assembling a comparison.
#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    /// An input was outside its accepted domain.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    /// The agreement has no levels to price.
    #[error("agreement `{0}` has no levels")]
    NoLevels(String),
}

impl CostError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CostError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures raised by an agreement repository.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("agreement `{0}` not found")]
    NotFound(String),
    /// The agreement is structurally unacceptable for storage.
    #[error("invalid agreement: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// A stored row could not be mapped back onto the model.
    #[error("corrupt row in `{table}`: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

/// Failures raised while decoding a shared comparison link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("invalid or expired link")]
    InvalidLink,
}

/// Raised when parsing an enum from its storage or configuration
/// string fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown variant `{0}`")]
pub struct UnknownVariant(pub String);
