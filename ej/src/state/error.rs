//! Mutation errors

use thiserror::Error;

/// A mutation handler could not apply an event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("Field '{field}' has an unexpected value: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Unknown material category: {0}")]
    UnknownCategory(String),

    #[error("Mutation failed: {0}")]
    Failed(String),
}

impl MutationError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}
