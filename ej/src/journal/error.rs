//! Journal errors

use std::path::PathBuf;

use thiserror::Error;

/// Why a line or single-record file could not be turned into an event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedReason {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("record is not an object")]
    NotAnObject,

    #[error("missing timestamp field")]
    MissingTimestamp,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("missing event field")]
    MissingEventType,

    #[error("fields do not match the raw line")]
    Inconsistent,
}

/// Errors from journal reading
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Malformed event ({reason}): {line}")]
    MalformedEvent { reason: MalformedReason, line: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JournalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for a record that is not valid JSON at all
    ///
    /// Single-record files are rewritten in place by the game, so a partial or
    /// empty read shows up as this kind of error and is not worth a warning.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            JournalError::MalformedEvent {
                reason: MalformedReason::InvalidJson(_),
                ..
            }
        )
    }
}
