//! Bus errors

use thiserror::Error;

/// Errors from publishing on the bus
#[derive(Debug, Error)]
pub enum BusError {
    /// A dynamically typed payload does not match the signal's payload type
    #[error("Signature mismatch on signal '{signal}': expected {expected}: {reason}")]
    SignatureMismatch {
        signal: String,
        expected: &'static str,
        reason: String,
    },

    /// No signal is registered under this name
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    /// The dispatch worker has shut down
    #[error("Dispatch queue closed")]
    Closed,
}
