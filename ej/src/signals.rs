//! Process-wide signals
//!
//! Built once by the composition root and handed to every component that
//! publishes or subscribes.

use serde_json::Value;
use tracing::debug;

use crate::bus::{Bus, BusError, Signal};
use crate::journal::Event;
use crate::state::GameState;

pub const JOURNAL_EVENT: &str = "journal event";
pub const STATE_CHANGED: &str = "state changed";
pub const STATE_INITIALIZED: &str = "state initialized";
pub const INIT_COMPLETE: &str = "init complete";
pub const EXITING: &str = "exiting";

/// The signals shared by the tailer, the aggregator and plugins
#[derive(Debug, Clone)]
pub struct AppSignals {
    /// Every event read from the journal or a snapshot file
    pub journal_event: Signal<Event>,
    /// A state snapshot, after an event changed something
    pub state_changed: Signal<GameState>,
    /// The state snapshot after the startup replay, once per run
    pub state_initialized: Signal<GameState>,
    /// Startup wiring is done
    pub init_complete: Signal<()>,
    /// The process is shutting down
    pub exiting: Signal<()>,
}

impl AppSignals {
    pub fn new(bus: &Bus) -> Self {
        debug!("AppSignals::new: called");
        Self {
            journal_event: Signal::define(JOURNAL_EVENT, bus),
            state_changed: Signal::define(STATE_CHANGED, bus),
            state_initialized: Signal::define(STATE_INITIALIZED, bus),
            init_complete: Signal::define(INIT_COMPLETE, bus),
            exiting: Signal::define(EXITING, bus),
        }
    }

    /// Names of all signals
    pub fn names(&self) -> [&str; 5] {
        [
            self.journal_event.name(),
            self.state_changed.name(),
            self.state_initialized.name(),
            self.init_complete.name(),
            self.exiting.name(),
        ]
    }

    /// Publish a JSON payload on the signal called `name`
    ///
    /// For bridges that only know signals by name. The payload must match the
    /// signal's payload type.
    pub fn publish_json(&self, name: &str, payload: Value) -> Result<(), BusError> {
        debug!(signal = name, "AppSignals::publish_json: called");
        match name {
            JOURNAL_EVENT => self.journal_event.publish_json(payload),
            STATE_CHANGED => self.state_changed.publish_json(payload),
            STATE_INITIALIZED => self.state_initialized.publish_json(payload),
            INIT_COMPLETE => self.init_complete.publish_json(payload),
            EXITING => self.exiting.publish_json(payload),
            _ => Err(BusError::UnknownSignal(name.to_string())),
        }
    }
}
