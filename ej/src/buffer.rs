//! EventBuffer - batch journal events for periodic processing
//!
//! Collects the journal events that pass a filter and hands them over in
//! batches: on a fixed interval while running, and once more when the process
//! announces it is exiting.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::journal::Event;
use crate::signals::AppSignals;
use crate::supervisor::Supervisor;

/// Default time between flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

type Filter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

pub struct EventBuffer {
    name: String,
    filter: Filter,
    events: Mutex<Vec<Event>>,
}

impl EventBuffer {
    /// A buffer that keeps every event
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_filter(name, |_| true)
    }

    /// A buffer that keeps events for which `filter` returns true
    pub fn with_filter<F>(name: impl Into<String>, filter: F) -> Arc<Self>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            filter: Box::new(filter),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Buffer `event` if it passes the filter
    pub fn push(&self, event: Event) -> bool {
        if !(self.filter)(&event) {
            return false;
        }
        self.lock().push(event);
        true
    }

    /// Take everything buffered so far
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain and hand the batch to `process`, returning the batch size
    ///
    /// An empty buffer does not call `process`.
    pub fn flush<F>(&self, process: &F) -> eyre::Result<usize>
    where
        F: Fn(Vec<Event>) -> eyre::Result<()>,
    {
        let events = self.drain();
        if events.is_empty() {
            return Ok(0);
        }
        let count = events.len();
        debug!(buffer = %self.name, count, "EventBuffer::flush: processing");
        process(events)?;
        Ok(count)
    }

    /// Wire the buffer into the running process
    ///
    /// Subscribes to journal events, flushes every `period` through the
    /// supervisor and flushes a final time on the exiting signal.
    pub fn attach<F>(self: &Arc<Self>, signals: &AppSignals, supervisor: &mut Supervisor, period: Duration, process: F)
    where
        F: Fn(Vec<Event>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        info!(buffer = %self.name, period_secs = period.as_secs(), "Attaching event buffer");
        let process = Arc::new(process);

        let buffer = self.clone();
        signals
            .journal_event
            .subscribe(format!("{} buffer", self.name), move |event: Event| {
                buffer.push(event);
                Ok(())
            });

        let buffer = self.clone();
        let periodic = process.clone();
        supervisor.add_interval(format!("{} flush", self.name), period, true, move || {
            buffer.flush(&*periodic).map(|_| ())
        });

        let buffer = self.clone();
        signals
            .exiting
            .subscribe(format!("{} exit flush", self.name), move |()| {
                buffer.flush(&*process).map(|_| ())
            });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}
