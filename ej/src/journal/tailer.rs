//! JournalTailer - the live tailing loop
//!
//! Polls the journal directory on a fixed interval, follows the newest journal
//! file from a remembered byte offset and publishes every new event on the
//! journal event signal. Snapshot files (Status.json and friends) are polled
//! on the same tick and published only when they carry a newer timestamp.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::event::Event;
use super::reader::JournalReader;
use crate::bus::Signal;
use crate::supervisor::StopSignal;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Single-record files the game rewrites in place
pub const DEFAULT_SNAPSHOT_FILES: &[&str] = &[
    "Status.json",
    "Cargo.json",
    "Market.json",
    "ModulesInfo.json",
    "Outfitting.json",
];

/// Tailer configuration
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Delay between polls
    pub poll_interval: Duration,
    /// Snapshot file names, relative to the journal directory
    pub snapshot_files: Vec<String>,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            snapshot_files: DEFAULT_SNAPSHOT_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Where the tailer currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailState {
    /// No journal file exists yet
    NoFile,
    /// Following `path` from `offset`
    Tailing { path: PathBuf, offset: u64 },
}

/// Follows the newest journal file and publishes its events
pub struct JournalTailer {
    reader: Arc<JournalReader>,
    signal: Signal<Event>,
    config: TailerConfig,
    state: TailState,
    /// A journal existed before the first tick; its backlog is skipped once
    skip_backlog: bool,
}

impl JournalTailer {
    /// Create a tailer
    ///
    /// Whether a journal file already exists is decided here, so construct the
    /// tailer at startup, before the game can rotate to a new file.
    pub fn new(reader: Arc<JournalReader>, signal: Signal<Event>, config: TailerConfig) -> Self {
        let skip_backlog = reader.latest_file().is_some();
        debug!(skip_backlog, "JournalTailer::new: called");
        Self {
            reader,
            signal,
            config,
            state: TailState::NoFile,
            skip_backlog,
        }
    }

    /// Current tailing state
    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// Run one polling cycle, returning the number of events published
    pub fn poll_once(&mut self) -> usize {
        self.read_journal() + self.read_snapshot_files()
    }

    /// Run until `stop` is raised
    ///
    /// Each poll runs on the blocking thread pool since it reads from disk.
    pub async fn run(self, mut stop: StopSignal) {
        info!(
            dir = %self.reader.dir().display(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "JournalTailer started"
        );

        let poll_interval = self.config.poll_interval;
        let mut tailer = self;
        while !stop.is_stopped() {
            let polled = tokio::task::spawn_blocking(move || {
                let published = tailer.poll_once();
                (tailer, published)
            })
            .await;

            let (returned, published) = match polled {
                Ok(polled) => polled,
                Err(e) => {
                    error!(error = %e, "JournalTailer poll failed, stopping");
                    return;
                }
            };
            tailer = returned;
            if published > 0 {
                debug!(published, "JournalTailer: published events");
            }
            if stop.sleep(poll_interval).await {
                break;
            }
        }

        info!("JournalTailer stopped");
    }

    fn read_journal(&mut self) -> usize {
        let Some(latest) = self.reader.latest_file() else {
            debug!("No journal files found");
            return 0;
        };

        let offset = match &self.state {
            TailState::Tailing { path, offset } if *path == latest => *offset,
            _ => match self.rotate(&latest) {
                Some(offset) => offset,
                None => return 0,
            },
        };

        let chunk = match JournalReader::read_appended(&latest, offset) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Failed to read journal, retrying next cycle");
                return 0;
            }
        };

        let mut published = 0;
        for event in chunk.events {
            if self.publish(event) {
                published += 1;
            }
        }

        self.state = TailState::Tailing {
            path: latest,
            offset: chunk.offset,
        };
        published
    }

    /// Pick the start offset for a newly seen journal file
    fn rotate(&mut self, latest: &Path) -> Option<u64> {
        let file_name = latest.file_name().map(|n| n.to_string_lossy().into_owned());
        info!(file = ?file_name, "Changing current journal");

        if !std::mem::take(&mut self.skip_backlog) {
            return Some(0);
        }

        debug!("Startup skipping existing journal content");
        match JournalReader::end_of_file(latest) {
            Ok(end) => Some(end),
            Err(e) => {
                warn!(error = %e, "Failed to seek to end of journal");
                self.skip_backlog = true;
                None
            }
        }
    }

    fn read_snapshot_files(&self) -> usize {
        let mut published = 0;
        for file_name in &self.config.snapshot_files {
            let Some(event) = self.reader.snapshot_event(file_name) else {
                continue;
            };
            if self.publish(event) {
                published += 1;
            }
        }
        published
    }

    fn publish(&self, event: Event) -> bool {
        match self.signal.publish_async(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to publish journal event");
                false
            }
        }
    }
}
