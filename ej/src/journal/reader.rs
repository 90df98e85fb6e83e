//! JournalReader - locates, parses and tails journal files
//!
//! The reader is shared between the startup replay and the live tailing loop,
//! so everything that caches goes through an internal mutex.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::JournalError;
use super::event::{Event, parse_line};

/// Default journal file name pattern
pub const DEFAULT_JOURNAL_PATTERN: &str = "Journal.*.log";

/// Event name of the header record that opens every journal file
pub const FILEHEADER_EVENT: &str = "Fileheader";

const UNKNOWN: &str = "unknown";

/// Game version information from the journal header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub build: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            version: UNKNOWN.to_string(),
            build: UNKNOWN.to_string(),
        }
    }
}

impl VersionInfo {
    /// Extract version info from a header event; absent or empty fields become "unknown"
    pub fn from_header(event: &Event) -> Self {
        let field = |key: &str| {
            event
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            version: field("gameversion"),
            build: field("build"),
        }
    }
}

/// New complete lines read from a journal file
#[derive(Debug, Default)]
pub struct TailChunk {
    /// Successfully parsed events, in file order
    pub events: Vec<Event>,
    /// Byte offset to resume from next time
    pub offset: u64,
    /// Lines that failed to parse
    pub skipped: usize,
}

struct LatestCache {
    path: Option<PathBuf>,
    mtime: Option<SystemTime>,
    events: Arc<[Event]>,
}

impl LatestCache {
    fn empty() -> Self {
        Self {
            path: None,
            mtime: None,
            events: Arc::from(Vec::new()),
        }
    }
}

/// Reads journal files and single-record snapshot files from one directory
pub struct JournalReader {
    dir: PathBuf,
    pattern: String,
    latest: Mutex<LatestCache>,
    snapshot_timestamps: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl JournalReader {
    /// Create a reader for the default journal file pattern
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_pattern(dir, DEFAULT_JOURNAL_PATTERN)
    }

    /// Create a reader matching journal files with a custom glob pattern
    pub fn with_pattern(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        let dir = dir.into();
        let pattern = pattern.into();
        debug!(dir = %dir.display(), %pattern, "JournalReader::new: called");
        Self {
            dir,
            pattern,
            latest: Mutex::new(LatestCache::empty()),
            snapshot_timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// Journal directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest journal file by modification time, or `None` if nothing matches
    pub fn latest_file(&self) -> Option<PathBuf> {
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            self.pattern
        );
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(%pattern, error = %e, "Invalid journal file pattern");
                return None;
            }
        };

        // Sorted by name first so equal mtimes resolve to the last name
        let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match modified(&path) {
                Ok(mtime) => Some((mtime, path)),
                Err(e) => {
                    warn!(error = %e, "Failed to stat journal file");
                    None
                }
            })
            .max_by_key(|(mtime, _)| *mtime)
            .map(|(_, path)| path)
    }

    /// Parse every line of a journal file
    ///
    /// Lines that fail to parse are logged and skipped. A file that cannot be
    /// read yields no events.
    pub fn all_events(path: &Path) -> Vec<Event> {
        debug!(path = %path.display(), "all_events: called");
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %JournalError::io(path, e), "Failed to read journal file");
                return Vec::new();
            }
        };
        let content = String::from_utf8_lossy(&bytes);

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_line(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Failed to process event");
                    None
                }
            })
            .collect()
    }

    /// All events of the latest journal file
    ///
    /// The parsed file is cached and only re-read when the latest file changes
    /// identity or modification time. Unchanged calls return the same shared
    /// slice.
    pub fn cached_latest_events(&self) -> Arc<[Event]> {
        let Some(latest) = self.latest_file() else {
            debug!("cached_latest_events: no journal files");
            return Arc::from(Vec::new());
        };
        let mtime = match modified(&latest) {
            Ok(mtime) => Some(mtime),
            Err(e) => {
                warn!(error = %e, "Failed to stat latest journal file");
                None
            }
        };

        let mut cache = lock(&self.latest);
        if cache.path.as_deref() != Some(latest.as_path()) || cache.mtime != mtime || mtime.is_none() {
            debug!(path = %latest.display(), "cached_latest_events: re-reading latest file");
            cache.events = Arc::from(Self::all_events(&latest));
            cache.path = Some(latest);
            cache.mtime = mtime;
        }
        Arc::clone(&cache.events)
    }

    /// Read a file expected to hold exactly one record
    ///
    /// Missing, empty and half-written files yield `None`; decode failures are
    /// expected while the game rewrites the file and are only logged at debug.
    pub fn single_record_event(path: &Path) -> Option<Event> {
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %JournalError::io(path, e), "Failed to read snapshot file");
                return None;
            }
        };
        let content = content.trim();
        if content.is_empty() {
            debug!(path = %path.display(), "single_record_event: file is empty");
            return None;
        }

        match parse_line(content) {
            Ok(event) => Some(event),
            Err(e) if e.is_decode_error() => {
                debug!(path = %path.display(), error = %e, "Snapshot file not decodable yet");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read snapshot file");
                None
            }
        }
    }

    /// Pass a snapshot event through only if it is newer than the last one of its type
    ///
    /// The first event seen for a type only records its timestamp, so snapshot
    /// files that predate startup are not re-emitted. Equal timestamps are
    /// dropped.
    pub fn dedup_by_type(&self, event: Event) -> Option<Event> {
        let mut seen = lock(&self.snapshot_timestamps);
        match seen.get(event.name()) {
            None => {
                debug!(event = %event.name(), "dedup_by_type: first snapshot recorded");
                seen.insert(event.name().to_string(), event.timestamp());
                None
            }
            Some(last) if event.timestamp() > *last => {
                seen.insert(event.name().to_string(), event.timestamp());
                Some(event)
            }
            Some(_) => None,
        }
    }

    /// Read a snapshot file from the journal directory and de-duplicate it
    pub fn snapshot_event(&self, file_name: &str) -> Option<Event> {
        let event = Self::single_record_event(&self.dir.join(file_name))?;
        self.dedup_by_type(event)
    }

    /// Game version from the latest journal file header
    pub fn game_version(&self) -> Option<VersionInfo> {
        self.cached_latest_events()
            .iter()
            .find(|event| event.name().eq_ignore_ascii_case(FILEHEADER_EVENT))
            .map(VersionInfo::from_header)
    }

    /// Offset just past the last complete line of a file
    ///
    /// A line still being written at the end is excluded, so tailing from
    /// here picks it up whole once it is terminated.
    pub fn end_of_file(path: &Path) -> Result<u64, JournalError> {
        let mut file = File::open(path).map_err(|e| JournalError::io(path, e))?;
        let len = file.metadata().map_err(|e| JournalError::io(path, e))?.len();

        let mut end = len;
        let mut block = [0u8; 4096];
        while end > 0 {
            let start = end.saturating_sub(block.len() as u64);
            let buf = &mut block[..(end - start) as usize];
            file.seek(SeekFrom::Start(start)).map_err(|e| JournalError::io(path, e))?;
            file.read_exact(buf).map_err(|e| JournalError::io(path, e))?;
            if let Some(pos) = buf.iter().rposition(|b| *b == b'\n') {
                return Ok(start + pos as u64 + 1);
            }
            end = start;
        }

        debug!(path = %path.display(), len, "end_of_file: no complete line");
        Ok(0)
    }

    /// Read complete lines appended after `offset`
    ///
    /// A trailing line without a terminator is still being written and is
    /// left for the next read. If the file shrank below `offset` it was
    /// truncated and is read again from the start.
    pub fn read_appended(path: &Path, offset: u64) -> Result<TailChunk, JournalError> {
        let mut file = File::open(path).map_err(|e| JournalError::io(path, e))?;
        let len = file.metadata().map_err(|e| JournalError::io(path, e))?.len();

        let mut start = offset;
        if len < offset {
            info!(path = %path.display(), offset, len, "Journal file truncated, reading from start");
            start = 0;
        }
        if len == start {
            return Ok(TailChunk {
                offset: start,
                ..Default::default()
            });
        }

        file.seek(SeekFrom::Start(start)).map_err(|e| JournalError::io(path, e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| JournalError::io(path, e))?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            debug!(path = %path.display(), "read_appended: partial line only");
            return Ok(TailChunk {
                offset: start,
                ..Default::default()
            });
        };
        let complete = &buf[..=last_newline];

        let mut chunk = TailChunk {
            offset: start + complete.len() as u64,
            ..Default::default()
        };
        for line in String::from_utf8_lossy(complete).lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(event) => chunk.events.push(event),
                Err(e) => {
                    warn!(error = %e, "Failed to process event");
                    chunk.skipped += 1;
                }
            }
        }

        debug!(
            path = %path.display(),
            events = chunk.events.len(),
            offset = chunk.offset,
            "read_appended: read"
        );
        Ok(chunk)
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
