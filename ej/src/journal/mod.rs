//! Journal ingestion
//!
//! The game writes an append-only, rotating journal (`Journal.*.log`, one JSON
//! record per line) plus a few single-record snapshot files that are rewritten
//! in place. This module turns both into [`Event`] values:
//!
//! - [`event`] - the event model and line parser
//! - [`reader`] - file discovery, full parses with caching, snapshot reads
//! - [`tailer`] - the polling loop that publishes new events on the bus

mod error;
mod event;
mod reader;
mod tailer;

pub use error::{JournalError, MalformedReason};
pub use event::{
    EVENT_FIELD, Event, FieldValue, TIMESTAMP_FIELD, TIMESTAMP_FORMAT, format_timestamp, parse_line, parse_timestamp,
};
pub use reader::{DEFAULT_JOURNAL_PATTERN, FILEHEADER_EVENT, JournalReader, TailChunk, VersionInfo};
pub use tailer::{DEFAULT_POLL_INTERVAL, DEFAULT_SNAPSHOT_FILES, JournalTailer, TailState, TailerConfig};
