//! Journal event model
//!
//! An [`Event`] is one parsed journal record: the timestamp, the event type
//! name, the full ordered field map and the raw line it was parsed from.
//! Events are immutable once constructed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{JournalError, MalformedReason};

/// Journal timestamp format: second precision with an explicit UTC marker
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Field holding the record timestamp
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field holding the event type name
pub const EVENT_FIELD: &str = "event";

/// Parse a journal timestamp (`2018-06-07T08:09:10Z`)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Format a timestamp the way the journal writes it
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Result of a default-if-absent field lookup
///
/// `NoOp` means the record does not carry the field at all, so whatever state
/// the field feeds must be left untouched. A present field whose value is
/// `null` is `Present(Value::Null)`, which is an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    NoOp,
    Present { key: &'a str, value: &'a Value },
}

impl<'a> FieldValue<'a> {
    /// True if the field was absent
    pub fn is_noop(&self) -> bool {
        matches!(self, FieldValue::NoOp)
    }

    /// The present value, if any
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            FieldValue::NoOp => None,
            FieldValue::Present { value, .. } => Some(value),
        }
    }
}

/// One parsed journal record
///
/// Deserializing re-parses the raw line and rejects a record whose other
/// fields disagree with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    timestamp: DateTime<Utc>,
    name: String,
    fields: Map<String, Value>,
    raw: String,
}

#[derive(Deserialize)]
struct EventRecord {
    timestamp: DateTime<Utc>,
    name: String,
    fields: Map<String, Value>,
    raw: String,
}

impl TryFrom<EventRecord> for Event {
    type Error = JournalError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let event = parse_line(&record.raw)?;
        if event.timestamp != record.timestamp || event.name != record.name || event.fields != record.fields {
            return Err(JournalError::MalformedEvent {
                reason: MalformedReason::Inconsistent,
                line: record.raw,
            });
        }
        Ok(event)
    }
}

impl Event {
    /// Build an event from a field map, synthesising the raw line
    ///
    /// The `timestamp` and `event` fields are written into the map so the
    /// result is indistinguishable from a parsed record.
    pub fn new(timestamp: DateTime<Utc>, name: impl Into<String>, fields: Map<String, Value>) -> Self {
        let name = name.into();
        let mut record = Map::new();
        record.insert(TIMESTAMP_FIELD.to_string(), Value::String(format_timestamp(&timestamp)));
        record.insert(EVENT_FIELD.to_string(), Value::String(name.clone()));
        for (key, value) in fields {
            if key != TIMESTAMP_FIELD && key != EVENT_FIELD {
                record.insert(key, value);
            }
        }
        let raw = Value::Object(record.clone()).to_string();
        Self {
            timestamp,
            name,
            fields: record,
            raw,
        }
    }

    /// Record timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event type name (the `event` field)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every field of the record, in file order
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The line this event was parsed from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a field, falling back to `default` when absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.fields.get(key).unwrap_or(default)
    }

    /// Look up a field, yielding [`FieldValue::NoOp`] when absent
    pub fn get_or_noop<'a>(&'a self, key: &'a str) -> FieldValue<'a> {
        match self.fields.get(key) {
            Some(value) => FieldValue::Present { key, value },
            None => FieldValue::NoOp,
        }
    }
}

/// Parse one journal line into an [`Event`]
///
/// A trailing line terminator is not part of the record and is dropped from
/// `raw`; everything else is kept byte for byte.
pub fn parse_line(line: &str) -> Result<Event, JournalError> {
    let raw = line.trim_end_matches(['\n', '\r']);
    let malformed = |reason| JournalError::MalformedEvent {
        reason,
        line: raw.to_string(),
    };

    let value: Value =
        serde_json::from_str(raw).map_err(|e| malformed(MalformedReason::InvalidJson(e.to_string())))?;
    let Value::Object(fields) = value else {
        return Err(malformed(MalformedReason::NotAnObject));
    };

    let timestamp = fields
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(MalformedReason::MissingTimestamp))?;
    let timestamp =
        parse_timestamp(timestamp).map_err(|e| malformed(MalformedReason::InvalidTimestamp(e.to_string())))?;

    let name = fields
        .get(EVENT_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(MalformedReason::MissingEventType))?
        .to_string();

    debug!(event = %name, "parse_line: parsed");
    Ok(Event {
        timestamp,
        name,
        fields,
        raw: raw.to_string(),
    })
}
