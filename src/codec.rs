//! JSON codec between domain events and EventSourcingDB records.
//!
//! Writing turns an [`Event`] into a [`WireEvent`]: the domain type is namespaced with
//! the configured prefix, and payload, tags, recording time and metadata are nested in
//! the record's `data` object. Reading turns a row produced by the envelope projection
//! (see [`crate::eventql::Projection::Envelope`]) back into a [`SequencedEvent`].
//! The module does no I/O.
//!
//! The recording time is stored as `YYYY-MM-DD HH:MM:SS` in UTC without an offset, so
//! it only round-trips to the second. Existing stores hold timestamps in this shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::Error;
use crate::types::{Event, SequencePosition, SequencedEvent, Tags};

/// `chrono` format of the `recorded_at` field.
pub const RECORDED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Subject every event is written to. Consistency boundaries are expressed with tags,
/// so the store's subject hierarchy is not used.
pub const EVENT_SUBJECT: &str = "/";

/// An event as submitted to the store's write endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event source URI.
    pub source: String,
    /// Always [`EVENT_SUBJECT`].
    pub subject: String,
    /// Prefixed event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload envelope.
    pub data: WireEventData,
}

/// The `data` object of a [`WireEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEventData {
    /// The domain event's payload.
    pub payload: Value,
    /// The domain event's tags.
    pub tags: Vec<String>,
    /// Recording time in [`RECORDED_AT_FORMAT`].
    pub recorded_at: String,
    /// The domain event's metadata, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Row shape produced by the envelope projection.
#[derive(Debug, Deserialize)]
struct ProjectedRecord {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    data: Value,
    // Older store schemas carry no metadata at all.
    #[serde(default)]
    metadata: Option<Value>,
    recorded_at: String,
    #[serde(default)]
    position: Option<Value>,
}

/// Encode a domain event into a store record.
///
/// # Arguments
///
/// * `event` - The event to write.
/// * `event_source` - Value of the record's `source` field.
/// * `type_prefix` - Namespace prepended to the event type.
/// * `clock` - Time source for `recorded_at`.
pub fn encode(event: &Event, event_source: &str, type_prefix: &str, clock: &dyn Clock) -> WireEvent {
    WireEvent {
        source: event_source.to_string(),
        subject: EVENT_SUBJECT.to_string(),
        event_type: format!("{type_prefix}{}", event.event_type),
        data: WireEventData {
            payload: event.data.clone(),
            tags: event.tags.to_strings(),
            recorded_at: format_recorded_at(clock.now()),
            metadata: event.metadata.clone(),
        },
    }
}

/// Decode a row produced by the envelope projection.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the row is not an object of the expected shape, if
/// `position` is missing, non-numeric or zero, if `recorded_at` does not match
/// [`RECORDED_AT_FORMAT`].
pub fn decode(record: Value, type_prefix: &str) -> Result<SequencedEvent, Error> {
    let record: ProjectedRecord = serde_json::from_value(record)
        .map_err(|e| Error::Decode(format!("unexpected record shape: {e}")))?;

    let position = parse_position(record.position.as_ref())?;
    let recorded_at = parse_recorded_at(&record.recorded_at)?;

    let event_type = strip_type_prefix(&record.event_type, type_prefix).to_string();

    Ok(SequencedEvent {
        position,
        recorded_at,
        event: Event {
            event_type,
            data: record.data,
            tags: record.tags.unwrap_or_default().into_iter().collect::<Tags>(),
            metadata: record.metadata.filter(|m| !m.is_null()),
        },
    })
}

/// Format a timestamp the way the store keeps it.
pub fn format_recorded_at(at: DateTime<Utc>) -> String {
    at.format(RECORDED_AT_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_recorded_at`].
pub fn parse_recorded_at(raw: &str) -> Result<DateTime<Utc>, Error> {
    NaiveDateTime::parse_from_str(raw, RECORDED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Decode(format!("invalid recorded_at {raw:?}: {e}")))
}

/// Drop the first `type_prefix.len()` bytes of a stored type.
///
/// The prefix is removed by length without comparing it, so rows written under another
/// namespace still decode. A type too short to hold the prefix, or one whose cut would
/// split a character, decodes to an empty type.
fn strip_type_prefix<'a>(stored: &'a str, type_prefix: &str) -> &'a str {
    stored.get(type_prefix.len()..).unwrap_or_default()
}

fn parse_position(raw: Option<&Value>) -> Result<SequencePosition, Error> {
    let value = match raw {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Decode(format!("position is not numeric: {raw:?}")))?;

    SequencePosition::new(value)
        .ok_or_else(|| Error::Decode("position must be at least 1".to_string()))
}
