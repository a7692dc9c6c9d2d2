//! Append coordinator.
//!
//! Encodes a batch of events and its append condition, issues a single write, and turns
//! the store's undifferentiated "precondition failed" answer into a [`ConflictReason`]
//! derived from the condition that was submitted.

use metrics::counter;

use crate::client::{Client, WriteOutcome};
use crate::clock::Clock;
use crate::codec::{self, WireEvent};
use crate::condition::compile_condition;
use crate::error::{ConflictReason, Error};
use crate::types::{AppendCondition, Event, ExpectedHighestSequenceNumber};

/// Append `events` under `condition`.
///
/// Events are encoded in input order, each stamped with its own clock reading; the
/// store assigns positions in that order. Nothing is retried.
///
/// # Arguments
///
/// * `client` - Connection to the store.
/// * `clock` - Time source for `recorded_at`.
/// * `event_source` - Value of each record's `source` field.
/// * `type_prefix` - Namespace prepended to event types.
/// * `events` - Events to append (non-empty).
/// * `condition` - Optimistic-concurrency condition.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `events` is empty or an event has an empty type.
/// - [`Error::UnsupportedQuery`] / [`Error::InvalidLiteral`] from the condition compiler.
/// - [`Error::Conflict`] if the condition does not hold.
/// - [`Error::UnexpectedConflict`] if the store reports a conflict for an unconditional
///   append.
/// - [`Error::Transport`] for any other client failure.
pub async fn append_events(
    client: &dyn Client,
    clock: &dyn Clock,
    event_source: &str,
    type_prefix: &str,
    events: &[Event],
    condition: &AppendCondition,
) -> Result<(), Error> {
    if events.is_empty() {
        return Err(Error::InvalidArgument("events must not be empty".into()));
    }
    if let Some(index) = events.iter().position(|e| e.event_type.is_empty()) {
        return Err(Error::InvalidArgument(format!(
            "event at index {index} has an empty type"
        )));
    }

    let precondition = compile_condition(condition, type_prefix)?;
    let wire_events: Vec<WireEvent> = events
        .iter()
        .map(|event| codec::encode(event, event_source, type_prefix, clock))
        .collect();

    tracing::debug!(
        events = wire_events.len(),
        precondition = precondition.as_ref().map(|p| p.payload.query.as_str()),
        "Writing events"
    );
    counter!("dcb_esdb_appends_total").increment(1);

    match client
        .write_events(wire_events, precondition.into_iter().collect())
        .await?
    {
        WriteOutcome::Written => Ok(()),
        WriteOutcome::PreconditionFailed => Err(classify_conflict(
            condition.expected_highest_sequence_number,
        )),
    }
}

/// Derive the caller-facing error for a failed precondition.
pub fn classify_conflict(expected: ExpectedHighestSequenceNumber) -> Error {
    let reason = match expected {
        ExpectedHighestSequenceNumber::None => ConflictReason::MatchingEventsExist,
        ExpectedHighestSequenceNumber::Exact(expected) => {
            ConflictReason::MatchingEventsExistAfter { expected }
        }
        ExpectedHighestSequenceNumber::Any => {
            tracing::error!("Store rejected a write that carried no precondition");
            counter!("dcb_esdb_append_conflicts_total", "reason" => "unexpected").increment(1);
            return Error::UnexpectedConflict;
        }
    };

    let label = match reason {
        ConflictReason::MatchingEventsExist => "matching_events_exist",
        ConflictReason::MatchingEventsExistAfter { .. } => "matching_events_exist_after",
    };
    tracing::warn!(reason = %reason, "Conditional append rejected");
    counter!("dcb_esdb_append_conflicts_total", "reason" => label).increment(1);
    Error::Conflict(reason)
}
