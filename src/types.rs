//! Core domain types for the DCB event store.
//!
//! This module defines the value objects every other module depends on: events and
//! their tags, 1-based sequence positions, the envelopes produced by reads, the query
//! model (criteria combined with OR, predicates within a criterion combined with AND),
//! read options, and the optimistic-concurrency append condition.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A 1-based, strictly increasing position in the global log.
///
/// The backing store numbers events from 0; the adapter exposes `store_id + 1` so the
/// externally visible sequence starts at 1. The offset is applied by the EventQL
/// projection, so decoded rows already carry positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequencePosition(u64);

impl SequencePosition {
    /// Create a position from its 1-based value. Returns `None` for `0`.
    pub fn new(value: u64) -> Option<SequencePosition> {
        (value > 0).then_some(SequencePosition(value))
    }

    /// The 1-based value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deduplicated, deterministically ordered set of `key:value` labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    /// An empty tag set.
    pub fn new() -> Tags {
        Tags(BTreeSet::new())
    }

    /// Returns `true` if `tag` is part of the set.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set holds no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The tags as a list of strings, as written to the store.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Tags {
        Tags(iter.into_iter().map(Into::into).collect())
    }
}

/// A domain event, before or after it has been recorded.
///
/// `event_type` is the unprefixed domain type name; the store-side namespace prefix is
/// added and removed by the codec. `data` and `metadata` are opaque to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Domain event type (non-empty, unprefixed).
    pub event_type: String,
    /// Opaque payload.
    pub data: Value,
    /// Labels the event can be selected by.
    pub tags: Tags,
    /// Opaque infrastructure context.
    pub metadata: Option<Value>,
}

impl Event {
    /// Create an event with no tags and no metadata.
    pub fn new(event_type: impl Into<String>, data: Value) -> Event {
        Event {
            event_type: event_type.into(),
            data,
            tags: Tags::new(),
            metadata: None,
        }
    }

    /// Replace the tag set.
    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Event {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Event {
        self.metadata = Some(metadata);
        self
    }
}

/// An event read back from the store together with its position and recording time.
///
/// Only the read pipeline constructs these.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    /// Position in the global log.
    pub position: SequencePosition,
    /// Recording time, second precision.
    pub recorded_at: DateTime<Utc>,
    /// The event itself.
    pub event: Event,
}

/// One filter clause of a [`Query`].
///
/// An event matches a criterion if its type is one of `event_types` (when present) and
/// it carries every tag in `tags` (when present). An empty set is treated as absent, so
/// a criterion with neither side matches every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criterion {
    /// Accepted event types.
    pub event_types: Option<BTreeSet<String>>,
    /// Tags that must all be present.
    pub tags: Option<BTreeSet<String>>,
    /// Restrict the result to the highest-positioned match.
    pub only_last_event: bool,
}

impl Criterion {
    /// A criterion matching every event.
    pub fn new() -> Criterion {
        Criterion::default()
    }

    /// Restrict to the given event types. An empty list leaves the criterion unrestricted.
    pub fn with_event_types<S: Into<String>>(
        mut self,
        event_types: impl IntoIterator<Item = S>,
    ) -> Criterion {
        let set: BTreeSet<String> = event_types.into_iter().map(Into::into).collect();
        self.event_types = (!set.is_empty()).then_some(set);
        self
    }

    /// Require the given tags. An empty list leaves the criterion unrestricted.
    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Criterion {
        let set: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.tags = (!set.is_empty()).then_some(set);
        self
    }

    /// Only the highest-positioned matching event is of interest.
    pub fn only_last_event(mut self) -> Criterion {
        self.only_last_event = true;
        self
    }
}

/// A read filter or consistency boundary.
///
/// An event matches the query if it matches any of its criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Matches every event.
    All,
    /// Matches events that match at least one criterion. No criteria behaves like `All`.
    Criteria(Vec<Criterion>),
}

impl Query {
    /// The wildcard query.
    pub fn all() -> Query {
        Query::All
    }

    /// A query made of the given criteria.
    pub fn from_criteria(criteria: impl IntoIterator<Item = Criterion>) -> Query {
        Query::Criteria(criteria.into_iter().collect())
    }

    /// The criteria of this query; empty for the wildcard.
    pub fn criteria(&self) -> &[Criterion] {
        match self {
            Query::All => &[],
            Query::Criteria(criteria) => criteria,
        }
    }

    /// Returns `true` if the query has at least one criterion.
    pub fn has_criteria(&self) -> bool {
        !self.criteria().is_empty()
    }
}

/// Options modifying the order and cardinality of a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Inclusive bound: the first position (forward) or the last position (backwards).
    pub from: Option<SequencePosition>,
    /// Read in descending position order.
    pub backwards: bool,
    /// Maximum number of events to return.
    pub limit: Option<u64>,
}

impl ReadOptions {
    /// Ascending, unbounded, unlimited.
    pub fn new() -> ReadOptions {
        ReadOptions::default()
    }

    /// Start (or, backwards, end) the scan at `position`, inclusively.
    pub fn from(mut self, position: SequencePosition) -> ReadOptions {
        self.from = Some(position);
        self
    }

    /// Read in descending position order.
    pub fn backwards(mut self) -> ReadOptions {
        self.backwards = true;
        self
    }

    /// Return at most `limit` events.
    pub fn limit(mut self, limit: u64) -> ReadOptions {
        self.limit = Some(limit);
        self
    }
}

/// Optimistic-concurrency marker of an [`AppendCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedHighestSequenceNumber {
    /// No check; the append succeeds regardless of the log state.
    Any,
    /// No event may currently match the condition's query.
    None,
    /// The highest position matching the condition's query must be exactly this one.
    Exact(SequencePosition),
}

/// Precondition that must hold, atomically with the write, for an append to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCondition {
    /// The consistency boundary.
    pub query: Query,
    /// What the caller last observed for the boundary.
    pub expected_highest_sequence_number: ExpectedHighestSequenceNumber,
}

impl AppendCondition {
    /// Create a condition over `query`.
    pub fn new(query: Query, expected: ExpectedHighestSequenceNumber) -> AppendCondition {
        AppendCondition {
            query,
            expected_highest_sequence_number: expected,
        }
    }

    /// The unconditional append.
    pub fn any() -> AppendCondition {
        AppendCondition::new(Query::All, ExpectedHighestSequenceNumber::Any)
    }
}
