//! A Dynamic Consistency Boundary (DCB) event store backed by EventSourcingDB.
//!
//! Queries and append conditions are compiled into EventQL programs; conditions are
//! evaluated by the store atomically with the write they guard.

pub mod client;
pub mod clock;
pub mod codec;
pub mod condition;
pub mod error;
pub mod eventql;
pub mod reader;
pub mod store;
pub mod types;
pub mod writer;

pub use client::{Client, RecordStream, TransportError, WriteOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConflictReason, Error};
pub use reader::EventStream;
pub use store::{EsdbEventStore, EventStore, StoreConfig};
pub use types::{
    AppendCondition, Criterion, Event, ExpectedHighestSequenceNumber, Query, ReadOptions,
    SequencePosition, SequencedEvent, Tags,
};
