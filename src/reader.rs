//! Read pipeline: EventQL read programs and the lazy stream of decoded events.
//!
//! `read_program` turns a query and read options into the program text sent to the
//! store. `EventStream` wraps the store's row stream and decodes each row through the
//! codec as the caller pulls it, so a malformed row surfaces at the point it is reached
//! rather than when the read is issued.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::client::RecordStream;
use crate::codec;
use crate::error::Error;
use crate::eventql::{Comparison, Predicate, Program, Projection, compile_query};
use crate::types::{Query, ReadOptions, SequencedEvent};

/// Build the EventQL program for `read(query, options)`.
///
/// - The query predicate and the optional `from` bound (`>=` forward, `<=` backwards)
///   are combined with AND.
/// - Ordering is descending when reading backwards or when only the last event was
///   requested.
/// - Only-last-event limits the result to one row; otherwise `options.limit` applies.
///
/// # Errors
///
/// Returns [`Error::UnsupportedQuery`] or [`Error::InvalidLiteral`] from the query
/// compiler.
pub fn read_program(
    query: &Query,
    options: &ReadOptions,
    type_prefix: &str,
) -> Result<String, Error> {
    let compiled = compile_query(query, type_prefix)?;

    let mut program = Program::new(Projection::Envelope);
    if let Some(predicate) = compiled.predicate {
        program = program.filter(predicate);
    }
    if let Some(from) = options.from {
        let comparison = if options.backwards {
            Comparison::AtMost
        } else {
            Comparison::AtLeast
        };
        program = program.filter(Predicate::Position(comparison, from.value()));
    }
    if options.backwards || compiled.only_last_event {
        program = program.descending();
    }
    if compiled.only_last_event {
        program = program.top(1);
    } else if let Some(limit) = options.limit {
        program = program.top(limit);
    }

    program.render()
}

/// Finite, forward-only sequence of events returned by a read.
///
/// Rows are pulled from the store only as the stream is polled. The stream cannot be
/// rewound; reading again requires a new read.
pub struct EventStream {
    rows: RecordStream,
    type_prefix: String,
}

impl EventStream {
    /// Wrap a row stream produced by the envelope projection.
    pub fn new(rows: RecordStream, type_prefix: impl Into<String>) -> EventStream {
        EventStream {
            rows,
            type_prefix: type_prefix.into(),
        }
    }

    /// Pull the first event and drop the rest of the underlying stream.
    ///
    /// Returns `Ok(None)` if the read matched nothing.
    pub async fn first(mut self) -> Result<Option<SequencedEvent>, Error> {
        self.next().await.transpose()
    }

    /// Drain the stream into a `Vec`, stopping at the first error.
    pub async fn try_collect_all(mut self) -> Result<Vec<SequencedEvent>, Error> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}

impl Stream for EventStream {
    type Item = Result<SequencedEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        this.rows.as_mut().poll_next(cx).map(|row| {
            row.map(|row| {
                row.map_err(Error::from)
                    .and_then(|record| codec::decode(record, &this.type_prefix))
            })
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("type_prefix", &self.type_prefix)
            .finish_non_exhaustive()
    }
}
