//! Transport capability for talking to EventSourcingDB.
//!
//! The adapter does not implement HTTP, authentication or wire serialization itself. It
//! programs against the [`Client`] trait, which exposes exactly the three operations the
//! store offers: a health check, running an EventQL query, and writing events guarded by
//! preconditions. Implementations must be safe for concurrent use by multiple callers.

use std::pin::Pin;

use futures::Stream;

use crate::codec::WireEvent;
use crate::condition::Precondition;

/// Errors raised by a [`Client`] implementation.
///
/// The adapter never reinterprets these; they reach the caller wrapped in
/// [`crate::Error::Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The store could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The store rejected the request (authentication, malformed query, ...).
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// Status code reported by the store.
        status: u16,
        /// Message reported by the store.
        message: String,
    },

    /// The store answered with something the client could not parse.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An I/O error while streaming a response.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rows produced by an EventQL query, pulled lazily as the caller iterates.
pub type RecordStream =
    Pin<Box<dyn Stream<Item = Result<serde_json::Value, TransportError>> + Send>>;

/// Structured result of [`Client::write_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All events were written.
    Written,
    /// At least one precondition evaluated to false; nothing was written.
    PreconditionFailed,
}

/// Connection to an EventSourcingDB instance.
#[async_trait::async_trait]
pub trait Client: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Run an EventQL program and stream its projected rows.
    async fn run_query(&self, program: &str) -> Result<RecordStream, TransportError>;

    /// Write `events` atomically, provided every precondition holds.
    ///
    /// A violated precondition is reported as [`WriteOutcome::PreconditionFailed`], never
    /// as an error.
    async fn write_events(
        &self,
        events: Vec<WireEvent>,
        preconditions: Vec<Precondition>,
    ) -> Result<WriteOutcome, TransportError>;
}
