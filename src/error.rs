//! Error types for the EventSourcingDB-backed DCB event store.
//!
//! This module defines the unified error enum used throughout the crate. All fallible
//! operations return `Result<T, Error>`. Errors are never retried by the adapter: every
//! variant is surfaced to the immediate caller.

use crate::client::TransportError;
use crate::types::SequencePosition;

/// Why a conditional append was rejected by the store.
///
/// The store itself only reports that the precondition evaluated to false. The append
/// coordinator derives the reason from the condition it submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The condition expected no matching events, but at least one exists.
    MatchingEventsExist,
    /// The condition expected the highest matching position to be `expected`, but a
    /// matching event exists after it.
    MatchingEventsExistAfter {
        /// The position the caller last observed for the boundary query.
        expected: SequencePosition,
    },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::MatchingEventsExist => {
                write!(f, "events matching the boundary query already exist")
            }
            ConflictReason::MatchingEventsExistAfter { expected } => write!(
                f,
                "events matching the boundary query exist after expected position {expected}"
            ),
        }
    }
}

/// Unified error type for all adapter operations.
///
/// - `UnsupportedQuery`, `InvalidLiteral` and `InvalidArgument` are detected locally,
///   before any network call.
/// - `Decode` means a record returned by the store does not have the expected shape.
/// - `Conflict` is the discriminated outcome of a failed conditional append.
/// - `Transport` is a passthrough of any other client failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The query uses a feature the EventQL translation cannot express.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// A tag or event type cannot be embedded in an EventQL string literal.
    #[error("invalid literal {literal:?}: {reason}")]
    InvalidLiteral {
        /// The offending literal.
        literal: String,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A request argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A record returned by the store could not be decoded.
    #[error("failed to decode store record: {0}")]
    Decode(String),

    /// The append condition was violated.
    #[error("conditional append failed: {0}")]
    Conflict(ConflictReason),

    /// The store reported a conflict for a write that carried no precondition.
    #[error("store reported a conflict for an unconditional append")]
    UnexpectedConflict,

    /// The transport failed for a reason unrelated to the append condition.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Returns `true` if this error is a failed append condition.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
