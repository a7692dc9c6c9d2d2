//! Compilation of append conditions into store-evaluated preconditions.
//!
//! EventSourcingDB can evaluate an EventQL program atomically with a write and reject
//! the write when the program yields `false`. An [`AppendCondition`] becomes such a
//! program: it counts the events matching the boundary query (restricted to positions
//! after the expected one, if any) and asserts that the count is zero.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::eventql::{Comparison, Predicate, Program, Projection, compile_query};
use crate::types::{AppendCondition, ExpectedHighestSequenceNumber};

/// Precondition type understood by the store's write endpoint.
pub const IS_EVENTQL_QUERY_TRUE: &str = "isEventQlQueryTrue";

/// A precondition submitted alongside a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    /// Always [`IS_EVENTQL_QUERY_TRUE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The program to evaluate.
    pub payload: PreconditionPayload,
}

/// Payload of a [`Precondition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionPayload {
    /// EventQL program yielding a single boolean.
    pub query: String,
}

impl Precondition {
    /// Wrap an EventQL program that yields a single boolean.
    pub fn is_eventql_query_true(query: String) -> Precondition {
        Precondition {
            kind: IS_EVENTQL_QUERY_TRUE.to_string(),
            payload: PreconditionPayload { query },
        }
    }
}

/// Compile `condition` into the precondition guarding a write.
///
/// Returns `None` for [`ExpectedHighestSequenceNumber::Any`]. The "only last event"
/// flag of the condition's query has no effect on the count, but a query combining it
/// with several criteria is still rejected.
///
/// # Errors
///
/// Returns [`Error::UnsupportedQuery`] or [`Error::InvalidLiteral`] from the query
/// compiler.
pub fn compile_condition(
    condition: &AppendCondition,
    type_prefix: &str,
) -> Result<Option<Precondition>, Error> {
    let after = match condition.expected_highest_sequence_number {
        ExpectedHighestSequenceNumber::Any => return Ok(None),
        ExpectedHighestSequenceNumber::None => None,
        ExpectedHighestSequenceNumber::Exact(position) => Some(position),
    };

    let compiled = compile_query(&condition.query, type_prefix)?;

    let mut program = Program::new(Projection::IsEmpty);
    if let Some(predicate) = compiled.predicate {
        program = program.filter(predicate);
    }
    if let Some(position) = after {
        program = program.filter(Predicate::Position(
            Comparison::GreaterThan,
            position.value(),
        ));
    }

    Ok(Some(Precondition::is_eventql_query_true(program.render()?)))
}
