//! Query compiler and EventQL program renderer.
//!
//! A [`Query`] is first compiled into a small predicate tree ([`Predicate`]) together
//! with the structural directives it implies ([`CompiledQuery`]). A [`Program`] then
//! assembles predicates, ordering, cardinality and a projection, and renders EventQL
//! text. Rendering is the only place where strings are interpolated into the query
//! language; every string literal is validated there, so a tag or type can never
//! terminate its quoted literal early.
//!
//! The translation is syntax-directed and deterministic: the same query always renders
//! to the same program text.

use crate::error::Error;
use crate::types::{Criterion, Query};

/// EventQL expression for the 1-based position of the scanned event `e`.
pub const POSITION_EXPR: &str = "(e.id AS INT + 1)";

/// Message of the error raised for "only last event" combined with several criteria.
pub const ONLY_LAST_EVENT_UNSUPPORTED: &str =
    "the \"only last event\" flag is supported only for queries that contain a single criterion";

/// Comparison operator for position bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `>`
    GreaterThan,
    /// `>=`
    AtLeast,
    /// `<=`
    AtMost,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::AtLeast => ">=",
            Comparison::AtMost => "<=",
        }
    }
}

/// Boolean expression over the scanned event `e`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Always true.
    True,
    /// The event's (prefixed) type is one of the listed types.
    TypeIn(Vec<String>),
    /// The event carries the tag.
    HasTag(String),
    /// The event's 1-based position compared to a constant.
    Position(Comparison, u64),
    /// All operands hold. Empty means true.
    And(Vec<Predicate>),
    /// At least one operand holds. Empty means false.
    Or(Vec<Predicate>),
    /// The operand does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction of `predicates`, collapsing the trivial cases.
    pub fn all_of(mut predicates: Vec<Predicate>) -> Predicate {
        match predicates.len() {
            0 => Predicate::True,
            1 => predicates.remove(0),
            _ => Predicate::And(predicates),
        }
    }

    /// Disjunction of `predicates`, collapsing the single-operand case.
    pub fn any_of(mut predicates: Vec<Predicate>) -> Predicate {
        match predicates.len() {
            1 => predicates.remove(0),
            _ => Predicate::Or(predicates),
        }
    }

    /// Render as EventQL text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLiteral`] if a type or tag cannot be embedded in a
    /// string literal.
    pub fn render(&self) -> Result<String, Error> {
        let mut out = String::new();
        self.write(&mut out)?;
        Ok(out)
    }

    fn write(&self, out: &mut String) -> Result<(), Error> {
        match self {
            Predicate::True => out.push_str("true"),
            Predicate::TypeIn(types) => {
                out.push('[');
                for (i, event_type) in types.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_literal(out, event_type)?;
                }
                out.push_str("] CONTAINS e.type");
            }
            Predicate::HasTag(tag) => {
                out.push_str("e.data.tags CONTAINS ");
                write_literal(out, tag)?;
            }
            Predicate::Position(comparison, value) => {
                out.push_str(&format!(
                    "{POSITION_EXPR} {} {value}",
                    comparison.operator()
                ));
            }
            Predicate::And(operands) => write_joined(out, operands, " AND ", "true")?,
            Predicate::Or(operands) => write_joined(out, operands, " OR ", "false")?,
            Predicate::Not(operand) => {
                out.push_str("NOT (");
                operand.write(out)?;
                out.push(')');
            }
        }
        Ok(())
    }
}

fn write_joined(
    out: &mut String,
    operands: &[Predicate],
    separator: &str,
    identity: &str,
) -> Result<(), Error> {
    match operands {
        [] => out.push_str(identity),
        [single] => single.write(out)?,
        _ => {
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    out.push_str(separator);
                }
                out.push('(');
                operand.write(out)?;
                out.push(')');
            }
        }
    }
    Ok(())
}

/// Append `literal` as a double-quoted EventQL string.
///
/// Double quotes, backslashes and control characters are rejected rather than escaped.
fn write_literal(out: &mut String, literal: &str) -> Result<(), Error> {
    if let Some(c) = literal
        .chars()
        .find(|c| *c == '"' || *c == '\\' || c.is_control())
    {
        return Err(Error::InvalidLiteral {
            literal: literal.to_string(),
            reason: format!("contains forbidden character {c:?}"),
        });
    }
    out.push('"');
    out.push_str(literal);
    out.push('"');
    Ok(())
}

/// Result of compiling a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Filter to apply; `None` means the query matches every event.
    pub predicate: Option<Predicate>,
    /// Only the highest-positioned match was requested.
    pub only_last_event: bool,
}

/// Compile `query` into a predicate over prefixed event types.
///
/// Criteria are combined with OR; within a criterion, the type restriction and each
/// required tag are combined with AND.
///
/// # Errors
///
/// Returns [`Error::UnsupportedQuery`] if any criterion requests only the last event
/// while the query has more than one criterion.
pub fn compile_query(query: &Query, type_prefix: &str) -> Result<CompiledQuery, Error> {
    let criteria = query.criteria();
    if criteria.is_empty() {
        return Ok(CompiledQuery {
            predicate: None,
            only_last_event: false,
        });
    }

    let only_last_event = criteria.iter().any(|c| c.only_last_event);
    if only_last_event && criteria.len() > 1 {
        return Err(Error::UnsupportedQuery(ONLY_LAST_EVENT_UNSUPPORTED.to_string()));
    }

    let alternatives = criteria
        .iter()
        .map(|criterion| compile_criterion(criterion, type_prefix))
        .collect();

    Ok(CompiledQuery {
        predicate: Some(Predicate::any_of(alternatives)),
        only_last_event,
    })
}

fn compile_criterion(criterion: &Criterion, type_prefix: &str) -> Predicate {
    let mut conjuncts = Vec::new();
    if let Some(types) = criterion.event_types.as_ref().filter(|t| !t.is_empty()) {
        conjuncts.push(Predicate::TypeIn(
            types.iter().map(|t| format!("{type_prefix}{t}")).collect(),
        ));
    }
    if let Some(tags) = criterion.tags.as_ref() {
        conjuncts.extend(tags.iter().cloned().map(Predicate::HasTag));
    }
    Predicate::all_of(conjuncts)
}

/// What a [`Program`] returns per matching event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// One row per event, in the shape [`crate::codec::decode`] consumes.
    Envelope,
    /// A single boolean: no event matched.
    IsEmpty,
}

impl Projection {
    fn as_str(self) -> &'static str {
        match self {
            Projection::Envelope => {
                "{ type: e.type, tags: e.data.tags, data: e.data.payload, \
                 metadata: e.data.metadata, recorded_at: e.data.recorded_at, \
                 position: (e.id AS INT + 1) }"
            }
            Projection::IsEmpty => "COUNT() == 0",
        }
    }
}

/// An EventQL program over the `events` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    filters: Vec<Predicate>,
    descending: bool,
    top: Option<u64>,
    projection: Projection,
}

impl Program {
    /// An ascending, unfiltered, unlimited scan.
    pub fn new(projection: Projection) -> Program {
        Program {
            filters: Vec::new(),
            descending: false,
            top: None,
            projection,
        }
    }

    /// Add a filter; all filters must hold.
    pub fn filter(mut self, predicate: Predicate) -> Program {
        self.filters.push(predicate);
        self
    }

    /// Scan in descending position order.
    pub fn descending(mut self) -> Program {
        self.descending = true;
        self
    }

    /// Return at most `n` rows.
    pub fn top(mut self, n: u64) -> Program {
        self.top = Some(n);
        self
    }

    /// Render as EventQL text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLiteral`] if a filter contains an invalid literal.
    pub fn render(&self) -> Result<String, Error> {
        let mut out = String::from("FROM e IN events");
        if !self.filters.is_empty() {
            out.push_str(" WHERE ");
            for (i, filter) in self.filters.iter().enumerate() {
                if i > 0 {
                    out.push_str(" AND ");
                }
                out.push('(');
                filter.write(&mut out)?;
                out.push(')');
            }
        }
        if self.descending {
            out.push_str(" ORDER BY e.id AS INT DESC");
        }
        if let Some(n) = self.top {
            out.push_str(&format!(" TOP {n}"));
        }
        out.push_str(" PROJECT INTO ");
        out.push_str(self.projection.as_str());
        Ok(out)
    }
}
