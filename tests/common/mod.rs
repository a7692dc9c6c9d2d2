//! In-memory stand-in for EventSourcingDB used by the integration tests.
//!
//! `InMemoryEsdb` implements [`Client`] by interpreting the subset of EventQL the
//! adapter generates: a scan of `events` with an optional WHERE clause built from
//! type/tag membership, position comparisons and AND/OR/NOT, optional descending order,
//! optional TOP, and one of the two projections. Writes evaluate every precondition and
//! insert the batch under one lock, so precondition and write are atomic.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dcb_eventstore_esdb::client::{Client, RecordStream, TransportError, WriteOutcome};
use dcb_eventstore_esdb::codec::WireEvent;
use dcb_eventstore_esdb::condition::Precondition;
use serde_json::{Value, json};

/// Install a `tracing` subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Shared in-memory log.
#[derive(Default)]
pub struct InMemoryEsdb {
    events: Mutex<Vec<WireEvent>>,
    programs: Mutex<Vec<String>>,
    raw_rows: Mutex<Option<Vec<Value>>>,
}

impl InMemoryEsdb {
    pub fn new() -> Arc<InMemoryEsdb> {
        Arc::new(InMemoryEsdb::default())
    }

    /// Every event written so far, in store id order.
    pub fn events(&self) -> Vec<WireEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every program received by `run_query` or carried by a precondition.
    pub fn programs(&self) -> Vec<String> {
        self.programs.lock().unwrap().clone()
    }

    /// Answer the next query with these rows instead of evaluating it.
    pub fn answer_next_query_with(&self, rows: Vec<Value>) {
        *self.raw_rows.lock().unwrap() = Some(rows);
    }

    fn evaluate(&self, events: &[WireEvent], text: &str) -> Result<Vec<Value>, TransportError> {
        self.programs.lock().unwrap().push(text.to_string());
        let program = parse_program(text).map_err(|message| TransportError::Rejected {
            status: 400,
            message,
        })?;

        let mut matching: Vec<(u64, &WireEvent)> = events
            .iter()
            .enumerate()
            .map(|(id, event)| (id as u64, event))
            .filter(|(id, event)| program.filter.as_ref().is_none_or(|f| f.eval(*id, event)))
            .collect();
        if program.descending {
            matching.reverse();
        }
        if let Some(top) = program.top {
            matching.truncate(top as usize);
        }

        Ok(match program.projection {
            ProjectionKind::IsEmpty => vec![Value::Bool(matching.is_empty())],
            ProjectionKind::Envelope => matching
                .into_iter()
                .map(|(id, event)| {
                    json!({
                        "type": event.event_type,
                        "tags": event.data.tags,
                        "data": event.data.payload,
                        "metadata": event.data.metadata,
                        "recorded_at": event.data.recorded_at,
                        "position": id + 1,
                    })
                })
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl Client for InMemoryEsdb {
    async fn ping(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn run_query(&self, program: &str) -> Result<RecordStream, TransportError> {
        let rows = match self.raw_rows.lock().unwrap().take() {
            Some(rows) => rows,
            None => {
                let events = self.events.lock().unwrap().clone();
                self.evaluate(&events, program)?
            }
        };
        let rows: Vec<Result<Value, TransportError>> = rows.into_iter().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(rows)))
    }

    async fn write_events(
        &self,
        events: Vec<WireEvent>,
        preconditions: Vec<Precondition>,
    ) -> Result<WriteOutcome, TransportError> {
        let mut log = self.events.lock().unwrap();
        for precondition in &preconditions {
            if precondition.kind != "isEventQlQueryTrue" {
                return Err(TransportError::Rejected {
                    status: 400,
                    message: format!("unknown precondition {}", precondition.kind),
                });
            }
            let rows = self.evaluate(&log, &precondition.payload.query)?;
            if rows != vec![Value::Bool(true)] {
                return Ok(WriteOutcome::PreconditionFailed);
            }
        }
        log.extend(events);
        Ok(WriteOutcome::Written)
    }
}

// ---------------------------------------------------------------------------
// EventQL subset interpreter
// ---------------------------------------------------------------------------

enum ProjectionKind {
    Envelope,
    IsEmpty,
}

struct ParsedProgram {
    filter: Option<Expr>,
    descending: bool,
    top: Option<u64>,
    projection: ProjectionKind,
}

enum Expr {
    Bool(bool),
    TypeIn(Vec<String>),
    HasTag(String),
    Position(String, u64),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    fn eval(&self, id: u64, event: &WireEvent) -> bool {
        let position = id + 1;
        match self {
            Expr::Bool(b) => *b,
            Expr::TypeIn(types) => types.contains(&event.event_type),
            Expr::HasTag(tag) => event.data.tags.contains(tag),
            Expr::Position(op, v) => match op.as_str() {
                ">" => position > *v,
                ">=" => position >= *v,
                "<=" => position <= *v,
                "<" => position < *v,
                _ => position == *v,
            },
            Expr::And(a, b) => a.eval(id, event) && b.eval(id, event),
            Expr::Or(a, b) => a.eval(id, event) || b.eval(id, event),
            Expr::Not(a) => !a.eval(id, event),
        }
    }
}

const ENVELOPE: &str = "{ type: e.type, tags: e.data.tags, data: e.data.payload, \
                        metadata: e.data.metadata, recorded_at: e.data.recorded_at, \
                        position: (e.id AS INT + 1) }";

fn parse_program(text: &str) -> Result<ParsedProgram, String> {
    let rest = text
        .strip_prefix("FROM e IN events")
        .ok_or_else(|| format!("unsupported source in {text:?}"))?;
    let (head, projection) = rest
        .rsplit_once(" PROJECT INTO ")
        .ok_or_else(|| "missing projection".to_string())?;
    let projection = match projection {
        "COUNT() == 0" => ProjectionKind::IsEmpty,
        p if p == ENVELOPE => ProjectionKind::Envelope,
        other => return Err(format!("unsupported projection {other:?}")),
    };

    let mut head = head.trim();
    let mut top = None;
    if let Some((before, n)) = head.rsplit_once(" TOP ") {
        if let Ok(n) = n.parse::<u64>() {
            top = Some(n);
            head = before.trim();
        }
    } else if let Some(n) = head.strip_prefix("TOP ") {
        top = Some(n.parse::<u64>().map_err(|e| e.to_string())?);
        head = "";
    }

    let mut descending = false;
    if let Some(before) = head.strip_suffix("ORDER BY e.id AS INT DESC") {
        descending = true;
        head = before.trim();
    }

    let filter = match head.strip_prefix("WHERE ") {
        Some(clause) => {
            let tokens = tokenize(clause)?;
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.or_expr()?;
            if parser.pos != parser.tokens.len() {
                return Err(format!("trailing tokens in {clause:?}"));
            }
            Some(expr)
        }
        None if head.is_empty() => None,
        None => return Err(format!("unsupported clause {head:?}")),
    };

    Ok(ParsedProgram {
        filter,
        descending,
        top,
        projection,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    OpenBracket,
    CloseBracket,
    Comma,
    Plus,
    Op(String),
    Str(String),
    Num(u64),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '[' => {
                tokens.push(Token::OpenBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::CloseBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '<' | '>' | '=' => {
                let mut op = c.to_string();
                if chars.get(i + 1) == Some(&'=') {
                    op.push('=');
                    i += 1;
                }
                tokens.push(Token::Op(op));
                i += 1;
            }
            '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '"')
                    .ok_or_else(|| "unterminated string".to_string())?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            d if d.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let n: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(n.parse().map_err(|e| format!("{e}"))?));
            }
            w if w.is_alphabetic() => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '.' || chars[i] == '_')
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {token:?}"))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), String> {
        self.expect(Token::Word(word.to_string()))
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Word("OR".into())) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::Word("AND".into())) {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Word("NOT".into())) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next()? {
            Token::Open if self.peek() == Some(&Token::Word("e.id".into())) => {
                self.expect_word("e.id")?;
                self.expect_word("AS")?;
                self.expect_word("INT")?;
                self.expect(Token::Plus)?;
                self.expect(Token::Num(1))?;
                self.expect(Token::Close)?;
                let op = match self.next()? {
                    Token::Op(op) => op,
                    other => return Err(format!("expected comparison, found {other:?}")),
                };
                match self.next()? {
                    Token::Num(n) => Ok(Expr::Position(op, n)),
                    other => Err(format!("expected number, found {other:?}")),
                }
            }
            Token::Open => {
                let inner = self.or_expr()?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            Token::OpenBracket => {
                let mut types = Vec::new();
                loop {
                    match self.next()? {
                        Token::Str(s) => types.push(s),
                        other => return Err(format!("expected string, found {other:?}")),
                    }
                    match self.next()? {
                        Token::Comma => continue,
                        Token::CloseBracket => break,
                        other => return Err(format!("expected , or ], found {other:?}")),
                    }
                }
                self.expect_word("CONTAINS")?;
                self.expect_word("e.type")?;
                Ok(Expr::TypeIn(types))
            }
            Token::Word(w) if w == "e.data.tags" => {
                self.expect_word("CONTAINS")?;
                match self.next()? {
                    Token::Str(tag) => Ok(Expr::HasTag(tag)),
                    other => Err(format!("expected string, found {other:?}")),
                }
            }
            Token::Word(w) if w == "true" => Ok(Expr::Bool(true)),
            Token::Word(w) if w == "false" => Ok(Expr::Bool(false)),
            other => Err(format!("unexpected token {other:?} at {}", self.pos)),
        }
    }
}
