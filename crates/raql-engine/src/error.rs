use serde::Serialize;
use thiserror::Error;

use raql_parser::{ParseError, Span};

use crate::trace::Trace;

/// Everything that can go wrong while evaluating a well-formed AST.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum EvalErrorKind {
    #[error("unknown relation `{name}`; available relations: {}", .available.join(", "))]
    UnknownRelation { name: String, available: Vec<String> },

    #[error("attribute `{name}` is not in the schema [{}]", .schema.join(", "))]
    MissingAttribute { name: String, schema: Vec<String> },

    #[error("rename target `{name}` already exists in the schema")]
    RenameCollision { name: String },

    #[error("operation would produce a duplicate attribute `{name}`")]
    SchemaCollision { name: String },

    #[error("union requires identical schemas: [{}] vs [{}]", .left.join(", "), .right.join(", "))]
    UnionIncompatible { left: Vec<String>, right: Vec<String> },

    #[error("difference requires identical schemas: [{}] vs [{}]", .left.join(", "), .right.join(", "))]
    DifferenceIncompatible { left: Vec<String>, right: Vec<String> },

    #[error("intersection requires identical schemas: [{}] vs [{}]", .left.join(", "), .right.join(", "))]
    IntersectionIncompatible { left: Vec<String>, right: Vec<String> },

    #[error(
        "division requires the divisor schema [{}] to be a subset of the dividend schema [{}]",
        .divisor.join(", "),
        .dividend.join(", ")
    )]
    DivisionIncompatible { divisor: Vec<String>, dividend: Vec<String> },

    #[error("division requires the divisor to exclude at least one dividend attribute")]
    DivisionEmptyQuotient,

    #[error("attribute reference `{name}` is ambiguous")]
    AmbiguousAttribute { name: String },

    #[error("invalid predicate `{cond}`: {inner}")]
    Predicate {
        cond: String,
        inner: Box<PredicateErrorCause>,
    },
}

/// What went wrong inside a σ or θ-join predicate.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum PredicateErrorCause {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(Box<EvalErrorKind>),
}

impl EvalErrorKind {
    /// Wrap a predicate-internal failure, attributing it to the σ/⋈ node.
    pub(crate) fn predicate(cond: &str, cause: PredicateErrorCause) -> EvalErrorKind {
        EvalErrorKind::Predicate {
            cond: cond.to_string(),
            inner: Box::new(cause),
        }
    }
}

/// An evaluation failure, carrying whatever trace was accumulated before the
/// failing node.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Option<Span>,
    pub trace: Trace,
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        EvalError {
            kind,
            span: None,
            trace: Trace::default(),
        }
    }
}

impl EvalError {
    pub fn with_span_fallback(mut self, span: Option<Span>) -> Self {
        self.span = self.span.or(span);
        self
    }

    pub(crate) fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }
}

pub trait WithSpanFallback: Sized {
    fn with_span_fallback(self, span: Option<Span>) -> Self;
}

impl<T> WithSpanFallback for Result<T, EvalError> {
    fn with_span_fallback(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span_fallback(span))
    }
}

/// Either failure mode of [crate::run].
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
