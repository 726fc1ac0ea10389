use std::fmt::{self, Debug, Display, Formatter};

use chumsky::error::{Cheap, SimpleReason};
use itertools::Itertools;
use serde::Serialize;

use crate::parser::PError;
use crate::span::Span;

/// A syntax error, positioned at the first offending character.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseError {
    pub message: String,
    /// 1-based line of the offending character.
    pub line: usize,
    /// 1-based column (in characters) within that line.
    pub column: usize,
    /// The offending source line with a caret marker underneath.
    pub context: String,
    pub span: Option<Span>,
}

impl ParseError {
    pub fn new<S: ToString>(source: &str, message: S, offset: usize) -> Self {
        let (line, column, line_text) = line_col(source, offset);
        let context = format!("{line_text}\n{:>column$}", "^");
        ParseError {
            message: message.to_string(),
            line,
            column,
            context,
            span: Some(Span {
                start: offset,
                end: offset + 1,
            }),
        }
    }

    pub(crate) fn from_lexer(source: &str, errors: Vec<Cheap<char>>) -> Self {
        let offset = errors.first().map(|e| e.span().start).unwrap_or_default();
        let message = if offset >= source.chars().count() {
            "unexpected end of input"
        } else {
            "unexpected character"
        };
        ParseError::new(source, message, offset)
    }

    pub(crate) fn from_parser(source: &str, errors: Vec<PError>) -> Self {
        let Some(error) = errors.into_iter().next() else {
            return ParseError::new(source, "unrecognized expression", 0);
        };
        let offset = error.span().start;

        if let SimpleReason::Custom(message) = error.reason() {
            return ParseError::new(source, message, offset);
        }

        let expected = error
            .expected()
            .filter_map(|t| t.as_ref().map(|t| t.to_string()))
            .sorted()
            .collect_vec();
        let found = error
            .found()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "end of input".to_string());

        let message = if expected.is_empty() {
            format!("unexpected {found}")
        } else {
            format!("expected {}, but found {found}", expected.join(", "))
        };
        ParseError::new(source, message, offset)
    }

    /// Errors from the predicate sub-language, positioned within the
    /// condition text itself.
    pub(crate) fn from_cond(cond: &str, errors: Vec<Cheap<char>>) -> Self {
        let offset = errors.first().map(|e| e.span().start).unwrap_or_default();
        let message = if offset >= cond.chars().count() {
            "unexpected end of condition"
        } else {
            "unexpected input in condition"
        };
        ParseError::new(cond, message, offset)
    }
}

/// 1-based line/column of a character offset, plus the text of that line.
/// An offset at or past the end of input points just past the last line.
fn line_col(source: &str, offset: usize) -> (usize, usize, String) {
    let mut line = 1;
    let mut line_start = 0;
    for (i, c) in source.chars().enumerate() {
        if i == offset {
            break;
        }
        if c == '\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    let column = offset - line_start + 1;
    let line_text: String = source
        .chars()
        .skip(line_start)
        .take_while(|c| *c != '\n')
        .collect();
    (line, column, line_text)
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )?;
        write!(f, "{}", self.context)
    }
}

impl std::error::Error for ParseError {}
