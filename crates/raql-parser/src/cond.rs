//! The predicate sub-language used by σ and θ-join.
//!
//! Conditions reach the engine as raw brace text; this module parses them
//! into a small boolean AST. It is a closed universe: the only operations
//! are the comparison and logical operators below, so there is nothing to
//! escape from and no host evaluation anywhere.

use chumsky::{error::Cheap, prelude::*, text, text::TextParser};
use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::ast::Literal;
use crate::error::ParseError;
use crate::lexer::ident_part;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondExpr {
    #[serde(flatten)]
    pub kind: CondKind,
    #[serde(skip)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
pub enum CondKind {
    Literal(Literal),
    Column(ColumnRef),
    Not(Box<CondExpr>),
    Binary(CondBinary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondBinary {
    pub left: Box<CondExpr>,
    pub op: CondOp,
    pub right: Box<CondExpr>,
}

/// A possibly alias-qualified attribute reference, lowercased.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRef {
    pub alias: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

/// Parse a condition string. Errors are positioned within the condition
/// text itself (line 1 of the condition, not of the enclosing expression).
pub fn parse(cond: &str) -> Result<CondExpr, ParseError> {
    cond_parser()
        .then_ignore(end())
        .parse(cond)
        .map_err(|errors| ParseError::from_cond(cond, errors))
}

fn cond_parser() -> impl Parser<char, CondExpr, Error = Cheap<char>> {
    recursive(|cond| {
        let term = choice((
            quoted_string('"').map(|s| CondKind::Literal(Literal::String(s))),
            quoted_string('\'').map(|s| CondKind::Literal(Literal::String(s))),
            number().map(CondKind::Literal),
            word_term(),
        ))
        .map_with_span(|kind, span: std::ops::Range<usize>| CondExpr {
            kind,
            span: Some(span.into()),
        })
        .padded();

        let cmp_op = choice((
            just("==").to(CondOp::Eq),
            just("!=").to(CondOp::Ne),
            just("<=").to(CondOp::Lte),
            just(">=").to(CondOp::Gte),
            just("<").to(CondOp::Lt),
            just(">").to(CondOp::Gt),
            just("=").to(CondOp::Eq),
        ));

        let cmp = term
            .clone()
            .then(cmp_op.padded().then(term).or_not())
            .map(|(left, tail)| match tail {
                Some((op, right)) => binary(left, op, right),
                None => left,
            });

        let paren = cond
            .delimited_by(just('('), just(')'))
            .padded();

        let base = paren.or(cmp).boxed();

        let notexpr = recursive(|notexpr| {
            keyword("not")
                .padded()
                .ignore_then(notexpr)
                .map_with_span(|expr: CondExpr, span: std::ops::Range<usize>| CondExpr {
                    kind: CondKind::Not(Box::new(expr)),
                    span: Some(span.into()),
                })
                .or(base)
        });

        let andexpr = notexpr
            .clone()
            .then(keyword("and").padded().ignore_then(notexpr).repeated())
            .foldl(|left, right| binary(left, CondOp::And, right));

        andexpr
            .clone()
            .then(keyword("or").padded().ignore_then(andexpr).repeated())
            .foldl(|left, right| binary(left, CondOp::Or, right))
    })
}

fn binary(left: CondExpr, op: CondOp, right: CondExpr) -> CondExpr {
    let span = Span::merge_opt(left.span, right.span);
    CondExpr {
        kind: CondKind::Binary(CondBinary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }),
        span,
    }
}

/// A case-insensitive keyword, matched against a whole word so that
/// identifiers like `android` never lex as `and`.
fn keyword(kw: &'static str) -> impl Parser<char, (), Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic())
        .repeated()
        .at_least(1)
        .collect::<String>()
        .try_map(move |word: String, span| {
            if word.eq_ignore_ascii_case(kw) {
                Ok(())
            } else {
                Err(Cheap::expected_input_found(span, None, None))
            }
        })
}

/// An identifier, an `alias.attr` reference, or the TRUE/FALSE keywords.
fn word_term() -> impl Parser<char, CondKind, Error = Cheap<char>> + Clone {
    ident_part()
        .then(just('.').ignore_then(ident_part()).or_not())
        .map(|(first, second)| match second {
            Some(name) => CondKind::Column(ColumnRef {
                alias: Some(first),
                name,
            }),
            None => match first.as_str() {
                "true" => CondKind::Literal(Literal::Boolean(true)),
                "false" => CondKind::Literal(Literal::Boolean(false)),
                _ => CondKind::Column(ColumnRef {
                    alias: None,
                    name: first,
                }),
            },
        })
}

fn number() -> impl Parser<char, Literal, Error = Cheap<char>> + Clone {
    just('-')
        .or_not()
        .then(text::int(10))
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .try_map(|((sign, int), frac): ((Option<char>, String), Option<String>), span| {
            let mut s = String::new();
            if sign.is_some() {
                s.push('-');
            }
            s.push_str(&int);
            match frac {
                Some(frac) => {
                    s.push('.');
                    s.push_str(&frac);
                    s.parse::<f64>()
                        .map(Literal::Float)
                        .map_err(|_| Cheap::expected_input_found(span, None, None))
                }
                None => s
                    .parse::<i64>()
                    .map(Literal::Integer)
                    .map_err(|_| Cheap::expected_input_found(span, None, None)),
            }
        })
}

fn quoted_string(quote: char) -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just(quote),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
    )));

    filter(move |c: &char| *c != quote && *c != '\\')
        .or(escape)
        .repeated()
        .collect::<String>()
        .delimited_by(just(quote), just(quote))
}
