use std::str::FromStr;

use chumsky::{error::Cheap, prelude::*, text::TextParser, Stream};

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{self, TokenKind};
use crate::span::Span;

pub(crate) type PError = Simple<TokenKind, Span>;

/// Parse an RA expression source into an AST.
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::lexer()
        .parse(source)
        .map_err(|errors| ParseError::from_lexer(source, errors))?;
    log::debug!("lexed {} tokens", tokens.len());

    let len = source.chars().count();
    let eoi = Span {
        start: len,
        end: len + 1,
    };
    let stream = Stream::from_iter(eoi, tokens.into_iter().map(|t| (t.kind, t.span)));

    expr()
        .then_ignore(end())
        .parse(stream)
        .map_err(|errors| ParseError::from_parser(source, errors))
}

fn expr() -> impl Parser<TokenKind, Expr, Error = PError> {
    recursive(|expr| {
        let atom = select! { TokenKind::Ident(name) => ExprKind::Relation(name) }
            .map_with_span(ExprKind::into_expr)
            .or(expr.delimited_by(ctrl('('), ctrl(')')))
            .boxed();

        let projection = unary_head(TokenKind::Pi, "pi")
            .ignore_then(group())
            .then(atom.clone())
            .try_map(|((text, group_span), sub), span| {
                let attrs = parse_group(
                    attr_list(),
                    &text,
                    group_span,
                    "a comma-separated attribute list",
                )?;
                Ok(ExprKind::Project(Project {
                    attrs,
                    sub: Box::new(sub),
                })
                .into_expr(span))
            })
            .labelled("projection");

        let selection = unary_head(TokenKind::Sigma, "sigma")
            .ignore_then(group())
            .then(atom.clone())
            .map_with_span(|((cond, _), sub), span| {
                ExprKind::Select(Select {
                    cond,
                    sub: Box::new(sub),
                })
                .into_expr(span)
            })
            .labelled("selection");

        let rename = unary_head(TokenKind::Rho, "rho")
            .ignore_then(ident_part().or_not())
            .then(group().or_not())
            .then(atom.clone())
            .try_map(|((alias, pairs), sub), span| {
                let pairs = match pairs {
                    Some((text, group_span)) => parse_group(
                        rename_pairs(),
                        &text,
                        group_span,
                        "comma-separated `old->new` rename pairs",
                    )?,
                    None => Vec::new(),
                };
                if alias.is_none() && pairs.is_empty() {
                    return Err(Simple::custom(
                        span,
                        "ρ requires an alias, `{old->new}` pairs, or both",
                    ));
                }
                Ok(ExprKind::Rename(Rename {
                    alias,
                    pairs,
                    sub: Box::new(sub),
                })
                .into_expr(span))
            })
            .labelled("rename");

        let term = choice((projection, selection, rename, atom)).boxed();

        // One precedence level, left-associative. A brace group after the
        // operator is only meaningful for ⋈ (θ-join).
        let op = binary_op().then(group().or_not()).try_map(|(op, theta), span| {
            if theta.is_some() && op != BinOp::Join {
                return Err(Simple::custom(
                    span,
                    format!("a brace condition can follow ⋈ only, not {op}"),
                ));
            }
            Ok((op, theta))
        });

        term.clone()
            .then(op.then(term).repeated())
            .foldl(|left, ((op, theta), right)| {
                let span = Span::merge_opt(left.span, right.span);
                let (left, right) = (Box::new(left), Box::new(right));
                let kind = match op {
                    BinOp::Join => ExprKind::Join(Join {
                        theta: theta.map(|(text, _)| text),
                        left,
                        right,
                    }),
                    BinOp::Product => ExprKind::Product(Binary { left, right }),
                    BinOp::Union => ExprKind::Union(Binary { left, right }),
                    BinOp::Difference => ExprKind::Difference(Binary { left, right }),
                    BinOp::Intersection => ExprKind::Intersection(Binary { left, right }),
                    BinOp::Division => ExprKind::Division(Binary { left, right }),
                };
                Expr { kind, span }
            })
            .boxed()
    })
}

fn ctrl(c: char) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Control(c)).ignored()
}

fn ident_part() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    select! { TokenKind::Ident(ident) => ident }
}

fn group() -> impl Parser<TokenKind, (String, Span), Error = PError> + Clone {
    select! { TokenKind::Group(text) => text }.map_with_span(|text, span| (text, span))
}

/// π, σ and ρ are each spelled either as their glyph token or as a word
/// identifier; the word is only special in operator-head position.
fn unary_head(
    glyph: TokenKind,
    word: &'static str,
) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    filter_map(move |span, kind: TokenKind| {
        let hit = kind == glyph
            || matches!(&kind, TokenKind::Ident(name) if name.as_str() == word);
        if hit {
            Ok(())
        } else {
            Err(Simple::expected_input_found(span, None, Some(kind)))
        }
    })
}

/// A binary operator: a dedicated operator token, or a word synonym. Word
/// synonyms are only recognized here, in operator position, so `x` is still a
/// valid relation name in atom position.
fn binary_op() -> impl Parser<TokenKind, BinOp, Error = PError> + Clone {
    filter_map(|span, kind: TokenKind| {
        let op = match &kind {
            TokenKind::Binary(op) => Some(*op),
            TokenKind::Ident(name) => BinOp::from_str(name).ok(),
            _ => None,
        };
        op.ok_or_else(|| Simple::expected_input_found(span, None, Some(kind)))
    })
}

/// Contents of a π brace group.
fn attr_list() -> impl Parser<char, Vec<String>, Error = Cheap<char>> {
    lexer::ident_part()
        .padded()
        .separated_by(just(','))
        .at_least(1)
        .then_ignore(end())
}

/// Contents of a ρ brace group.
fn rename_pairs() -> impl Parser<char, Vec<(String, String)>, Error = Cheap<char>> {
    lexer::ident_part()
        .padded()
        .then_ignore(just("->"))
        .then(lexer::ident_part().padded())
        .separated_by(just(','))
        .at_least(1)
        .then_ignore(end())
}

/// Re-parse the raw text of a brace group, pointing any failure back at the
/// exact character inside the enclosing source.
fn parse_group<T>(
    parser: impl Parser<char, T, Error = Cheap<char>>,
    text: &str,
    group_span: Span,
    expected: &'static str,
) -> Result<T, PError> {
    parser.parse(text).map_err(|errors| {
        let offset = errors.first().map(|e| e.span().start).unwrap_or(0);
        let at = group_span.start + 1 + offset;
        Simple::custom(
            Span {
                start: at,
                end: at + 1,
            },
            format!("expected {expected}"),
        )
    })
}
