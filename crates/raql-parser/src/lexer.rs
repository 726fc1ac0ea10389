use chumsky::{error::Cheap, prelude::*};

use crate::ast::BinOp;
use crate::span::Span;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TokenKind {
    /// Identifier, case-folded to lowercase.
    Ident(String),
    Pi,
    Sigma,
    Rho,
    /// Binary operator glyph or symbol. Word synonyms (`join`, `union`, …)
    /// lex as `Ident` and are resolved by the parser in operator position.
    Binary(BinOp),
    /// Brace-balanced text between `{` and `}`, braces excluded, verbatim.
    /// Interpretation (attribute list, rename pairs, predicate) is up to the
    /// parser.
    Group(String),
    /// single-char control tokens
    Control(char),
}

#[derive(Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Lex chars to tokens until the end of the input
pub fn lexer() -> impl Parser<char, Vec<Token>, Error = Cheap<char>> {
    lex_token()
        .repeated()
        .then_ignore(ignored())
        .then_ignore(end())
}

/// Lex chars to a single token
fn lex_token() -> impl Parser<char, Token, Error = Cheap<char>> {
    let operator = choice((
        just('π').to(TokenKind::Pi),
        just('σ').to(TokenKind::Sigma),
        just('ρ').to(TokenKind::Rho),
        just('⋈').to(TokenKind::Binary(BinOp::Join)),
        one_of("×*").to(TokenKind::Binary(BinOp::Product)),
        just('∪').to(TokenKind::Binary(BinOp::Union)),
        // U+2212 minus sign or the ASCII hyphen
        one_of("−-").to(TokenKind::Binary(BinOp::Difference)),
        just('∩').to(TokenKind::Binary(BinOp::Intersection)),
        one_of("÷/").to(TokenKind::Binary(BinOp::Division)),
    ));

    let control = one_of("()").map(TokenKind::Control);

    let ident = ident_part().map(TokenKind::Ident);

    let group = brace_group().map(TokenKind::Group);

    ignored().ignore_then(
        choice((operator, control, group, ident))
            .map_with_span(|kind, span: std::ops::Range<usize>| Token {
                kind,
                span: span.into(),
            }),
    )
}

/// The longest brace-balanced text between `{` and `}`. Nested groups are
/// kept verbatim, with their braces.
fn brace_group() -> impl Parser<char, String, Error = Cheap<char>> {
    recursive(|group| {
        choice((
            none_of("{}").map(|c: char| c.to_string()),
            group.map(|inner: String| format!("{{{inner}}}")),
        ))
        .repeated()
        .delimited_by(just('{'), just('}'))
        .map(|parts: Vec<String>| parts.concat())
    })
}

pub(crate) fn ident_part() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .chain(filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated())
        .collect::<String>()
        .map(|s: String| s.to_ascii_lowercase())
}

fn ignored() -> impl Parser<char, (), Error = Cheap<char>> {
    filter(|c: &char| c.is_whitespace()).repeated().ignored()
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => {
                if s.is_empty() {
                    // FYI this shows up in errors
                    write!(f, "an identifier")
                } else {
                    write!(f, "{s}")
                }
            }
            TokenKind::Pi => f.write_str("π"),
            TokenKind::Sigma => f.write_str("σ"),
            TokenKind::Rho => f.write_str("ρ"),
            TokenKind::Binary(op) => write!(f, "{op}"),
            TokenKind::Group(text) => write!(f, "{{{text}}}"),
            TokenKind::Control(c) => write!(f, "{c}"),
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}..{}: {:?}", self.span.start, self.span.end, self.kind)
    }
}

pub struct TokenVec(pub Vec<Token>);

impl std::fmt::Debug for TokenVec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "TokenVec (")?;
        for token in self.0.iter() {
            writeln!(f, "  {:?},", token)?;
        }
        write!(f, ")")
    }
}
