//! Abstract syntax tree for RAQL expressions.
//!
//! Attribute and relation names are case-folded to lowercase by the time they
//! reach the AST. Predicates (the text between braces in `σ{…}` and `⋈{…}`)
//! are carried verbatim and parsed by the predicate sub-language in [crate::cond].

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(skip)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
pub enum ExprKind {
    /// A base relation, looked up in the environment by lowercase name.
    Relation(String),
    Project(Project),
    Select(Select),
    Rename(Rename),
    Join(Join),
    Product(Binary),
    Union(Binary),
    Difference(Binary),
    Intersection(Binary),
    Division(Binary),
}

impl ExprKind {
    pub fn into_expr(self, span: Span) -> Expr {
        Expr {
            kind: self,
            span: Some(span),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub attrs: Vec<String>,
    pub sub: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Select {
    /// Raw predicate text, handed to the predicate sub-language at evaluation.
    pub cond: String,
    pub sub: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rename {
    pub alias: Option<String>,
    pub pairs: Vec<(String, String)>,
    pub sub: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    /// `None` is a natural join; `Some` is a θ-join predicate.
    pub theta: Option<String>,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Payload of the condition-less binary operators (×, ∪, −, ∩, ÷).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binary {
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Binary RA operators. `Display` emits the Unicode spelling; `FromStr`
/// (via strum) accepts the ASCII word synonyms, case-insensitively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum BinOp {
    #[strum(to_string = "⋈", serialize = "join")]
    Join,
    #[strum(to_string = "×", serialize = "x", serialize = "cross")]
    Product,
    #[strum(to_string = "∪", serialize = "union")]
    Union,
    #[strum(to_string = "−", serialize = "diff")]
    Difference,
    #[strum(to_string = "∩", serialize = "intersect")]
    Intersection,
    #[strum(to_string = "÷", serialize = "div")]
    Division,
}

/// A cell value. `Null` stands for an absent value.
#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
pub enum Literal {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\\', r"\\").replace('\'', r"\'")),
        }
    }
}
