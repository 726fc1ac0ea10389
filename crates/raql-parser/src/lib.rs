//! # raql-parser
//!
//! Lexer and parser for RAQL relational-algebra expressions.
//!
//! ```ascii
//!   source text ──lexer──► tokens ──parser──► Expr (AST)
//!                             │
//!            brace groups ────┴──► attribute lists / rename pairs,
//!                                  or predicate text for [cond]
//! ```
//!
//! The surface syntax accepts the Unicode operator glyphs (π, σ, ρ, ⋈, ×, ∪,
//! −, ∩, ÷) as well as ASCII word synonyms (`pi`, `sigma`, `rho`, `join`,
//! `x`/`cross`, `union`, `diff`, `intersect`, `div`), case-insensitively.
//! Word synonyms are only recognized in operator position, so they remain
//! usable as relation names.
//!
//! Evaluation lives in the `raql-engine` crate; this crate is purely
//! syntax: tokens, AST, spans, parse errors, and the canonical writer
//! (`Display` on [ast::Expr]).

pub mod ast;
mod codegen;
pub mod cond;
mod error;
pub mod lexer;
mod parser;
mod span;

pub use error::ParseError;
pub use parser::parse_expr;
pub use span::Span;
