//! # raql-engine
//!
//! Set-semantic evaluator for RAQL relational-algebra expressions.
//!
//! ```ascii
//!   source text ──parse──► AST ──evaluate(env)──► (Relation, Trace)
//! ```
//!
//! The engine consumes an already-materialized [Environment] (lowercase
//! relation name → [Relation]) and never mutates it; each operator builds a
//! fresh relation and records one [trace] step. Evaluation is synchronous and
//! single-threaded per call; independent calls share no mutable state.
//!
//! ```
//! use raql_engine::{run, Environment, Relation};
//! use raql_engine::ast::Literal;
//!
//! let mut env = Environment::new();
//! env.insert(
//!     "students".to_string(),
//!     Relation::base(
//!         "students",
//!         vec!["sid".to_string(), "name".to_string()],
//!         vec![vec![Literal::Integer(1), Literal::String("alice".to_string())]],
//!     ),
//! );
//! let (relation, trace) = run("π{name}(students)", &env)?;
//! assert_eq!(relation.schema, vec!["name".to_string()]);
//! assert_eq!(trace.len(), 2);
//! # Ok::<(), raql_engine::Error>(())
//! ```

mod error;
mod eval;
mod relation;
mod trace;

pub use raql_parser::ast;
pub use raql_parser::cond;
pub use raql_parser::{ParseError, Span};

pub use error::{Error, EvalError, EvalErrorKind, PredicateErrorCause, WithSpanFallback};
pub use eval::evaluate;
pub use relation::{AliasMap, Environment, Provenance, Relation, Row};
pub use trace::{
    Delta, InputSchema, PreviewRow, StepDetail, Trace, TraceOp, TraceStep, PREVIEW_ROWS,
};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Parse an RA expression into an AST.
pub fn parse(source: &str) -> Result<ast::Expr, ParseError> {
    let expr = raql_parser::parse_expr(source)?;
    log::debug!("parsed `{source}` as `{expr}`");
    Ok(expr)
}

/// Parse and evaluate in one step.
pub fn run(source: &str, env: &Environment) -> Result<(Relation, Trace)> {
    let expr = parse(source)?;
    Ok(evaluate(&expr, env)?)
}
