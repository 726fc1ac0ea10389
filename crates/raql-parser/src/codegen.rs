//! Canonical source form of an AST: Unicode operator spellings, one space
//! around binary operators, parentheses wherever the grammar needs an atom.
//! `parse_expr` of the output yields the same tree.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ast::*;

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_expr(self, f)
    }
}

fn write_expr(expr: &Expr, f: &mut Formatter<'_>) -> fmt::Result {
    match &expr.kind {
        ExprKind::Relation(name) => write!(f, "{name}"),
        ExprKind::Project(project) => {
            write!(f, "π{{{}}}", project.attrs.join(", "))?;
            write_atom(&project.sub, f)
        }
        ExprKind::Select(select) => {
            write!(f, "σ{{{}}}", select.cond)?;
            write_atom(&select.sub, f)
        }
        ExprKind::Rename(rename) => {
            f.write_str("ρ")?;
            if let Some(alias) = &rename.alias {
                write!(f, " {alias}")?;
            }
            if !rename.pairs.is_empty() {
                let pairs = rename
                    .pairs
                    .iter()
                    .map(|(old, new)| format!("{old}->{new}"))
                    .join(", ");
                write!(f, "{{{pairs}}}")?;
            }
            write_atom(&rename.sub, f)
        }
        ExprKind::Join(join) => {
            write_operand(&join.left, f)?;
            match &join.theta {
                Some(cond) => write!(f, " ⋈{{{cond}}} ")?,
                None => f.write_str(" ⋈ ")?,
            }
            write_operand(&join.right, f)
        }
        ExprKind::Product(binary) => write_binary(binary, BinOp::Product, f),
        ExprKind::Union(binary) => write_binary(binary, BinOp::Union, f),
        ExprKind::Difference(binary) => write_binary(binary, BinOp::Difference, f),
        ExprKind::Intersection(binary) => write_binary(binary, BinOp::Intersection, f),
        ExprKind::Division(binary) => write_binary(binary, BinOp::Division, f),
    }
}

fn write_binary(binary: &Binary, op: BinOp, f: &mut Formatter<'_>) -> fmt::Result {
    write_operand(&binary.left, f)?;
    write!(f, " {op} ")?;
    write_operand(&binary.right, f)
}

/// Binary operands: parenthesized when themselves binary, since all binary
/// operators share one precedence level.
fn write_operand(expr: &Expr, f: &mut Formatter<'_>) -> fmt::Result {
    let needs_parens = matches!(
        expr.kind,
        ExprKind::Join(_)
            | ExprKind::Product(_)
            | ExprKind::Union(_)
            | ExprKind::Difference(_)
            | ExprKind::Intersection(_)
            | ExprKind::Division(_)
    );
    if needs_parens {
        f.write_str("(")?;
        write_expr(expr, f)?;
        f.write_str(")")
    } else {
        write_expr(expr, f)
    }
}

/// Operands of the unary operators: the grammar wants an atom there.
fn write_atom(expr: &Expr, f: &mut Formatter<'_>) -> fmt::Result {
    if matches!(expr.kind, ExprKind::Relation(_)) {
        write_expr(expr, f)
    } else {
        f.write_str("(")?;
        write_expr(expr, f)?;
        f.write_str(")")
    }
}
