//! Evaluation of a parsed predicate against one row's bindings.
//!
//! Lookup resolves unqualified names against the schema first, then against
//! the alias maps; a name reachable through two aliases as two different
//! columns is ambiguous. Comparisons coerce within a domain only
//! (number/number, string/string, boolean/boolean); anything else, or an
//! absent operand, compares false — for every comparison operator.

use std::cmp::Ordering;

use itertools::Itertools;

use raql_parser::ast::Literal;
use raql_parser::cond::{ColumnRef, CondExpr, CondKind, CondOp};

use crate::error::EvalErrorKind;
use crate::relation::{Relation, Row};

/// One row's attribute bindings: the row plus the schema and alias map of
/// the relation it belongs to.
pub(crate) struct RowBindings<'a> {
    pub relation: &'a Relation,
    pub row: &'a Row,
}

impl<'a> RowBindings<'a> {
    fn resolve(&self, column: &ColumnRef) -> Result<&'a Literal, EvalErrorKind> {
        match &column.alias {
            Some(alias) => {
                let physical = self
                    .relation
                    .aliases
                    .get(alias)
                    .and_then(|columns| columns.get(&column.name))
                    .ok_or_else(|| self.missing(column))?;
                self.cell(physical).ok_or_else(|| self.missing(column))
            }
            None => {
                if let Some(value) = self.cell(&column.name) {
                    return Ok(value);
                }
                // an unqualified name can still reach a suffixed or renamed
                // column through the alias maps, as long as it is unique
                let physicals = self
                    .relation
                    .aliases
                    .values()
                    .filter_map(|columns| columns.get(&column.name))
                    .unique()
                    .collect_vec();
                match physicals.as_slice() {
                    [] => Err(self.missing(column)),
                    [physical] => self.cell(physical).ok_or_else(|| self.missing(column)),
                    _ => Err(EvalErrorKind::AmbiguousAttribute {
                        name: column.name.clone(),
                    }),
                }
            }
        }
    }

    fn cell(&self, attr: &str) -> Option<&'a Literal> {
        self.relation
            .attr_index(attr)
            .map(|index| &self.row.values[index])
    }

    fn missing(&self, column: &ColumnRef) -> EvalErrorKind {
        let name = match &column.alias {
            Some(alias) => format!("{alias}.{}", column.name),
            None => column.name.clone(),
        };
        EvalErrorKind::MissingAttribute {
            name,
            schema: self.relation.schema.clone(),
        }
    }
}

pub(crate) fn eval_cond(
    cond: &CondExpr,
    bindings: &RowBindings,
) -> Result<Literal, EvalErrorKind> {
    match &cond.kind {
        CondKind::Literal(literal) => Ok(literal.clone()),
        CondKind::Column(column) => bindings.resolve(column).cloned(),
        CondKind::Not(sub) => Ok(Literal::Boolean(!truthy(&eval_cond(sub, bindings)?))),
        CondKind::Binary(binary) => match binary.op {
            CondOp::And => Ok(Literal::Boolean(
                truthy(&eval_cond(&binary.left, bindings)?)
                    && truthy(&eval_cond(&binary.right, bindings)?),
            )),
            CondOp::Or => Ok(Literal::Boolean(
                truthy(&eval_cond(&binary.left, bindings)?)
                    || truthy(&eval_cond(&binary.right, bindings)?),
            )),
            op => {
                let left = eval_cond(&binary.left, bindings)?;
                let right = eval_cond(&binary.right, bindings)?;
                Ok(Literal::Boolean(compare(op, &left, &right)))
            }
        },
    }
}

/// Truthiness of a bare term: booleans as-is, numbers non-zero, strings
/// non-empty, absent false.
pub(crate) fn truthy(value: &Literal) -> bool {
    match value {
        Literal::Null => false,
        Literal::Boolean(b) => *b,
        Literal::Integer(i) => *i != 0,
        Literal::Float(v) => *v != 0.0,
        Literal::String(s) => !s.is_empty(),
    }
}

fn compare(op: CondOp, left: &Literal, right: &Literal) -> bool {
    let ordering = match (left, right) {
        (Literal::Integer(l), Literal::Integer(r)) => l.partial_cmp(r),
        (Literal::Float(l), Literal::Float(r)) => l.partial_cmp(r),
        (Literal::Integer(l), Literal::Float(r)) => (*l as f64).partial_cmp(r),
        (Literal::Float(l), Literal::Integer(r)) => l.partial_cmp(&(*r as f64)),
        (Literal::String(l), Literal::String(r)) => Some(l.cmp(r)),
        (Literal::Boolean(l), Literal::Boolean(r)) => Some(l.cmp(r)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CondOp::Eq => ordering == Ordering::Equal,
        CondOp::Ne => ordering != Ordering::Equal,
        CondOp::Lt => ordering == Ordering::Less,
        CondOp::Lte => ordering != Ordering::Greater,
        CondOp::Gt => ordering == Ordering::Greater,
        CondOp::Gte => ordering != Ordering::Less,
        CondOp::And | CondOp::Or => false,
    }
}
