//! The recursive set-semantic interpreter. Each visited node appends exactly
//! one trace record, in post-order, so a failed evaluation still returns the
//! records of everything that ran before the failing node.

mod cond;

use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;

use raql_parser::ast::{self, Expr, ExprKind};

use self::cond::{eval_cond, truthy, RowBindings};
use crate::error::{EvalError, EvalErrorKind, PredicateErrorCause, WithSpanFallback};
use crate::relation::{
    restrict_aliases, row_key, value_key, Environment, Provenance, Relation, Row, ValueKey,
};
use crate::trace::{self, Delta, InputSchema, StepDetail, Trace, TraceOp, TraceStep};

const PROJECT_NOTE: &str = "Projection drops non-listed attributes and removes duplicates.";
const SELECT_NOTE: &str = "Selection keeps rows satisfying the predicate; schema unchanged.";

/// Evaluate an AST against an environment, returning the result relation and
/// the full trace. On failure the error carries the partial trace.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<(Relation, Trace), EvalError> {
    let mut evaluator = Evaluator {
        env,
        trace: Trace::default(),
    };
    match evaluator.eval(expr) {
        Ok(relation) => Ok((relation, evaluator.trace)),
        Err(error) => Err(error.with_trace(evaluator.trace)),
    }
}

struct Evaluator<'a> {
    env: &'a Environment,
    trace: Trace,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, expr: &Expr) -> Result<Relation, EvalError> {
        let result = match &expr.kind {
            ExprKind::Relation(name) => self.relation(name),
            ExprKind::Project(node) => self.project(node),
            ExprKind::Select(node) => self.select(node),
            ExprKind::Rename(node) => self.rename(node),
            ExprKind::Join(node) => self.join(node),
            ExprKind::Product(node) => self.product(node),
            ExprKind::Union(node) => self.union(node),
            ExprKind::Difference(node) => self.difference(node),
            ExprKind::Intersection(node) => self.intersection(node),
            ExprKind::Division(node) => self.division(node),
        };
        result.with_span_fallback(expr.span)
    }

    fn record(
        &mut self,
        op: TraceOp,
        detail: Option<StepDetail>,
        input_schema: Option<InputSchema>,
        delta: Delta,
        output: &Relation,
    ) {
        log::debug!("{op}: {} rows", delta.rows_after);
        self.trace.push(TraceStep {
            op,
            detail,
            input_schema,
            output_schema: output.schema.clone(),
            delta,
            preview: trace::preview(output),
        });
    }

    fn relation(&mut self, name: &str) -> Result<Relation, EvalError> {
        let name = name.to_lowercase();
        let Some(found) = self.env.get(&name) else {
            let available = self.env.keys().cloned().sorted().collect_vec();
            return Err(EvalErrorKind::UnknownRelation { name, available }.into());
        };
        let output = found.alias_as(&name);
        self.record(
            TraceOp::Rel,
            Some(StepDetail::Name(name)),
            None,
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn project(&mut self, node: &ast::Project) -> Result<Relation, EvalError> {
        let input = self.eval(&node.sub)?;
        let mut seen = HashSet::new();
        for attr in &node.attrs {
            if input.attr_index(attr).is_none() {
                return Err(EvalErrorKind::MissingAttribute {
                    name: attr.clone(),
                    schema: input.schema.clone(),
                }
                .into());
            }
            if !seen.insert(attr) {
                return Err(EvalErrorKind::SchemaCollision { name: attr.clone() }.into());
            }
        }
        let output = input.project(&node.attrs).dedupe();
        self.record(
            TraceOp::Project,
            Some(StepDetail::Attrs {
                attrs: node.attrs.clone(),
            }),
            Some(InputSchema::Single(input.schema.clone())),
            Delta::narrowing(input.rows.len(), output.rows.len(), PROJECT_NOTE),
            &output,
        );
        Ok(output)
    }

    fn select(&mut self, node: &ast::Select) -> Result<Relation, EvalError> {
        let input = self.eval(&node.sub)?;
        let rows = filter_rows(&input, &node.cond)?;
        let output = Relation {
            schema: input.schema.clone(),
            rows,
            aliases: input.aliases.clone(),
        };
        self.record(
            TraceOp::Select,
            Some(StepDetail::Cond {
                cond: node.cond.clone(),
            }),
            Some(InputSchema::Single(input.schema.clone())),
            Delta::narrowing(input.rows.len(), output.rows.len(), SELECT_NOTE),
            &output,
        );
        Ok(output)
    }

    fn rename(&mut self, node: &ast::Rename) -> Result<Relation, EvalError> {
        let input = self.eval(&node.sub)?;
        let mut alias = node.alias.clone();
        let mut pairs = node.pairs.clone();
        // Legacy spelling: `ρ{x->e}(R)` where `x` is not an attribute of R
        // binds `e` as the relation alias.
        if alias.is_none() && !pairs.is_empty() && input.attr_index(&pairs[0].0).is_none() {
            let (_, new) = pairs.remove(0);
            alias = Some(new.to_lowercase());
        }

        // Pairs apply in order; each old name must exist at its turn and each
        // new name must not collide with a column still present.
        let mut schema = input.schema.clone();
        for (old, new) in &pairs {
            let Some(index) = schema.iter().position(|c| c == old) else {
                return Err(EvalErrorKind::MissingAttribute {
                    name: old.clone(),
                    schema,
                }
                .into());
            };
            if new != old && schema.contains(new) {
                return Err(EvalErrorKind::RenameCollision { name: new.clone() }.into());
            }
            schema[index] = new.clone();
        }

        let mut output = input.rename(&pairs);
        if let Some(alias) = &alias {
            output = output.alias_as(alias);
        }
        self.record(
            TraceOp::Rename,
            Some(StepDetail::Renames {
                renames: pairs,
                relation: alias,
            }),
            Some(InputSchema::Single(input.schema.clone())),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn join(&mut self, node: &ast::Join) -> Result<Relation, EvalError> {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        let input_schema = InputSchema::Pair {
            left: left.schema.clone(),
            right: right.schema.clone(),
        };

        match &node.theta {
            Some(theta) if !theta.trim().is_empty() => {
                let product = left.cross(&right).map_err(EvalError::from)?;
                let rows = filter_rows(&product, theta)?;
                let output = Relation {
                    schema: product.schema.clone(),
                    rows,
                    aliases: product.aliases.clone(),
                };
                self.record(
                    TraceOp::ThetaJoin,
                    Some(StepDetail::Cond {
                        cond: theta.clone(),
                    }),
                    Some(input_schema),
                    Delta::new(output.rows.len()),
                    &output,
                );
                Ok(output)
            }
            _ => {
                let common = left
                    .schema
                    .iter()
                    .filter(|c| right.schema.contains(c))
                    .cloned()
                    .collect_vec();
                // no shared attributes degenerates to the product
                let output = if common.is_empty() {
                    left.cross(&right).map_err(EvalError::from)?
                } else {
                    left.equi_join(&common, &right)
                };
                self.record(
                    TraceOp::NaturalJoin,
                    Some(StepDetail::On { on: common }),
                    Some(input_schema),
                    Delta::new(output.rows.len()),
                    &output,
                );
                Ok(output)
            }
        }
    }

    fn product(&mut self, node: &ast::Binary) -> Result<Relation, EvalError> {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        let output = left.cross(&right).map_err(EvalError::from)?;
        self.record(
            TraceOp::Product,
            None,
            Some(InputSchema::Pair {
                left: left.schema.clone(),
                right: right.schema.clone(),
            }),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn union(&mut self, node: &ast::Binary) -> Result<Relation, EvalError> {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        if left.schema != right.schema {
            return Err(EvalErrorKind::UnionIncompatible {
                left: left.schema,
                right: right.schema,
            }
            .into());
        }
        let output = left.concat_rows(&right).dedupe();
        self.record(
            TraceOp::Union,
            None,
            Some(InputSchema::Pair {
                left: left.schema.clone(),
                right: right.schema.clone(),
            }),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn difference(&mut self, node: &ast::Binary) -> Result<Relation, EvalError> {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        if left.schema != right.schema {
            return Err(EvalErrorKind::DifferenceIncompatible {
                left: left.schema,
                right: right.schema,
            }
            .into());
        }
        let right_keys: HashSet<Vec<ValueKey>> =
            right.rows.iter().map(|row| row_key(&row.values)).collect();
        let kept = left
            .rows
            .iter()
            .filter(|row| !right_keys.contains(&row_key(&row.values)))
            .cloned()
            .collect_vec();
        // survivors keep left-side provenance only
        let output = Relation {
            schema: left.schema.clone(),
            rows: kept,
            aliases: left.aliases.clone(),
        }
        .dedupe();
        self.record(
            TraceOp::Difference,
            None,
            Some(InputSchema::Pair {
                left: left.schema.clone(),
                right: right.schema.clone(),
            }),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn intersection(&mut self, node: &ast::Binary) -> Result<Relation, EvalError> {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        if left.schema != right.schema {
            return Err(EvalErrorKind::IntersectionIncompatible {
                left: left.schema,
                right: right.schema,
            }
            .into());
        }
        let left_set = left.dedupe();
        let right_set = right.dedupe();
        let right_provenance: IndexMap<Vec<ValueKey>, Vec<Provenance>> = right_set
            .rows
            .iter()
            .map(|row| (row_key(&row.values), row.provenance.clone()))
            .collect();
        let rows = left_set
            .rows
            .iter()
            .filter_map(|row| {
                right_provenance.get(&row_key(&row.values)).map(|from_right| {
                    let mut provenance = row.provenance.clone();
                    provenance.extend(from_right.iter().cloned());
                    Row {
                        values: row.values.clone(),
                        provenance,
                    }
                })
            })
            .collect_vec();
        let output = Relation {
            schema: left.schema.clone(),
            rows,
            aliases: left.aliases.clone(),
        };
        self.record(
            TraceOp::Intersection,
            None,
            Some(InputSchema::Pair {
                left: left.schema.clone(),
                right: right.schema.clone(),
            }),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }

    fn division(&mut self, node: &ast::Binary) -> Result<Relation, EvalError> {
        let dividend = self.eval(&node.left)?;
        let divisor = self.eval(&node.right)?;
        if !divisor
            .schema
            .iter()
            .all(|c| dividend.schema.contains(c))
        {
            return Err(EvalErrorKind::DivisionIncompatible {
                divisor: divisor.schema,
                dividend: dividend.schema,
            }
            .into());
        }
        let quotient_attrs = dividend
            .schema
            .iter()
            .filter(|c| !divisor.schema.contains(c))
            .cloned()
            .collect_vec();
        if quotient_attrs.is_empty() {
            return Err(EvalErrorKind::DivisionEmptyQuotient.into());
        }

        // candidate quotient rows, provenance aggregated per Q-group
        let candidates = dividend.project(&quotient_attrs).dedupe();
        let required = divisor.dedupe();

        let rows = if required.rows.is_empty() {
            candidates.rows.clone()
        } else {
            let quotient_indices = quotient_attrs
                .iter()
                .filter_map(|c| dividend.attr_index(c))
                .collect_vec();
            let divisor_indices = divisor
                .schema
                .iter()
                .filter_map(|c| dividend.attr_index(c))
                .collect_vec();
            let present: HashSet<Vec<ValueKey>> = dividend
                .rows
                .iter()
                .map(|row| {
                    quotient_indices
                        .iter()
                        .chain(divisor_indices.iter())
                        .map(|&i| value_key(&row.values[i]))
                        .collect()
                })
                .collect();
            candidates
                .rows
                .iter()
                .filter(|candidate| {
                    required.rows.iter().all(|requirement| {
                        let key = candidate
                            .values
                            .iter()
                            .chain(requirement.values.iter())
                            .map(value_key)
                            .collect_vec();
                        present.contains(&key)
                    })
                })
                .cloned()
                .collect_vec()
        };

        let output = Relation {
            rows,
            aliases: restrict_aliases(&dividend.aliases, &quotient_attrs),
            schema: quotient_attrs.clone(),
        };
        self.record(
            TraceOp::Division,
            Some(StepDetail::Division {
                quotient_attrs,
                divisor_attrs: divisor.schema.clone(),
            }),
            Some(InputSchema::Pair {
                left: dividend.schema.clone(),
                right: divisor.schema.clone(),
            }),
            Delta::new(output.rows.len()),
            &output,
        );
        Ok(output)
    }
}

/// Parse a predicate and keep the rows it holds for. Parse and lookup
/// failures are wrapped as predicate errors of the calling node.
fn filter_rows(input: &Relation, cond_text: &str) -> Result<Vec<Row>, EvalError> {
    let predicate = raql_parser::cond::parse(cond_text).map_err(|e| {
        EvalError::from(EvalErrorKind::predicate(
            cond_text,
            PredicateErrorCause::Parse(e),
        ))
    })?;
    let mut rows = Vec::new();
    for row in &input.rows {
        let bindings = RowBindings {
            relation: input,
            row,
        };
        let value = eval_cond(&predicate, &bindings).map_err(|e| {
            EvalError::from(EvalErrorKind::predicate(
                cond_text,
                PredicateErrorCause::Eval(Box::new(e)),
            ))
        })?;
        if truthy(&value) {
            rows.push(row.clone());
        }
    }
    Ok(rows)
}
