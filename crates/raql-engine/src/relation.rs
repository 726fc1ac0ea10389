//! The columnar relation value: an ordered attribute schema, rows of cells,
//! per-row provenance, and the alias map used by qualified predicate
//! references.
//!
//! Relations are immutable values. Every combinator builds a fresh relation
//! and concatenates the provenance tag lists of the rows that contributed to
//! each output row; none of them mutates its inputs.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use raql_parser::ast::Literal;

use crate::error::EvalErrorKind;

/// The evaluation environment: lowercase relation name → relation.
pub type Environment = HashMap<String, Relation>;

/// alias → (logical attribute name → physical column).
///
/// Logical and physical names start out identical; they diverge when a join
/// suffixes a colliding right-side column (`c` → `c_r`) or a ρ renames an
/// attribute, so `alias.c` keeps resolving either way.
pub type AliasMap = IndexMap<String, IndexMap<String, String>>;

/// One `(base relation, base row index)` provenance tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub relation: String,
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// Cells, positionally aligned with the relation's schema.
    pub values: Vec<Literal>,
    pub provenance: Vec<Provenance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub schema: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    pub aliases: AliasMap,
}

impl Relation {
    /// A relation from a schema and plain value rows, without provenance.
    /// Attribute names are case-folded to lowercase at this ingress point.
    pub fn from_columns(schema: Vec<String>, rows: Vec<Vec<Literal>>) -> Relation {
        Relation {
            schema: lowercase(schema),
            rows: rows
                .into_iter()
                .map(|values| Row {
                    values,
                    provenance: Vec::new(),
                })
                .collect(),
            aliases: AliasMap::new(),
        }
    }

    /// An empty relation with the given schema.
    pub fn empty(schema: Vec<String>) -> Relation {
        Relation::from_columns(schema, Vec::new())
    }

    /// A base relation with each row seeded with its `(name, index)` tag.
    pub fn base(name: &str, schema: Vec<String>, rows: Vec<Vec<Literal>>) -> Relation {
        let name = name.to_lowercase();
        let mut relation = Relation::from_columns(schema, rows);
        for (index, row) in relation.rows.iter_mut().enumerate() {
            row.provenance = vec![Provenance {
                relation: name.clone(),
                row: index,
            }];
        }
        relation
    }

    pub fn attr_index(&self, attr: &str) -> Option<usize> {
        self.schema.iter().position(|c| c == attr)
    }

    /// Bind this relation to a single alias covering the whole schema,
    /// discarding prior alias bindings.
    pub fn alias_as(&self, name: &str) -> Relation {
        let mut out = self.clone();
        out.aliases = identity_aliases(name, &self.schema);
        out
    }

    /// Keep only the named attributes, in the given order. The caller has
    /// verified the attributes exist. Duplicate output rows are not removed
    /// here; follow with [Relation::dedupe].
    pub fn project(&self, attrs: &[String]) -> Relation {
        let indices: Vec<usize> = attrs.iter().filter_map(|a| self.attr_index(a)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| Row {
                values: indices.iter().map(|&i| row.values[i].clone()).collect(),
                provenance: row.provenance.clone(),
            })
            .collect();
        Relation {
            schema: attrs.to_vec(),
            rows,
            aliases: restrict_aliases(&self.aliases, attrs),
        }
    }

    /// Apply `old -> new` column renames in order. The caller has verified
    /// that each `old` exists and no `new` collides. Alias entries keep their
    /// logical names and follow the physical columns.
    pub fn rename(&self, pairs: &[(String, String)]) -> Relation {
        let mut schema = self.schema.clone();
        let mut aliases = self.aliases.clone();
        for (old, new) in pairs {
            if let Some(index) = schema.iter().position(|c| c == old) {
                schema[index] = new.clone();
            }
            for columns in aliases.values_mut() {
                for physical in columns.values_mut() {
                    if physical == old {
                        *physical = new.clone();
                    }
                }
            }
        }
        Relation {
            schema,
            rows: self.rows.clone(),
            aliases,
        }
    }

    /// Append `other`'s rows. Schemas are identical by the caller's check.
    pub fn concat_rows(&self, other: &Relation) -> Relation {
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        Relation {
            schema: self.schema.clone(),
            rows,
            aliases: merge_aliases(&self.aliases, &other.aliases, &self.schema),
        }
    }

    /// Remove duplicate rows under schema-tuple equality, keeping first-seen
    /// order and concatenating the provenance of merged duplicates.
    pub fn dedupe(&self) -> Relation {
        let mut seen: IndexMap<Vec<ValueKey>, Row> = IndexMap::new();
        for row in &self.rows {
            match seen.entry(row_key(&row.values)) {
                indexmap::map::Entry::Occupied(mut entry) => {
                    entry
                        .get_mut()
                        .provenance
                        .extend(row.provenance.iter().cloned());
                }
                indexmap::map::Entry::Vacant(entry) => {
                    entry.insert(row.clone());
                }
            }
        }
        Relation {
            schema: self.schema.clone(),
            rows: seen.into_values().collect(),
            aliases: self.aliases.clone(),
        }
    }

    /// Cartesian product. Right-side columns that collide with a left-side
    /// name get an `_r` suffix; alias entries follow the suffixed columns.
    pub fn cross(&self, other: &Relation) -> Result<Relation, EvalErrorKind> {
        let mut schema = self.schema.clone();
        let mut right_names = Vec::with_capacity(other.schema.len());
        for name in &other.schema {
            let mut physical = name.clone();
            if schema.contains(&physical) {
                physical = format!("{name}_r");
                if schema.contains(&physical) {
                    return Err(EvalErrorKind::SchemaCollision { name: physical });
                }
            }
            schema.push(physical.clone());
            right_names.push(physical);
        }

        let mut rows = Vec::with_capacity(self.rows.len() * other.rows.len());
        for left in &self.rows {
            for right in &other.rows {
                let mut values = left.values.clone();
                values.extend(right.values.iter().cloned());
                let mut provenance = left.provenance.clone();
                provenance.extend(right.provenance.iter().cloned());
                rows.push(Row { values, provenance });
            }
        }

        let mut aliases = self.aliases.clone();
        for (alias, columns) in &other.aliases {
            let remapped: IndexMap<String, String> = columns
                .iter()
                .filter_map(|(logical, physical)| {
                    other
                        .schema
                        .iter()
                        .position(|c| c == physical)
                        .map(|i| (logical.clone(), right_names[i].clone()))
                })
                .collect();
            if !remapped.is_empty() {
                aliases.insert(alias.clone(), remapped);
            }
        }

        Ok(Relation {
            schema,
            rows,
            aliases,
        })
    }

    /// Inner equi-join on the named common attributes. The output schema is
    /// this schema followed by `other`'s non-common attributes.
    pub fn equi_join(&self, common: &[String], other: &Relation) -> Relation {
        let key_indices: Vec<(usize, usize)> = common
            .iter()
            .filter_map(|c| Some((self.attr_index(c)?, other.attr_index(c)?)))
            .collect();
        let right_keep: Vec<usize> = other
            .schema
            .iter()
            .enumerate()
            .filter(|(_, c)| !common.contains(c))
            .map(|(i, _)| i)
            .collect();

        let mut schema = self.schema.clone();
        schema.extend(right_keep.iter().map(|&i| other.schema[i].clone()));

        let mut rows = Vec::new();
        for left in &self.rows {
            for right in &other.rows {
                let matched = key_indices
                    .iter()
                    .all(|&(li, ri)| values_equal(&left.values[li], &right.values[ri]));
                if matched {
                    let mut values = left.values.clone();
                    values.extend(right_keep.iter().map(|&i| right.values[i].clone()));
                    let mut provenance = left.provenance.clone();
                    provenance.extend(right.provenance.iter().cloned());
                    rows.push(Row { values, provenance });
                }
            }
        }

        Relation {
            aliases: merge_aliases(&self.aliases, &other.aliases, &schema),
            schema,
            rows,
        }
    }
}

/// alias → identity logical/physical mapping over `schema`.
pub(crate) fn identity_aliases(name: &str, schema: &[String]) -> AliasMap {
    let mut aliases = AliasMap::new();
    aliases.insert(
        name.to_lowercase(),
        schema.iter().map(|c| (c.clone(), c.clone())).collect(),
    );
    aliases
}

/// Drop alias entries whose physical column is no longer in `schema`;
/// drop aliases that end up empty.
pub(crate) fn restrict_aliases(aliases: &AliasMap, schema: &[String]) -> AliasMap {
    aliases
        .iter()
        .filter_map(|(alias, columns)| {
            let kept: IndexMap<String, String> = columns
                .iter()
                .filter(|(_, physical)| schema.contains(*physical))
                .map(|(logical, physical)| (logical.clone(), physical.clone()))
                .collect();
            (!kept.is_empty()).then(|| (alias.clone(), kept))
        })
        .collect()
}

/// Merge alias maps from two sides, keeping entries that still point into
/// `schema`. On an alias name clash the right side wins.
pub(crate) fn merge_aliases(left: &AliasMap, right: &AliasMap, schema: &[String]) -> AliasMap {
    let mut merged = restrict_aliases(left, schema);
    for (alias, columns) in restrict_aliases(right, schema) {
        merged.insert(alias, columns);
    }
    merged
}

/// Hashable identity of a cell for set-semantic row comparison: exact type
/// and value, floats by bit pattern, two absent cells equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Integer(i64),
    Float(u64),
    Boolean(bool),
    String(String),
}

pub(crate) fn value_key(value: &Literal) -> ValueKey {
    match value {
        Literal::Null => ValueKey::Null,
        Literal::Integer(i) => ValueKey::Integer(*i),
        Literal::Float(v) => ValueKey::Float(v.to_bits()),
        Literal::Boolean(b) => ValueKey::Boolean(*b),
        Literal::String(s) => ValueKey::String(s.clone()),
    }
}

pub(crate) fn row_key(values: &[Literal]) -> Vec<ValueKey> {
    values.iter().map(value_key).collect()
}

pub(crate) fn values_equal(a: &Literal, b: &Literal) -> bool {
    value_key(a) == value_key(b)
}

fn lowercase(names: Vec<String>) -> Vec<String> {
    names.into_iter().map(|n| n.to_lowercase()).collect()
}
