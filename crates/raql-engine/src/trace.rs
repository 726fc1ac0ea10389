//! Structured per-operator trace records, appended in evaluation order
//! (post-order over the AST). The whole trace serializes to the JSON wire
//! shape consumed by teaching front-ends.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use raql_parser::ast::Literal;

use crate::relation::Relation;

/// Preview rows kept per step.
pub const PREVIEW_ROWS: usize = 10;

/// Operator tag of a trace record, serialized as its glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum TraceOp {
    #[serde(rename = "rel")]
    #[strum(to_string = "rel")]
    Rel,
    #[serde(rename = "π")]
    #[strum(to_string = "π")]
    Project,
    #[serde(rename = "σ")]
    #[strum(to_string = "σ")]
    Select,
    #[serde(rename = "ρ")]
    #[strum(to_string = "ρ")]
    Rename,
    #[serde(rename = "⋈")]
    #[strum(to_string = "⋈")]
    NaturalJoin,
    #[serde(rename = "⋈_θ")]
    #[strum(to_string = "⋈_θ")]
    ThetaJoin,
    #[serde(rename = "×")]
    #[strum(to_string = "×")]
    Product,
    #[serde(rename = "∪")]
    #[strum(to_string = "∪")]
    Union,
    #[serde(rename = "−")]
    #[strum(to_string = "−")]
    Difference,
    #[serde(rename = "∩")]
    #[strum(to_string = "∩")]
    Intersection,
    #[serde(rename = "÷")]
    #[strum(to_string = "÷")]
    Division,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub op: TraceOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<StepDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<InputSchema>,
    pub output_schema: Vec<String>,
    pub delta: Delta,
    pub preview: Vec<PreviewRow>,
}

/// Attribute → value maps for up to [PREVIEW_ROWS] rows, no provenance.
pub type PreviewRow = IndexMap<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputSchema {
    Single(Vec<String>),
    Pair {
        left: Vec<String>,
        right: Vec<String>,
    },
}

/// Operator-specific payload of a trace record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepDetail {
    Name(String),
    Attrs {
        attrs: Vec<String>,
    },
    Cond {
        cond: String,
    },
    Renames {
        renames: Vec<(String, String)>,
        relation: Option<String>,
    },
    On {
        on: Vec<String>,
    },
    Division {
        quotient_attrs: Vec<String>,
        divisor_attrs: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_before: Option<usize>,
    pub rows_after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Delta {
    pub fn new(rows_after: usize) -> Delta {
        Delta {
            rows_before: None,
            rows_after,
            note: None,
        }
    }

    pub fn narrowing(rows_before: usize, rows_after: usize, note: &str) -> Delta {
        Delta {
            rows_before: Some(rows_before),
            rows_after,
            note: Some(note.to_string()),
        }
    }
}

/// The ordered, append-only list of per-operator records.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(transparent)]
pub struct Trace(pub Vec<TraceStep>);

impl Trace {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.0
    }

    pub(crate) fn push(&mut self, step: TraceStep) {
        self.0.push(step);
    }
}

/// Up to [PREVIEW_ROWS] output rows as attribute → JSON value maps.
pub(crate) fn preview(relation: &Relation) -> Vec<PreviewRow> {
    relation
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            relation
                .schema
                .iter()
                .cloned()
                .zip(row.values.iter().map(json_value))
                .collect()
        })
        .collect()
}

fn json_value(value: &Literal) -> JsonValue {
    match value {
        Literal::Null => JsonValue::Null,
        Literal::Integer(i) => JsonValue::from(*i),
        Literal::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Literal::Boolean(b) => JsonValue::Bool(*b),
        Literal::String(s) => JsonValue::String(s.clone()),
    }
}
