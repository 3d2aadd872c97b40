//! Typed views over the raw JSON rows returned by a store.
//!
//! Decoding is strict: a row missing an expected field is an
//! [`EngineError::MalformedRows`], never silently skipped, so a bad store
//! response cannot turn into a misaligned graph.

use crate::core::column::EntityColumn;
use crate::core::error::EngineError;
use crate::query::plan::{Query, QueryKind};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashSet;

/// Distinct labels observed for one column, in query-result order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pub column: EntityColumn,
    pub labels: Vec<String>,
}

impl LabelSet {
    pub fn new(column: EntityColumn, labels: Vec<String>) -> Self {
        Self { column, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Volume observed flowing from a source label to a target label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub source: String,
    pub target: String,
    pub volume: Decimal,
}

/// All raw links returned by one column-pair query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRows {
    pub source: EntityColumn,
    pub target: EntityColumn,
    pub links: Vec<RawLink>,
}

/// Decode the rows of a label query.
///
/// Accepts `{"<column>": "x"}` (JSONEachRow), `["x"]` (compact rows) and
/// bare strings. Empty labels and repeats are dropped, first occurrence wins.
pub fn decode_labels(query: &Query, rows: &[Value]) -> Result<LabelSet, EngineError> {
    let column = match query.kind() {
        QueryKind::Labels { column } => column,
        QueryKind::Links { .. } => {
            return Err(EngineError::malformed(query.sql(), "expected a label query"))
        }
    };

    let mut seen: HashSet<&str> = HashSet::with_capacity(rows.len());
    let mut labels: Vec<String> = Vec::with_capacity(rows.len());
    for row in rows {
        let label = match row {
            Value::String(s) => Some(s.as_str()),
            Value::Array(cells) => cells.first().and_then(Value::as_str),
            Value::Object(fields) => fields.get(column.as_str()).and_then(Value::as_str),
            _ => None,
        }
        .ok_or_else(|| {
            EngineError::malformed(query.sql(), format!("row without a '{}' label: {}", column, row))
        })?;

        if !label.is_empty() && seen.insert(label) {
            labels.push(label.to_string());
        }
    }

    Ok(LabelSet::new(column.clone(), labels))
}

/// Decode the `{source, target, value}` rows of a link query.
pub fn decode_links(query: &Query, rows: &[Value]) -> Result<LinkRows, EngineError> {
    let (source, target) = match query.kind() {
        QueryKind::Links { source, target, .. } => (source, target),
        QueryKind::Labels { .. } => {
            return Err(EngineError::malformed(query.sql(), "expected a link query"))
        }
    };

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let field = |name: &str| row.get(name);
        let label = |name: &str| {
            field(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::malformed(query.sql(), format!("row without '{}': {}", name, row))
                })
        };

        let volume = match field("value") {
            Some(value) => match parse_volume(value) {
                Some(volume) => volume,
                None if is_finite_number(value) => {
                    return Err(EngineError::VolumeOverflow {
                        context: format!("`{}` value {}", query.sql(), value),
                    })
                }
                None => {
                    return Err(EngineError::malformed(
                        query.sql(),
                        format!("row without a numeric 'value': {}", row),
                    ))
                }
            },
            None => {
                return Err(EngineError::malformed(
                    query.sql(),
                    format!("row without a 'value': {}", row),
                ))
            }
        };
        if volume < Decimal::ZERO {
            return Err(EngineError::malformed(
                query.sql(),
                format!("negative volume {}", volume),
            ));
        }

        links.push(RawLink {
            source: label("source")?,
            target: label("target")?,
            volume,
        });
    }

    Ok(LinkRows {
        source: source.clone(),
        target: target.clone(),
        links,
    })
}

/// Parse a JSON number (or numeric string, as some stores quote wide
/// numbers) into an exact decimal.
pub fn parse_volume(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// A finite number, whether or not it fits a decimal.
fn is_finite_number(value: &Value) -> bool {
    let float = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float.map_or(false, f64::is_finite)
}
