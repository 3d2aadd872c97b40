//! Synthetic flow data for demos, tests and benchmarks.
//!
//! Generates pre-aggregated rows shaped like the production tables: each row
//! names one entity per column (or leaves it blank) and carries a positive
//! volume. Label popularity is skewed so that a handful of entities dominate
//! each column and the long tail exercises the Other buckets.

use crate::backend::memory::FlowRow;
use crate::core::column::{FlowUniverse, VOLUME_COLUMN};
use crate::query::rows::parse_volume;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Configuration for generating a synthetic flow table.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub universe: FlowUniverse,
    /// Number of rows to generate.
    pub rows: usize,
    /// Distinct labels available per column.
    pub labels_per_column: usize,
    /// Chance that a row leaves a column blank.
    pub blank_probability: f64,
    pub min_volume: Decimal,
    pub max_volume: Decimal,
    /// Fixed seed for reproducible output.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            universe: FlowUniverse::Orderflow,
            rows: 1_000,
            labels_per_column: 40,
            blank_probability: 0.2,
            min_volume: Decimal::from(10),
            max_volume: Decimal::from(5_000_000),
            seed: None,
        }
    }
}

/// Label used for the `i`-th entity of `column`.
pub fn synthetic_label(column: &str, i: usize) -> String {
    format!("{}-{:03}", column, i)
}

/// Generate a random flow table.
pub fn generate_rows(config: &SyntheticConfig) -> Vec<FlowRow> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let columns = config.universe.column_names();
    let labels = config.labels_per_column.max(1);

    let min_f64: f64 = config.min_volume.to_string().parse().unwrap_or(10.0);
    let max_f64: f64 = config.max_volume.to_string().parse().unwrap_or(5_000_000.0);
    let (low, high) = if min_f64 < max_f64 {
        (min_f64, max_f64)
    } else {
        (min_f64, min_f64 + 1.0)
    };

    let mut rows = Vec::with_capacity(config.rows);
    while rows.len() < config.rows {
        let mut entities: Vec<(String, String)> = Vec::with_capacity(columns.len());
        for column in columns {
            if rng.gen_bool(config.blank_probability.clamp(0.0, 1.0)) {
                continue;
            }
            // squaring skews picks toward low indices
            let u: f64 = rng.gen();
            let i = ((u * u) * labels as f64) as usize;
            entities.push((column.to_string(), synthetic_label(column, i.min(labels - 1))));
        }

        let volume = Decimal::from_f64_retain(rng.gen_range(low..high))
            .unwrap_or(Decimal::ONE)
            .round_dp(2);

        if volume > Decimal::ZERO {
            rows.push(FlowRow::new(entities, volume));
        }
    }
    rows
}

/// Flatten a row into the table's JSONEachRow shape: every column of the
/// universe present (blank when unset) plus `total_volume`.
pub fn to_table_row(universe: FlowUniverse, row: &FlowRow) -> Value {
    let mut out = Map::new();
    for column in universe.column_names() {
        out.insert(column.to_string(), Value::String(row.get(column).to_string()));
    }
    let volume = row
        .volume
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::String(row.volume.to_string()));
    out.insert(VOLUME_COLUMN.to_string(), volume);
    Value::Object(out)
}

/// Read a row in table shape back, ignoring fields that are not columns of
/// `universe`. `None` when the volume is missing or not numeric.
pub fn from_table_row(universe: FlowUniverse, value: &Value) -> Option<FlowRow> {
    let fields = value.as_object()?;
    let volume = fields.get(VOLUME_COLUMN).and_then(parse_volume)?;
    let entities = universe.column_names().iter().filter_map(|column| {
        fields
            .get(*column)
            .and_then(Value::as_str)
            .filter(|label| !label.is_empty())
            .map(|label| (column.to_string(), label.to_string()))
    });
    Some(FlowRow::new(entities, volume))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_row_shape() {
        let row = FlowRow::new([("solver", "s"), ("pmm", "p")], dec!(12.5));
        let flat = to_table_row(FlowUniverse::Liquidity, &row);
        assert_eq!(flat["solver"], "s");
        assert_eq!(flat["frontend"], "");
        assert_eq!(flat["total_volume"], 12.5);
        assert_eq!(from_table_row(FlowUniverse::Liquidity, &flat), Some(row));
        assert_eq!(from_table_row(FlowUniverse::Liquidity, &Value::Null), None);
    }

    #[test]
    fn test_generation_respects_config() {
        let config = SyntheticConfig {
            rows: 300,
            labels_per_column: 7,
            seed: Some(42),
            ..Default::default()
        };
        let rows = generate_rows(&config);
        assert_eq!(rows.len(), 300);
        for row in &rows {
            assert!(row.volume > Decimal::ZERO);
            assert!(row.volume <= config.max_volume);
            for (column, label) in &row.entities {
                assert!(config.universe.resolve(column).is_some());
                assert!(label.starts_with(column.as_str()));
            }
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = SyntheticConfig {
            rows: 50,
            seed: Some(7),
            universe: FlowUniverse::Liquidity,
            ..Default::default()
        };
        assert_eq!(generate_rows(&config), generate_rows(&config));
    }

    #[test]
    fn test_popularity_is_skewed() {
        let config = SyntheticConfig {
            rows: 2_000,
            labels_per_column: 50,
            blank_probability: 0.0,
            seed: Some(1),
            ..Default::default()
        };
        let rows = generate_rows(&config);
        let head = rows
            .iter()
            .filter(|r| r.get("solver") == synthetic_label("solver", 0))
            .count();
        let tail = rows
            .iter()
            .filter(|r| r.get("solver") == synthetic_label("solver", 49))
            .count();
        assert!(head > tail);
    }
}
