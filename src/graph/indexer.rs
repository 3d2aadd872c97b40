use crate::core::column::EntityColumn;
use crate::query::rows::LabelSet;
use std::collections::HashMap;

/// Global ordinals for the labels fetched for one request.
///
/// Columns are numbered in request order and labels in first-seen order,
/// sharing one counter, so `(position, label)` identifies a node even when
/// two columns observe the same label text.
///
/// # Examples
///
/// ```
/// use sankey_engine::graph::indexer::LabelIndex;
/// use sankey_engine::query::rows::LabelSet;
/// use sankey_engine::core::column::EntityColumn;
///
/// let index = LabelIndex::build(&[
///     LabelSet::new(EntityColumn::new("frontend"), vec!["a".into(), "b".into()]),
///     LabelSet::new(EntityColumn::new("solver"), vec!["a".into()]),
/// ]);
/// assert_eq!(index.len(), 3);
/// assert_eq!(index.ordinal(0, "b"), Some(1));
/// assert_eq!(index.ordinal(1, "a"), Some(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    columns: Vec<EntityColumn>,
    labels: Vec<Vec<String>>,
    offsets: Vec<usize>,
    ordinals: HashMap<(usize, String), usize>,
    positions: HashMap<EntityColumn, usize>,
}

impl LabelIndex {
    pub fn build(label_sets: &[LabelSet]) -> Self {
        let mut index = Self::default();
        let mut next = 0;

        for (position, set) in label_sets.iter().enumerate() {
            index.positions.entry(set.column.clone()).or_insert(position);
            index.columns.push(set.column.clone());
            index.offsets.push(next);

            let mut labels = Vec::with_capacity(set.labels.len());
            for label in &set.labels {
                // duplicates keep their first ordinal
                if index.ordinals.contains_key(&(position, label.clone())) {
                    continue;
                }
                index.ordinals.insert((position, label.clone()), next);
                labels.push(label.clone());
                next += 1;
            }
            index.labels.push(labels);
        }
        index
    }

    /// Total number of nodes across all columns.
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    pub fn columns(&self) -> &[EntityColumn] {
        &self.columns
    }

    /// Position of `column` within the request's column order.
    pub fn position(&self, column: &EntityColumn) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Distinct labels of the column at `position`, first-seen order.
    pub fn labels(&self, position: usize) -> &[String] {
        self.labels.get(position).map(|l| l.as_slice()).unwrap_or(&[])
    }

    /// Global ordinal of the first label in the column at `position`.
    pub fn offset(&self, position: usize) -> Option<usize> {
        self.offsets.get(position).copied()
    }

    pub fn ordinal(&self, position: usize, label: &str) -> Option<usize> {
        self.ordinals.get(&(position, label.to_string())).copied()
    }
}
