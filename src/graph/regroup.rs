//! Top-N regrouping of each column's labels.
//!
//! Every column keeps at most `top_n` labels by link volume; the long tail
//! collapses into a single `Other (<column>)` node. Volume is accounted per
//! node, so a label shared by two columns is ranked separately in each.

use crate::core::column::EntityColumn;
use crate::core::error::EngineError;
use crate::graph::indexer::LabelIndex;
use crate::graph::links::{accumulate, resolve_endpoints};
use crate::query::rows::LinkRows;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_N: usize = 20;

/// A node of the final graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub column: EntityColumn,
    pub label: String,
    /// Synthetic long-tail bucket rather than an observed label.
    pub is_other: bool,
}

/// Final nodes and the mapping from label ordinals onto them.
///
/// # Examples
///
/// ```
/// use sankey_engine::graph::indexer::LabelIndex;
/// use sankey_engine::graph::regroup::Regrouping;
/// use sankey_engine::query::rows::{LabelSet, LinkRows, RawLink};
/// use sankey_engine::core::column::EntityColumn;
/// use rust_decimal_macros::dec;
///
/// let frontend = EntityColumn::new("frontend");
/// let solver = EntityColumn::new("solver");
/// let index = LabelIndex::build(&[
///     LabelSet::new(frontend.clone(), vec!["a".into(), "b".into(), "c".into()]),
///     LabelSet::new(solver.clone(), vec!["s".into()]),
/// ]);
/// let links = vec![LinkRows {
///     source: frontend,
///     target: solver,
///     links: vec![
///         RawLink { source: "a".into(), target: "s".into(), volume: dec!(1) },
///         RawLink { source: "b".into(), target: "s".into(), volume: dec!(5) },
///         RawLink { source: "c".into(), target: "s".into(), volume: dec!(3) },
///     ],
/// }];
///
/// let regrouped = Regrouping::compute(&index, &links, 2).unwrap();
/// assert_eq!(regrouped.labels(), vec!["b", "c", "Other (frontend)", "s"]);
/// ```
#[derive(Debug, Clone)]
pub struct Regrouping {
    nodes: Vec<Node>,
    /// label ordinal -> node index; `None` for labels carrying no links in a
    /// column without an Other bucket
    remap: Vec<Option<usize>>,
    top_n: usize,
}

impl Regrouping {
    pub fn compute(
        index: &LabelIndex,
        links: &[LinkRows],
        top_n: usize,
    ) -> Result<Self, EngineError> {
        // None marks a label that never appears as a link endpoint
        let mut volumes: Vec<Option<Decimal>> = vec![None; index.len()];
        for rows in links {
            for link in &rows.links {
                let (source, target) = resolve_endpoints(index, rows, link)?;
                for (ordinal, column, label) in [
                    (source, &rows.source, &link.source),
                    (target, &rows.target, &link.target),
                ] {
                    let total = volumes[ordinal].get_or_insert(Decimal::ZERO);
                    accumulate(total, link.volume, || format!("{} node '{}'", column, label))?;
                }
            }
        }

        let mut nodes = Vec::new();
        let mut remap = vec![None; index.len()];

        for (position, column) in index.columns().iter().enumerate() {
            let labels = index.labels(position);
            let offset = index.offset(position).unwrap_or(0);

            let mut ranked: Vec<(usize, Decimal)> = (offset..offset + labels.len())
                .filter_map(|ordinal| volumes[ordinal].map(|v| (ordinal, v)))
                .collect();
            // stable: ties keep first-seen order
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            ranked.truncate(top_n);

            for (ordinal, _) in ranked {
                remap[ordinal] = Some(nodes.len());
                nodes.push(Node {
                    column: column.clone(),
                    label: labels[ordinal - offset].clone(),
                    is_other: false,
                });
            }

            if labels.len() > top_n {
                let other = nodes.len();
                nodes.push(Node {
                    column: column.clone(),
                    label: column.other_label(),
                    is_other: true,
                });
                for slot in &mut remap[offset..offset + labels.len()] {
                    slot.get_or_insert(other);
                }
            }
        }

        log::debug!(
            "regrouped {} labels into {} nodes (top {})",
            index.len(),
            nodes.len(),
            top_n
        );

        Ok(Self {
            nodes,
            remap,
            top_n,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Node index a label ordinal was regrouped into.
    pub fn remap(&self, ordinal: usize) -> Option<usize> {
        self.remap.get(ordinal).copied().flatten()
    }

    /// Node labels in final index order.
    pub fn labels(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.label.clone()).collect()
    }

    /// Whether `column` received an Other bucket.
    pub fn has_other(&self, column: &EntityColumn) -> bool {
        self.nodes
            .iter()
            .any(|n| n.is_other && &n.column == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::rows::{LabelSet, RawLink};
    use rust_decimal_macros::dec;

    fn col(name: &str) -> EntityColumn {
        EntityColumn::new(name)
    }

    fn link(source: &str, target: &str, volume: Decimal) -> RawLink {
        RawLink {
            source: source.into(),
            target: target.into(),
            volume,
        }
    }

    /// `n` frontends `f0..fn` each sending `i + 1` to one solver.
    fn wide(n: usize) -> (LabelIndex, Vec<LinkRows>) {
        let frontends: Vec<String> = (0..n).map(|i| format!("f{i}")).collect();
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), frontends.clone()),
            LabelSet::new(col("solver"), vec!["s".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("solver"),
            links: frontends
                .iter()
                .enumerate()
                .map(|(i, f)| link(f, "s", Decimal::from(i as u64 + 1)))
                .collect(),
        }];
        (index, links)
    }

    #[test]
    fn test_other_bucket_only_when_over_limit() {
        let (index, links) = wide(20);
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        assert_eq!(r.len(), 21);
        assert!(!r.has_other(&col("frontend")));

        let (index, links) = wide(21);
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        assert_eq!(r.len(), 22);
        assert!(r.has_other(&col("frontend")));
        assert_eq!(r.nodes()[20].label, "Other (frontend)");
        // smallest volume (f0) fell into the bucket
        assert_eq!(r.remap(index.ordinal(0, "f0").unwrap()), Some(20));
    }

    #[test]
    fn test_ranked_by_volume_with_stable_ties() {
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), vec!["a".into(), "b".into(), "c".into()]),
            LabelSet::new(col("solver"), vec!["s".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("solver"),
            links: vec![
                link("a", "s", dec!(2)),
                link("b", "s", dec!(7)),
                link("c", "s", dec!(2)),
            ],
        }];
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        assert_eq!(r.labels(), vec!["b", "a", "c", "s"]);
    }

    #[test]
    fn test_volume_is_keyed_by_column() {
        // "x" is small as a frontend and large as a solver
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), vec!["x".into(), "y".into()]),
            LabelSet::new(col("solver"), vec!["x".into(), "z".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("solver"),
            links: vec![link("x", "z", dec!(1)), link("y", "x", dec!(10))],
        }];
        let r = Regrouping::compute(&index, &links, 1).unwrap();
        let frontend: Vec<_> = r.nodes().iter().filter(|n| n.column == col("frontend")).collect();
        let solver: Vec<_> = r.nodes().iter().filter(|n| n.column == col("solver")).collect();
        assert_eq!(frontend[0].label, "y");
        assert_eq!(solver[0].label, "x");
    }

    #[test]
    fn test_label_without_links_is_dropped_below_limit() {
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), vec!["a".into(), "idle".into()]),
            LabelSet::new(col("solver"), vec!["s".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("solver"),
            links: vec![link("a", "s", dec!(1))],
        }];
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        assert_eq!(r.labels(), vec!["a", "s"]);
        assert_eq!(r.remap(index.ordinal(0, "idle").unwrap()), None);
    }

    #[test]
    fn test_real_label_named_like_bucket_stays_distinct() {
        let labels: Vec<String> = vec!["Other (frontend)".into(), "a".into(), "b".into()];
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), labels),
            LabelSet::new(col("solver"), vec!["s".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("solver"),
            links: vec![
                link("Other (frontend)", "s", dec!(9)),
                link("a", "s", dec!(1)),
                link("b", "s", dec!(1)),
            ],
        }];
        let r = Regrouping::compute(&index, &links, 1).unwrap();
        assert_eq!(r.len(), 3);
        assert!(!r.nodes()[0].is_other);
        assert!(r.nodes()[1].is_other);
        assert_ne!(r.remap(0), r.remap(1));
    }

    #[test]
    fn test_node_volume_overflow_is_an_error() {
        let big = Decimal::from_scientific("5e28").unwrap();
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), vec!["a".into(), "b".into()]),
            LabelSet::new(col("metaaggregator"), vec!["m".into()]),
        ]);
        let links = vec![LinkRows {
            source: col("frontend"),
            target: col("metaaggregator"),
            links: vec![link("a", "m", big), link("b", "m", big)],
        }];
        let err = Regrouping::compute(&index, &links, 20).unwrap_err();
        assert!(matches!(err, EngineError::VolumeOverflow { .. }));
        assert!(err.to_string().contains("metaaggregator node 'm'"));
    }

    #[test]
    fn test_unknown_endpoint_is_an_error() {
        let (index, mut links) = wide(2);
        links[0].links.push(link("ghost", "s", dec!(1)));
        let err = Regrouping::compute(&index, &links, 20).unwrap_err();
        assert!(matches!(err, EngineError::MalformedRows { .. }));
    }
}
