use crate::core::error::EngineError;
use crate::graph::color::is_hex_color;
use crate::graph::links::LinkTotals;
use crate::graph::regroup::Node;
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Block-time span covered by a graph. Aggregated tables carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Parallel link arrays: link `i` flows `value[i]` from node `source[i]`
/// to node `target[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SankeyLinks {
    pub source: Vec<usize>,
    pub target: Vec<usize>,
    #[serde(with = "volumes_serde")]
    pub value: Vec<Decimal>,
}

/// Volumes are exact internally and plain JSON numbers on the wire.
mod volumes_serde {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::de::{self, Deserialize};
    use serde::ser::{self, SerializeSeq};

    pub fn serialize<S: serde::Serializer>(
        values: &[Decimal],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            let float = value
                .to_f64()
                .ok_or_else(|| ser::Error::custom(format!("volume {value} is not representable")))?;
            seq.serialize_element(&float)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Decimal>, D::Error> {
        Vec::<f64>::deserialize(deserializer)?
            .into_iter()
            .map(|v| Decimal::try_from(v).map_err(de::Error::custom))
            .collect()
    }
}

/// The response body of a graph request.
///
/// `labels` and `colors` are index-aligned; link endpoints index into both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SankeyGraph {
    pub entity_filter: String,
    pub links: SankeyLinks,
    pub labels: Vec<String>,
    pub colors: Vec<String>,
    pub range: Option<TimeRange>,
}

impl SankeyGraph {
    pub fn assemble(
        entity_filter: impl Into<String>,
        nodes: &[Node],
        colors: Vec<String>,
        totals: &LinkTotals,
    ) -> Self {
        let mut links = SankeyLinks::default();
        for (&(source, target), &volume) in totals {
            links.source.push(source);
            links.target.push(target);
            links.value.push(volume);
        }
        Self {
            entity_filter: entity_filter.into(),
            links,
            labels: nodes.iter().map(|n| n.label.clone()).collect(),
            colors,
            range: None,
        }
    }

    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.source.len()
    }

    /// Sum of all link values, saturating at `Decimal::MAX`.
    pub fn total_volume(&self) -> Decimal {
        self.links
            .value
            .iter()
            .fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// Check the structural invariants a renderer relies on.
    pub fn validate(&self) -> Result<(), EngineError> {
        let corrupt = |msg: String| Err(EngineError::CorruptGraph(msg));
        let n = self.labels.len();

        if self.colors.len() != n {
            return corrupt(format!("{} colors for {} labels", self.colors.len(), n));
        }
        if let Some(bad) = self.colors.iter().find(|c| !is_hex_color(c)) {
            return corrupt(format!("malformed color {bad:?}"));
        }

        let links = &self.links;
        if links.target.len() != links.source.len() || links.value.len() != links.source.len() {
            return corrupt(format!(
                "link arrays differ in length ({}/{}/{})",
                links.source.len(),
                links.target.len(),
                links.value.len()
            ));
        }

        let mut graph = DiGraph::<(), ()>::with_capacity(n, links.source.len());
        let ids: Vec<_> = (0..n).map(|_| graph.add_node(())).collect();
        let mut seen = HashSet::new();

        for ((&s, &t), &v) in links.source.iter().zip(&links.target).zip(&links.value) {
            if s >= n || t >= n {
                return corrupt(format!("link {s} -> {t} out of range for {n} nodes"));
            }
            if !seen.insert((s, t)) {
                return corrupt(format!("duplicate link {s} -> {t}"));
            }
            if v.is_sign_negative() && !v.is_zero() {
                return corrupt(format!("negative volume {v} on link {s} -> {t}"));
            }
            graph.add_edge(ids[s], ids[t], ());
        }

        if is_cyclic_directed(&graph) {
            return corrupt("links form a cycle".to_string());
        }
        Ok(())
    }
}
