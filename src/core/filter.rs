use crate::core::column::{EntityColumn, FlowUniverse};
use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-column label restrictions plus columns hidden from the graph.
///
/// A column with no allowed labels is unrestricted. Restrictions on an
/// excluded column still apply to the rows feeding the graph.
///
/// # Examples
///
/// ```
/// use sankey_engine::core::filter::Filter;
///
/// let filter = Filter::new()
///     .allow("frontend", ["CoW Swap", "1inch"])
///     .exclude("mempool");
///
/// assert_eq!(filter.allowed(&"frontend".into()).len(), 2);
/// assert!(filter.is_excluded(&"mempool".into()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    allowed: BTreeMap<EntityColumn, Vec<String>>,
    excluded: BTreeSet<EntityColumn>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `column` to the given labels (in addition to any already allowed).
    pub fn allow<I, S>(mut self, column: impl Into<EntityColumn>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = column.into();
        for label in labels {
            self.allow_label(column.clone(), label);
        }
        self
    }

    /// Hide `column` from the graph.
    pub fn exclude(mut self, column: impl Into<EntityColumn>) -> Self {
        self.exclude_column(column.into());
        self
    }

    /// Add one allowed label. Empty labels and duplicates are ignored.
    pub fn allow_label(&mut self, column: EntityColumn, label: impl Into<String>) {
        let label = label.into();
        if label.is_empty() {
            return;
        }
        let labels = self.allowed.entry(column).or_default();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    /// Add an allowed label written as `column=label`.
    pub fn allow_assignment(&mut self, assignment: &str) -> Result<(), EngineError> {
        match assignment.split_once('=') {
            Some((column, label)) if !column.trim().is_empty() => {
                self.allow_label(EntityColumn::new(column.trim()), label);
                Ok(())
            }
            _ => Err(EngineError::InvalidParameter {
                name: "filter".into(),
                reason: format!("'{}' is not of the form column=label", assignment),
            }),
        }
    }

    pub fn exclude_column(&mut self, column: EntityColumn) {
        self.excluded.insert(column);
    }

    /// Allowed labels for a column, empty when unrestricted.
    pub fn allowed(&self, column: &EntityColumn) -> &[String] {
        self.allowed.get(column).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_excluded(&self, column: &EntityColumn) -> bool {
        self.excluded.contains(column)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed.values().all(|v| v.is_empty())
    }
}

/// A validated request for one Sankey graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    universe: FlowUniverse,
    filter: Filter,
    columns: Vec<EntityColumn>,
}

impl FlowRequest {
    /// Validate `filter` against the universe's schema.
    ///
    /// Column names are canonicalized (legacy aliases resolved). Fails when a
    /// column is unknown or fewer than two columns remain to pair.
    pub fn new(universe: FlowUniverse, filter: Filter) -> Result<Self, EngineError> {
        let resolve = |column: &EntityColumn| {
            universe
                .resolve(column.as_str())
                .ok_or_else(|| EngineError::UnknownColumn {
                    column: column.to_string(),
                    universe,
                })
        };

        let mut canonical = Filter::new();
        for (column, labels) in &filter.allowed {
            let column = resolve(column)?;
            for label in labels {
                canonical.allow_label(column.clone(), label.clone());
            }
        }
        for column in &filter.excluded {
            canonical.exclude_column(resolve(column)?);
        }

        let columns: Vec<EntityColumn> = universe
            .columns()
            .into_iter()
            .filter(|c| !canonical.is_excluded(c))
            .collect();
        if columns.len() < 2 {
            return Err(EngineError::TooFewColumns {
                remaining: columns.len(),
            });
        }

        Ok(Self {
            universe,
            filter: canonical,
            columns,
        })
    }

    /// Parse the repeated `key=value` pairs of the sankey endpoint.
    ///
    /// `isOrderflow=true` selects order flow (anything else selects
    /// liquidity) and `columns=<name>` excludes a column. Filter keys are
    /// column names or legacy positional keys (see
    /// [`FlowUniverse::resolve_filter_key`]). A key naming a column outside
    /// the selected universe is rejected; other keys are ignored.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, EngineError> {
        let universe = match pairs.iter().rev().find(|(k, _)| k == "isOrderflow") {
            Some((_, v)) if v == "true" => FlowUniverse::Orderflow,
            _ => FlowUniverse::Liquidity,
        };

        let mut filter = Filter::new();
        for (key, value) in pairs {
            match key.as_str() {
                "isOrderflow" => {}
                "columns" => {
                    if !value.is_empty() {
                        filter.exclude_column(EntityColumn::new(value.as_str()));
                    }
                }
                name => match universe.resolve_filter_key(name) {
                    Some(column) => filter.allow_label(column, value.as_str()),
                    None if FlowUniverse::is_column_name(name) => {
                        return Err(EngineError::UnknownColumn {
                            column: name.to_string(),
                            universe,
                        })
                    }
                    None => log::debug!("ignoring query parameter '{}'", name),
                },
            }
        }

        Self::new(universe, filter)
    }

    pub fn universe(&self) -> FlowUniverse {
        self.universe
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Columns that appear in the graph, in pipeline order.
    pub fn columns(&self) -> &[EntityColumn] {
        &self.columns
    }

    /// Active restrictions in pipeline order, excluded columns included.
    pub fn restrictions(&self) -> Vec<(EntityColumn, Vec<String>)> {
        self.universe
            .columns()
            .into_iter()
            .filter_map(|c| {
                let labels = self.filter.allowed(&c);
                if labels.is_empty() {
                    None
                } else {
                    Some((c.clone(), labels.to_vec()))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_filter_dedup_and_empty() {
        let filter = Filter::new().allow("solver", ["a", "", "a", "b"]);
        assert_eq!(filter.allowed(&"solver".into()), &["a".to_string(), "b".to_string()]);
        assert!(!filter.is_unrestricted());
        assert!(Filter::new().is_unrestricted());
    }

    #[test]
    fn test_request_drops_excluded_columns() {
        let req = FlowRequest::new(
            FlowUniverse::Orderflow,
            Filter::new().exclude("mempool").exclude("ofa"),
        )
        .unwrap();
        let names: Vec<&str> = req.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["frontend", "metaaggregator", "solver", "builder"]);
    }

    #[test]
    fn test_request_rejects_unknown_column() {
        let err = FlowRequest::new(FlowUniverse::Orderflow, Filter::new().allow("pmm", ["x"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { .. }));
    }

    #[test]
    fn test_request_rejects_too_few_columns() {
        let mut filter = Filter::new();
        for c in FlowUniverse::Liquidity.column_names().iter().skip(1) {
            filter = filter.exclude(*c);
        }
        let err = FlowRequest::new(FlowUniverse::Liquidity, filter).unwrap_err();
        assert!(matches!(err, EngineError::TooFewColumns { remaining: 1 }));
    }

    #[test]
    fn test_restrictions_follow_pipeline_order_and_keep_excluded() {
        let req = FlowRequest::new(
            FlowUniverse::Orderflow,
            Filter::new()
                .allow("builder", ["beaver"])
                .allow("frontend", ["x"])
                .exclude("builder"),
        )
        .unwrap();
        let r = req.restrictions();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].0.as_str(), "frontend");
        assert_eq!(r[1].0.as_str(), "builder");
    }

    #[test]
    fn test_from_query_pairs() {
        let req = FlowRequest::from_query_pairs(&pairs(&[
            ("isOrderflow", "true"),
            ("frontend", "CoW Swap"),
            ("frontend", "1inch"),
            ("metaAggregator", "x"),
            ("columns", "mempool"),
            ("solver", ""),
        ]))
        .unwrap();
        assert_eq!(req.universe(), FlowUniverse::Orderflow);
        assert_eq!(req.filter().allowed(&"frontend".into()).len(), 2);
        assert_eq!(req.filter().allowed(&"metaaggregator".into()), &["x".to_string()]);
        assert!(req.filter().allowed(&"solver".into()).is_empty());
        assert_eq!(req.columns().len(), 5);
    }

    #[test]
    fn test_from_query_pairs_defaults_to_liquidity() {
        let req = FlowRequest::from_query_pairs(&pairs(&[("pmm", "wintermute")])).unwrap();
        assert_eq!(req.universe(), FlowUniverse::Liquidity);
        assert_eq!(req.filter().allowed(&"pmm".into()), &["wintermute".to_string()]);

        // liquidity-only column names are rejected for order flow
        let err = FlowRequest::from_query_pairs(&pairs(&[("isOrderflow", "true"), ("pmm", "x")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_from_query_pairs_legacy_keys_in_liquidity() {
        let req = FlowRequest::from_query_pairs(&pairs(&[
            ("isOrderflow", "false"),
            ("builder", "wintermute"),
            ("mempool", "0x"),
            ("ofa", "uniswap"),
        ]))
        .unwrap();
        assert_eq!(req.universe(), FlowUniverse::Liquidity);
        assert_eq!(req.filter().allowed(&"pmm".into()), &["wintermute".to_string()]);
        assert_eq!(req.filter().allowed(&"aggregator".into()), &["0x".to_string()]);
        assert_eq!(req.filter().allowed(&"liquidity_src".into()), &["uniswap".to_string()]);
    }

    #[test]
    fn test_from_query_pairs_ignores_non_filter_keys() {
        let req = FlowRequest::from_query_pairs(&pairs(&[
            ("isOrderflow", "true"),
            ("timeframe", "30d"),
            ("frontend", "a"),
        ]))
        .unwrap();
        assert_eq!(req.universe(), FlowUniverse::Orderflow);
        assert_eq!(req.restrictions().len(), 1);
    }

    #[test]
    fn test_allow_assignment() {
        let mut filter = Filter::new();
        filter.allow_assignment("frontend=CoW Swap").unwrap();
        filter.allow_assignment("solver=a=b").unwrap();
        assert_eq!(filter.allowed(&"frontend".into()), &["CoW Swap".to_string()]);
        assert_eq!(filter.allowed(&"solver".into()), &["a=b".to_string()]);

        for bad in ["frontend", "=x"] {
            let err = filter.allow_assignment(bad).unwrap_err();
            assert!(matches!(err, EngineError::InvalidParameter { .. }));
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_from_query_pairs_unknown_excluded_column() {
        let err = FlowRequest::from_query_pairs(&pairs(&[
            ("isOrderflow", "true"),
            ("columns", "venue"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { .. }));
    }
}
