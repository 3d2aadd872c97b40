use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the aggregate volume column shared by both flow tables.
pub const VOLUME_COLUMN: &str = "total_volume";

/// A categorical dimension of the flow data (e.g. `solver`, `builder`).
///
/// Columns of a [`FlowUniverse`] form an ordered pipeline from upstream
/// (where an order enters) to downstream (where it lands on chain).
///
/// # Examples
///
/// ```
/// use sankey_engine::core::column::EntityColumn;
///
/// let solver = EntityColumn::new("solver");
/// assert_eq!(solver.other_label(), "Other (solver)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityColumn(String);

impl EntityColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label of the synthetic bucket absorbing this column's long tail.
    pub fn other_label(&self) -> String {
        format!("Other ({})", self.0)
    }
}

impl fmt::Display for EntityColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityColumn {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

const ORDERFLOW_COLUMNS: &[&str] = &[
    "frontend",
    "metaaggregator",
    "solver",
    "mempool",
    "ofa",
    "builder",
];

const LIQUIDITY_COLUMNS: &[&str] = &[
    "frontend",
    "metaaggregator",
    "solver",
    "aggregator",
    "liquidity_src",
    "pmm",
];

/// Filter keys sent by older clients regardless of universe; each one
/// restricts the column at the same pipeline position.
const LEGACY_FILTER_KEYS: &[&str] = &[
    "frontend",
    "metaAggregator",
    "solver",
    "mempool",
    "ofa",
    "builder",
];

/// One of the two disjoint flow datasets a request can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowUniverse {
    /// Order flow: frontend → ... → block builder.
    Orderflow,
    /// Liquidity: frontend → ... → liquidity source / PMM.
    Liquidity,
}

impl FlowUniverse {
    /// Fully qualified aggregated table holding this universe's rows.
    pub fn table(&self) -> &'static str {
        match self {
            FlowUniverse::Orderflow => "orderflow.prodof_aggregated",
            FlowUniverse::Liquidity => "orderflow.prodlq_aggregated",
        }
    }

    /// Column names in pipeline order.
    pub fn column_names(&self) -> &'static [&'static str] {
        match self {
            FlowUniverse::Orderflow => ORDERFLOW_COLUMNS,
            FlowUniverse::Liquidity => LIQUIDITY_COLUMNS,
        }
    }

    /// Columns in pipeline order.
    pub fn columns(&self) -> Vec<EntityColumn> {
        self.column_names().iter().map(|c| EntityColumn::new(*c)).collect()
    }

    /// Resolve a column by name, accepting the legacy camelCase alias
    /// `metaAggregator` used by older clients.
    pub fn resolve(&self, name: &str) -> Option<EntityColumn> {
        let name = match name {
            "metaAggregator" => "metaaggregator",
            other => other,
        };
        self.column_names()
            .iter()
            .find(|c| **c == name)
            .map(|c| EntityColumn::new(*c))
    }

    /// Resolve a query-string filter key: a column name of this universe,
    /// or one of the legacy keys, which map to columns by position. In the
    /// liquidity universe `mempool`, `ofa` and `builder` therefore restrict
    /// `aggregator`, `liquidity_src` and `pmm`.
    pub fn resolve_filter_key(&self, key: &str) -> Option<EntityColumn> {
        self.resolve(key).or_else(|| {
            LEGACY_FILTER_KEYS
                .iter()
                .position(|k| *k == key)
                .and_then(|i| self.column_names().get(i))
                .map(|c| EntityColumn::new(*c))
        })
    }

    /// True when `name` is a column of either universe.
    pub fn is_column_name(name: &str) -> bool {
        [FlowUniverse::Orderflow, FlowUniverse::Liquidity]
            .iter()
            .any(|u| u.resolve(name).is_some())
    }

    /// Pipeline position of a column, if it belongs to this universe.
    pub fn position(&self, column: &EntityColumn) -> Option<usize> {
        self.column_names().iter().position(|c| *c == column.as_str())
    }
}

impl fmt::Display for FlowUniverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowUniverse::Orderflow => write!(f, "orderflow"),
            FlowUniverse::Liquidity => write!(f, "liquidity"),
        }
    }
}
