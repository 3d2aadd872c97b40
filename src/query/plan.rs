use crate::core::column::{EntityColumn, FlowUniverse, VOLUME_COLUMN};
use crate::core::filter::FlowRequest;

/// Prefix of every cache key derived from query text.
pub const CACHE_KEY_PREFIX: &str = "sql:";

/// What an aggregate query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Distinct non-empty labels of one column.
    Labels { column: EntityColumn },
    /// Summed volume per (source label, target label) for a column pair.
    ///
    /// `gap` lists the columns strictly between `source` and `target`; all of
    /// them must be empty for a row to count.
    Links {
        source: EntityColumn,
        target: EntityColumn,
        gap: Vec<EntityColumn>,
    },
}

/// A single aggregate query against one flow table.
///
/// The SQL text is the query's identity: it is what the store executes and
/// what the cache is keyed by. The structured parts are kept alongside so
/// in-process stores can evaluate the same semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    kind: QueryKind,
    universe: FlowUniverse,
    restrictions: Vec<(EntityColumn, Vec<String>)>,
    sql: String,
}

impl Query {
    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }

    pub fn universe(&self) -> FlowUniverse {
        self.universe
    }

    /// Conjunction of per-column disjunctions applied to every row.
    pub fn restrictions(&self) -> &[(EntityColumn, Vec<String>)] {
        &self.restrictions
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn cache_key(&self) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, self.sql)
    }
}

/// Every query needed to answer one [`FlowRequest`].
///
/// One label query per graph column and one link query per ordered column
/// pair, so `n` columns cost `n + n(n-1)/2` queries. Six columns (the widest
/// universe) means 21 queries per cold request.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    columns: Vec<EntityColumn>,
    label_queries: Vec<Query>,
    link_queries: Vec<Query>,
    entity_filter: String,
}

impl QueryPlan {
    /// Build the plan. Pure and deterministic in `request`.
    pub fn build(request: &FlowRequest) -> Self {
        let universe = request.universe();
        let table = universe.table();
        let columns = request.columns().to_vec();
        let restrictions = request.restrictions();
        let entity_filter = render_entity_filter(&restrictions);
        let filter_sql = if entity_filter.is_empty() {
            String::new()
        } else {
            format!(" AND {}", entity_filter)
        };

        let mut label_queries = Vec::with_capacity(columns.len());
        let mut link_queries = Vec::new();

        for (i, source) in columns.iter().enumerate() {
            label_queries.push(Query {
                kind: QueryKind::Labels {
                    column: source.clone(),
                },
                universe,
                restrictions: restrictions.clone(),
                sql: format!(
                    "SELECT DISTINCT {c} FROM {table} WHERE {c} != '' AND {VOLUME_COLUMN} != 0{filter_sql}",
                    c = source,
                ),
            });

            for j in (i + 1)..columns.len() {
                let target = &columns[j];
                let gap: Vec<EntityColumn> = columns[i + 1..j].to_vec();
                let gap_sql: String = gap.iter().map(|c| format!(" AND {} = ''", c)).collect();

                link_queries.push(Query {
                    kind: QueryKind::Links {
                        source: source.clone(),
                        target: target.clone(),
                        gap,
                    },
                    universe,
                    restrictions: restrictions.clone(),
                    sql: format!(
                        "SELECT {s} AS source, {t} AS target, SUM({VOLUME_COLUMN}) AS value \
                         FROM {table} WHERE {s} != '' AND {t} != '' AND {VOLUME_COLUMN} != 0\
                         {gap_sql}{filter_sql} GROUP BY source, target",
                        s = source,
                        t = target,
                    ),
                });
            }
        }

        log::debug!(
            "planned {} label + {} link queries over {} columns of {}",
            label_queries.len(),
            link_queries.len(),
            columns.len(),
            universe
        );

        Self {
            columns,
            label_queries,
            link_queries,
            entity_filter,
        }
    }

    /// Graph columns in pipeline order; label query `i` targets column `i`.
    pub fn columns(&self) -> &[EntityColumn] {
        &self.columns
    }

    pub fn label_queries(&self) -> &[Query] {
        &self.label_queries
    }

    pub fn link_queries(&self) -> &[Query] {
        &self.link_queries
    }

    /// Rendered filter clause echoed back to clients; empty when unrestricted.
    pub fn entity_filter(&self) -> &str {
        &self.entity_filter
    }

    pub fn len(&self) -> usize {
        self.label_queries.len() + self.link_queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `((a = 'x' OR a = 'y') AND (b = 'z'))`, or empty without restrictions.
fn render_entity_filter(restrictions: &[(EntityColumn, Vec<String>)]) -> String {
    if restrictions.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = restrictions
        .iter()
        .map(|(column, labels)| {
            let terms: Vec<String> = labels
                .iter()
                .map(|l| format!("{} = {}", column, quote(l)))
                .collect();
            format!("({})", terms.join(" OR "))
        })
        .collect();
    format!("({})", clauses.join(" AND "))
}

/// Single-quoted SQL string literal with `\` and `'` escaped.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
