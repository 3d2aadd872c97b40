use crate::backend::{Cache, Store};
use crate::cache::executor::CachedExecutor;
use crate::cache::expiry::RefreshSchedule;
use crate::cache::retry::RetryPolicy;
use crate::core::error::EngineError;
use crate::core::filter::FlowRequest;
use crate::graph::color::ColorAssigner;
use crate::graph::indexer::LabelIndex;
use crate::graph::links::aggregate_links;
use crate::graph::regroup::{Regrouping, DEFAULT_TOP_N};
use crate::graph::sankey::SankeyGraph;
use crate::query::plan::QueryPlan;
use crate::query::rows::{decode_labels, decode_links, LabelSet, LinkRows};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Tunables of the graph pipeline.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub retry: RetryPolicy,
    pub schedule: RefreshSchedule,
    /// Real labels kept per column before the rest collapse into Other.
    pub top_n: usize,
    pub colors: ColorAssigner,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            schedule: RefreshSchedule::default(),
            top_n: DEFAULT_TOP_N,
            colors: ColorAssigner::default(),
        }
    }
}

/// Turns a [`FlowRequest`] into a [`SankeyGraph`].
///
/// Every query of the plan runs concurrently through the cache-aside
/// executor; the results are indexed, regrouped to the top labels per
/// column, summed, colored and validated. A request either yields a
/// complete graph or an error, never a partial graph.
pub struct FlowEngine {
    executor: CachedExecutor,
    schedule: RefreshSchedule,
    top_n: usize,
    colors: ColorAssigner,
}

impl FlowEngine {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, options: EngineOptions) -> Self {
        Self {
            executor: CachedExecutor::new(store, cache, options.retry),
            schedule: options.schedule,
            top_n: options.top_n,
            colors: options.colors,
        }
    }

    pub async fn sankey(&self, request: &FlowRequest) -> Result<SankeyGraph, EngineError> {
        self.sankey_at(request, Utc::now()).await
    }

    /// Build the graph as of `now`, which fixes the cache expiry.
    pub async fn sankey_at(
        &self,
        request: &FlowRequest,
        now: DateTime<Utc>,
    ) -> Result<SankeyGraph, EngineError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let plan = QueryPlan::build(request);
        let batch = self.executor.batch(self.schedule.next_expiry(now));
        log::debug!(
            "[{}] {} queries for {} flows, cache entries expire at {}",
            request_id,
            plan.len(),
            request.universe(),
            batch.expire_at()
        );

        let (label_rows, link_rows) = tokio::join!(
            join_all(plan.label_queries().iter().map(|q| batch.run(q))),
            join_all(plan.link_queries().iter().map(|q| batch.run(q))),
        );

        let label_sets = plan
            .label_queries()
            .iter()
            .zip(label_rows)
            .map(|(query, rows)| decode_labels(query, &rows?))
            .collect::<Result<Vec<LabelSet>, EngineError>>()?;
        let links = plan
            .link_queries()
            .iter()
            .zip(link_rows)
            .map(|(query, rows)| decode_links(query, &rows?))
            .collect::<Result<Vec<LinkRows>, EngineError>>()?;

        let index = LabelIndex::build(&label_sets);
        let regrouping = Regrouping::compute(&index, &links, self.top_n)?;
        let totals = aggregate_links(&index, &regrouping, &links)?;
        let colors = self.colors.assign(regrouping.nodes());

        let graph = SankeyGraph::assemble(plan.entity_filter(), regrouping.nodes(), colors, &totals);
        graph.validate()?;

        log::info!(
            "[{}] {} flows: {} nodes, {} links, volume {} in {:?}",
            request_id,
            request.universe(),
            graph.node_count(),
            graph.link_count(),
            graph.total_volume(),
            started.elapsed()
        );
        Ok(graph)
    }
}
