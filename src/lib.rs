//! # sankey-engine
//!
//! Flow-aggregation and caching engine for entity-to-entity trading volume
//! Sankey diagrams.
//!
//! Given a filter over the entities an order (or a liquidity fill) passes
//! through, the engine queries a columnar store for the distinct entities per
//! column and the volume flowing between every pair of columns, caches each
//! query until the next data refresh, collapses each column's long tail into
//! an `Other` node, and returns index-aligned labels, colors and links ready
//! for a Sankey renderer.
//!
//! ## Architecture
//!
//! - **core** — Entity columns, flow universes, filters, errors
//! - **query** — SQL plan construction and typed decoding of result rows
//! - **backend** — Store and cache contracts, ClickHouse, Redis and in-memory adapters
//! - **cache** — Cache-aside execution, refresh-aligned expiry, retry policy
//! - **graph** — Label indexing, top-N regrouping, link aggregation, colors
//! - **service** — Request orchestration and the HTTP surface
//! - **simulation** — Synthetic flow tables for demos and benchmarks

pub mod backend;
pub mod cache;
pub mod config;
pub mod core;
pub mod graph;
pub mod query;
pub mod service;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::backend::memory::{FlowRow, MemoryCache, MemoryStore};
    pub use crate::backend::{Cache, Store};
    pub use crate::cache::expiry::RefreshSchedule;
    pub use crate::cache::retry::RetryPolicy;
    pub use crate::core::column::{EntityColumn, FlowUniverse};
    pub use crate::core::error::{BackendError, EngineError};
    pub use crate::core::filter::{Filter, FlowRequest};
    pub use crate::graph::color::FallbackColor;
    pub use crate::graph::sankey::SankeyGraph;
    pub use crate::query::plan::QueryPlan;
    pub use crate::service::engine::{EngineOptions, FlowEngine};
}
