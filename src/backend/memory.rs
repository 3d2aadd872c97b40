//! In-process store and cache.
//!
//! [`MemoryStore`] evaluates label and link queries over an in-memory table
//! with the same semantics the SQL text expresses (restrictions, the
//! `total_volume != 0` condition, the adjacency gap), so the whole pipeline
//! can run without external services. Both types count calls and can inject
//! transient failures.

use crate::backend::{Cache, Store};
use crate::core::column::FlowUniverse;
use crate::core::error::BackendError;
use crate::query::plan::{Query, QueryKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One pre-aggregated row: a combination of entity labels and its volume.
///
/// Columns absent from `entities` read as the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub entities: HashMap<String, String>,
    pub volume: Decimal,
}

impl FlowRow {
    pub fn new<I, K, V>(entities: I, volume: Decimal) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entities: entities
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            volume,
        }
    }

    pub fn get(&self, column: &str) -> &str {
        self.entities.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}

/// Fails the next `n` calls with a transient error.
#[derive(Debug, Default)]
struct FaultInjector {
    remaining: AtomicUsize,
}

impl FaultInjector {
    fn arm(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn trip(&self, service: &str) -> Result<(), BackendError> {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(BackendError::Unavailable(service.to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory flow tables, one per universe.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<FlowUniverse, Vec<FlowRow>>>,
    calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    faults: FaultInjector,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(universe: FlowUniverse, rows: Vec<FlowRow>) -> Self {
        let store = Self::new();
        store.insert(universe, rows);
        store
    }

    /// Append rows to a universe's table.
    pub fn insert(&self, universe: FlowUniverse, rows: Vec<FlowRow>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(universe).or_default().extend(rows);
        }
    }

    /// Number of `run` calls, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// SQL text of every successfully answered query, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.faults.arm(n);
    }

    fn evaluate(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| BackendError::Unavailable("memory store".into()))?;
        let rows = tables
            .get(&query.universe())
            .map(|r| r.as_slice())
            .unwrap_or(&[]);

        let admitted = rows.iter().filter(|row| {
            row.volume != Decimal::ZERO
                && query
                    .restrictions()
                    .iter()
                    .all(|(column, labels)| labels.iter().any(|l| l == row.get(column.as_str())))
        });

        let out = match query.kind() {
            QueryKind::Labels { column } => {
                let mut known: HashSet<&str> = HashSet::new();
                let mut seen: Vec<&str> = Vec::new();
                for row in admitted {
                    let label = row.get(column.as_str());
                    if !label.is_empty() && known.insert(label) {
                        seen.push(label);
                    }
                }
                seen.into_iter()
                    .map(|label| {
                        let mut row = serde_json::Map::new();
                        row.insert(column.to_string(), Value::String(label.to_string()));
                        Value::Object(row)
                    })
                    .collect()
            }
            QueryKind::Links { source, target, gap } => {
                // groups keep first-seen order; a sum past the decimal range
                // is reported as a float, the way a Float64 column would
                let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
                let mut groups: Vec<((&str, &str), Option<Decimal>, f64)> = Vec::new();
                for row in admitted {
                    let s = row.get(source.as_str());
                    let t = row.get(target.as_str());
                    if s.is_empty() || t.is_empty() || gap.iter().any(|c| !row.get(c.as_str()).is_empty()) {
                        continue;
                    }
                    let float = row.volume.to_f64().unwrap_or(0.0);
                    match slots.get(&(s, t)) {
                        Some(&slot) => {
                            let group = &mut groups[slot];
                            group.1 = group.1.and_then(|sum| sum.checked_add(row.volume));
                            group.2 += float;
                        }
                        None => {
                            slots.insert((s, t), groups.len());
                            groups.push(((s, t), Some(row.volume), float));
                        }
                    }
                }
                groups
                    .into_iter()
                    .map(|((s, t), exact, float)| {
                        let value = match exact {
                            Some(sum) => json!(sum.to_string()),
                            None => json!(float),
                        };
                        json!({ "source": s, "target": t, "value": value })
                    })
                    .collect()
            }
        };
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn run(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.faults.trip("memory store")?;
        let rows = self.evaluate(query)?;
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(query.sql().to_string());
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }
}

/// In-memory cache honouring absolute expiry.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    clock: Mutex<Clock>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    faults: FaultInjector,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Mutex::new(Clock::System),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            faults: FaultInjector::default(),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose notion of "now" is pinned to `now`.
    pub fn frozen_at(now: DateTime<Utc>) -> Self {
        let cache = Self::new();
        cache.set_now(now);
        cache
    }

    /// Move the pinned clock (e.g. past an expiry boundary).
    pub fn set_now(&self, now: DateTime<Utc>) {
        if let Ok(mut clock) = self.clock.lock() {
            *clock = Clock::Fixed(now);
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry recorded for `key`, if present.
    pub fn expiry_of(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(key).map(|(_, at)| *at))
    }

    /// Overwrite an entry directly, bypassing counters.
    pub fn put_raw(&self, key: &str, value: &str, expire_at: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (value.to_string(), expire_at));
        }
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.faults.arm(n);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.lock().map(|c| c.now()).unwrap_or_else(|_| Utc::now())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.faults.trip("memory cache")?;
        let now = self.now();
        let entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Unavailable("memory cache".into()))?;
        Ok(entries
            .get(key)
            .filter(|(_, expire_at)| *expire_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, expire_at: DateTime<Utc>) -> Result<(), BackendError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.faults.trip("memory cache")?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Unavailable("memory cache".into()))?;
        entries.insert(key.to_string(), (value.to_string(), expire_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{Filter, FlowRequest};
    use crate::query::plan::QueryPlan;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn rows() -> Vec<FlowRow> {
        vec![
            FlowRow::new([("frontend", "a"), ("metaaggregator", "m"), ("solver", "s1")], dec!(10)),
            FlowRow::new([("frontend", "a"), ("solver", "s1")], dec!(5)),
            FlowRow::new([("frontend", "b"), ("solver", "s2")], dec!(0)),
            FlowRow::new([("frontend", "a"), ("metaaggregator", "m"), ("solver", "s1")], dec!(2)),
        ]
    }

    fn plan(filter: Filter) -> QueryPlan {
        let filter = filter.exclude("mempool").exclude("ofa").exclude("builder");
        QueryPlan::build(&FlowRequest::new(FlowUniverse::Orderflow, filter).unwrap())
    }

    #[tokio::test]
    async fn test_label_query_skips_zero_volume() {
        let store = MemoryStore::with_rows(FlowUniverse::Orderflow, rows());
        let plan = plan(Filter::new());
        let labels = store.run(&plan.label_queries()[0]).await.unwrap();
        assert_eq!(labels, vec![json!({"frontend": "a"})]);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_link_query_groups_and_applies_gap() {
        let store = MemoryStore::with_rows(FlowUniverse::Orderflow, rows());
        let plan = plan(Filter::new());
        // frontend -> solver only counts rows with an empty metaaggregator
        let q = plan
            .link_queries()
            .iter()
            .find(|q| matches!(q.kind(), QueryKind::Links { gap, .. } if gap.len() == 1))
            .unwrap();
        let links = store.run(q).await.unwrap();
        assert_eq!(links, vec![json!({"source": "a", "target": "s1", "value": "5"})]);

        let adjacent = store.run(&plan.link_queries()[0]).await.unwrap();
        assert_eq!(adjacent, vec![json!({"source": "a", "target": "m", "value": "12"})]);
    }

    #[tokio::test]
    async fn test_link_sum_past_decimal_range_is_a_float() {
        let big = Decimal::from_scientific("5e28").unwrap();
        let store = MemoryStore::with_rows(
            FlowUniverse::Orderflow,
            vec![
                FlowRow::new([("frontend", "a"), ("metaaggregator", "m")], big),
                FlowRow::new([("frontend", "a"), ("metaaggregator", "m")], big),
            ],
        );
        let plan = plan(Filter::new());
        let links = store.run(&plan.link_queries()[0]).await.unwrap();
        assert_eq!(links.len(), 1);
        let value = links[0]["value"].as_f64().unwrap();
        assert!(value > 9.9e28);
    }

    #[tokio::test]
    async fn test_restrictions() {
        let store = MemoryStore::with_rows(FlowUniverse::Orderflow, rows());
        let plan = plan(Filter::new().allow("frontend", ["b"]));
        assert!(store.run(&plan.label_queries()[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_fault_injection() {
        let store = MemoryStore::new();
        let plan = plan(Filter::new());
        store.fail_next(2);
        assert!(store.run(&plan.label_queries()[0]).await.is_err());
        assert!(store.run(&plan.label_queries()[0]).await.is_err());
        assert!(store.run(&plan.label_queries()[0]).await.is_ok());
        assert_eq!(store.calls(), 3);
        assert_eq!(store.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let cache = MemoryCache::frozen_at(t0);
        cache.set("k", "v", t0 + Duration::hours(1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.set_now(t0 + Duration::hours(1));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.gets(), 2);
        assert_eq!(cache.sets(), 1);
    }
}
