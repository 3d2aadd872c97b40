use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sankey_engine::backend::memory::MemoryStore;
use sankey_engine::backend::Store;
use sankey_engine::core::column::FlowUniverse;
use sankey_engine::core::filter::{Filter, FlowRequest};
use sankey_engine::graph::indexer::LabelIndex;
use sankey_engine::graph::links::aggregate_links;
use sankey_engine::graph::regroup::{Regrouping, DEFAULT_TOP_N};
use sankey_engine::query::plan::QueryPlan;
use sankey_engine::query::rows::{decode_labels, decode_links, LabelSet, LinkRows};
use sankey_engine::simulation::synthetic::{generate_rows, SyntheticConfig};

/// Decoded label and link results for a synthetic order-flow table.
fn fetched(rows: usize, labels_per_column: usize) -> (Vec<LabelSet>, Vec<LinkRows>) {
    let config = SyntheticConfig {
        rows,
        labels_per_column,
        seed: Some(42),
        ..Default::default()
    };
    let store = MemoryStore::with_rows(FlowUniverse::Orderflow, generate_rows(&config));
    let request = FlowRequest::new(FlowUniverse::Orderflow, Filter::new()).unwrap();
    let plan = QueryPlan::build(&request);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mut label_sets = Vec::new();
        for query in plan.label_queries() {
            label_sets.push(decode_labels(query, &store.run(query).await.unwrap()).unwrap());
        }
        let mut links = Vec::new();
        for query in plan.link_queries() {
            links.push(decode_links(query, &store.run(query).await.unwrap()).unwrap());
        }
        (label_sets, links)
    })
}

fn regroup_and_aggregate(label_sets: &[LabelSet], links: &[LinkRows]) -> usize {
    let index = LabelIndex::build(label_sets);
    let regrouping = Regrouping::compute(&index, links, DEFAULT_TOP_N).unwrap();
    aggregate_links(&index, &regrouping, links).unwrap().len()
}

fn bench_regroup_small(c: &mut Criterion) {
    let (label_sets, links) = fetched(1_000, 25);

    c.bench_function("regroup_1k_rows_25_labels", |b| {
        b.iter(|| regroup_and_aggregate(black_box(&label_sets), black_box(&links)))
    });
}

fn bench_regroup_medium(c: &mut Criterion) {
    let (label_sets, links) = fetched(20_000, 200);

    c.bench_function("regroup_20k_rows_200_labels", |b| {
        b.iter(|| regroup_and_aggregate(black_box(&label_sets), black_box(&links)))
    });
}

fn bench_regroup_large(c: &mut Criterion) {
    let (label_sets, links) = fetched(100_000, 2_000);

    c.bench_function("regroup_100k_rows_2k_labels", |b| {
        b.iter(|| regroup_and_aggregate(black_box(&label_sets), black_box(&links)))
    });
}

criterion_group!(
    benches,
    bench_regroup_small,
    bench_regroup_medium,
    bench_regroup_large
);
criterion_main!(benches);
