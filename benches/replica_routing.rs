//! Criterion measurements for read routing: the bare selector, and a full
//! direct read through a ring of mock backends so only ring overhead shows.

use std::hint::black_box;
use std::sync::LazyLock;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sql_ring::prelude::*;
use sql_ring::test_utils::MockDriver;
use tokio::runtime::Runtime;

// Dedicated runtime for the async ring path.
static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

fn dsn_list(replicas: usize) -> String {
    std::iter::once("primary".to_string())
        .chain((1..=replicas).map(|i| format!("replica{i}")))
        .collect::<Vec<_>>()
        .join(";")
}

fn bench_selector(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_next");
    group.throughput(Throughput::Elements(1));
    for replicas in [0usize, 1, 4, 16] {
        let selector = ReplicaSelector::new(replicas);
        group.bench_with_input(BenchmarkId::from_parameter(replicas), &replicas, |b, _| {
            b.iter(|| black_box(selector.next()));
        });
    }
    group.finish();
}

fn bench_ring_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_direct_read");
    for replicas in [1usize, 4] {
        let mock = MockDriver::new();
        let ring = TOKIO_RUNTIME
            .block_on(RingDriver::new(mock.driver()).open_ring(&dsn_list(replicas)))
            .expect("open mock ring");
        group.bench_with_input(BenchmarkId::from_parameter(replicas), &ring, |b, ring| {
            b.to_async(&*TOKIO_RUNTIME).iter(|| async move {
                let cursor = ring
                    .query_rows("SELECT backend", &[])
                    .await
                    .expect("mock read");
                black_box(cursor.into_result_set().await.expect("drain"))
            });
        });
        mock.clear_events();
    }
    group.finish();
}

criterion_group!(benches, bench_selector, bench_ring_reads);
criterion_main!(benches);
