//! Performance benchmarks for prize-pool
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Plan building for growing quantities and periods
//! - Plan encode/decode and due-splitting
//! - Claim throughput against the in-memory pool, single and concurrent

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use prize_pool::store::MemoryStore;
use prize_pool::{InventoryGate, Planner, ReleasePlan};

const NOW: i64 = 1_700_000_000;

/// Create a Tokio runtime for async benchmarks
fn create_runtime() -> Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");
    let planner = Planner::default();

    for (total, days) in [(100u64, 1u32), (10_000, 7), (1_000_000, 30)] {
        group.throughput(Throughput::Elements(total));
        group.bench_with_input(
            BenchmarkId::new("build", format!("{}x{}d", total, days)),
            &(total, days),
            |b, &(total, days)| {
                let mut rng = StdRng::seed_from_u64(7);
                b.iter(|| black_box(planner.build(total, days, NOW, &mut rng)));
            },
        );
    }

    group.finish();
}

fn bench_plan_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_codec");
    let plan = Planner::default().build(50_000, 30, NOW, &mut StdRng::seed_from_u64(1));
    let encoded = plan.encode().unwrap();
    group.throughput(Throughput::Elements(plan.len() as u64));

    group.bench_function("encode", |b| b.iter(|| black_box(plan.encode().unwrap())));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(ReleasePlan::decode(&encoded).unwrap()))
    });
    group.bench_function("split_due_mid_period", |b| {
        b.iter(|| black_box(plan.split_due(NOW + 15 * 86_400)))
    });

    group.finish();
}

fn bench_claims(c: &mut Criterion) {
    let mut group = c.benchmark_group("claims");
    let rt = create_runtime();

    group.bench_function("single_claim", |b| {
        let gate = InventoryGate::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        rt.block_on(gate.credit(1, u32::MAX as u64)).unwrap();
        b.iter(|| black_box(rt.block_on(gate.claim(1)).unwrap()));
    });

    for concurrency in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("concurrent", concurrency),
            &concurrency,
            |b, &concurrency| {
                let gate = InventoryGate::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
                b.iter(|| {
                    rt.block_on(async {
                        gate.reset(1, (concurrency / 2) as i64).await.unwrap();
                        let claims = (0..concurrency).map(|_| {
                            let gate = gate.clone();
                            tokio::spawn(async move { gate.claim(1).await })
                        });
                        black_box(join_all(claims).await);
                    });
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_plan_build, bench_plan_codec, bench_claims);
criterion_main!(benches);
