// Producer throughput benchmark - measure add() overhead on the hot path
//
// Uses a no-op executor so the numbers cover grouping, dedup and queue
// handoff only. Compares plain grouping with key-based dedup.

use std::sync::Arc;

use async_trait::async_trait;
use batchsink::{Batch, BatchExecutor, Producer, WriteRequest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

struct NoopExecutor;

#[async_trait]
impl BatchExecutor<(u64, u64)> for NoopExecutor {
    async fn execute(&self, batch: &Batch<(u64, u64)>) -> anyhow::Result<()> {
        black_box(batch.len());
        Ok(())
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

const DESTINATIONS: [&str; 4] = ["orders", "users", "events", "sessions"];

/// Benchmark add() across a handful of destinations
fn bench_add(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("producer_add");

    for batch_size in [25usize, 100] {
        let records = 10_000u64;
        group.throughput(Throughput::Elements(records));

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let producer = Producer::builder(batch_size).build(NoopExecutor).unwrap();
                b.iter(|| {
                    for i in 0..records {
                        let destination = DESTINATIONS[(i % 4) as usize];
                        black_box(producer.add(WriteRequest::new(destination, (i, i))));
                    }
                    producer.flush();
                });
                rt.block_on(producer.shutdown()).unwrap();
            },
        );
    }

    group.finish();
}

/// Benchmark add() with a key extractor and a small key space, so most
/// requests supersede an earlier one
fn bench_add_with_dedup(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("producer_add_with_dedup");

    for key_space in [16u64, 1_024] {
        let records = 10_000u64;
        group.throughput(Throughput::Elements(records));

        group.bench_with_input(
            BenchmarkId::from_parameter(key_space),
            &key_space,
            |b, &key_space| {
                let producer = Producer::builder(25)
                    .key_extractor(|(key, _): &(u64, u64)| Some(key.to_string()))
                    .build(NoopExecutor)
                    .unwrap();
                b.iter(|| {
                    for i in 0..records {
                        let destination = DESTINATIONS[(i % 4) as usize];
                        let request = WriteRequest::new(destination, (i % key_space, i));
                        black_box(producer.add(request));
                    }
                    producer.flush();
                });
                rt.block_on(producer.shutdown()).unwrap();
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_add_with_dedup);
criterion_main!(benches);
