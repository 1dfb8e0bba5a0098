//! Benchmarks for record batching and end-to-end scheduling.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

use cloud_collector::config::SchedulerConfig;
use cloud_collector::orchestrator::{BatchAccumulator, ResourceRecord, Scheduler};
use cloud_collector::providers::simulated::{self, SimulatedProfile};
use cloud_collector::sink::{resolve_batch, MemorySink};

/// Benchmark batch accumulation with different batch caps
fn bench_batch_accumulator(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_accumulator");
    let records: Vec<ResourceRecord> = (0..10_000)
        .map(|i| ResourceRecord {
            resource_type: "VM".to_string(),
            payload: json!({ "id": format!("i-{:08x}", i), "name": format!("vm-{}", i) }),
        })
        .collect();
    group.throughput(Throughput::Elements(records.len() as u64));

    for max in [1usize, 50, 500] {
        group.bench_with_input(BenchmarkId::new("push", max), &max, |b, &max| {
            b.iter(|| {
                let mut acc = BatchAccumulator::new(max);
                let mut batches = 0usize;
                for record in records.iter().cloned() {
                    if acc.push(record).is_some() {
                        batches += 1;
                    }
                }
                if acc.finish().is_some() {
                    batches += 1;
                }
                black_box(batches)
            });
        });
    }

    group.finish();
}

/// Benchmark a full simulated run, scaling the number of VMs per region
fn bench_simulated_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulated_run");
    group.sample_size(10);
    let runtime = Runtime::new().unwrap();

    for vm_count in [100u32, 1_000] {
        let profile = SimulatedProfile {
            vm_count,
            latency: Duration::ZERO,
            ..Default::default()
        };
        group.throughput(Throughput::Elements(vm_count as u64 * profile.regions.len() as u64));
        group.bench_with_input(BenchmarkId::new("vms", vm_count), &profile, |b, profile| {
            b.to_async(&runtime).iter(|| async {
                let sink = Arc::new(MemorySink::new());
                let platform = simulated::platform_with(profile.clone())
                    .unwrap()
                    .retain_resources(&[simulated::VM.to_string()])
                    .unwrap();
                let scheduler = Scheduler::new(platform, SchedulerConfig::default(), sink.clone()).unwrap();
                let summary = scheduler.run(Vec::new()).await;
                black_box(summary.records_delivered())
            });
        });
    }

    group.finish();
}

/// Benchmark identity extraction over flushed batches
fn bench_resolve_batch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let batches = runtime.block_on(async {
        let sink = Arc::new(MemorySink::new());
        let profile = SimulatedProfile {
            latency: Duration::ZERO,
            ..Default::default()
        };
        let scheduler = Scheduler::new(
            simulated::platform_with(profile).unwrap(),
            SchedulerConfig::default(),
            sink.clone(),
        )
        .unwrap();
        scheduler.run(Vec::new()).await;
        sink.batches().await
    });

    c.bench_function("resolve_batches", |b| {
        b.iter(|| {
            let resolved: usize = batches.iter().map(|batch| resolve_batch(black_box(batch)).len()).sum();
            black_box(resolved)
        });
    });
}

criterion_group!(benches, bench_batch_accumulator, bench_simulated_run, bench_resolve_batch);
criterion_main!(benches);
