//! Propagation Benchmarks
//!
//! Measures the cost of the write path:
//! - single writes fanning out to N reactions
//! - computed chains read after every write
//! - batched writes coalescing into one flush
//! - edge-triggered effect evaluation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use tether_core::prelude::*;

//=============================================================================
// Helper Functions
//=============================================================================

/// An Origin with one atom watched by `fanout` lazy reactions.
fn fanout_origin(ref_id: &str, fanout: usize, hits: Arc<AtomicUsize>) -> Origin {
    let mut builder = Schema::builder("Fanout").atom("x", ValueKind::Int);
    for i in 0..fanout {
        let hits = hits.clone();
        builder = builder.lazy_reaction(format!("r{i}"), &["x"], move |_| {
            hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
    }
    let schema = builder.build().unwrap();
    Origin::builder(schema, ref_id).build().unwrap()
}

/// An Origin where `c{i}` reads `c{i-1}` and `c0` reads the atom.
fn chain_origin(depth: usize) -> Origin {
    let mut builder = Schema::builder("Chain").atom("x", ValueKind::Int);
    for i in 0..depth {
        let source = if i == 0 { "x".to_string() } else { format!("c{}", i - 1) };
        builder = builder.computed(format!("c{i}"), ValueKind::Int, move |o| {
            Ok(Value::Int(o.get(&source)?.as_i64().unwrap_or(0) + 1))
        });
    }
    let schema = builder.build().unwrap();
    Origin::builder(schema, format!("chain-{depth}")).build().unwrap()
}

//=============================================================================
// Benchmarks
//=============================================================================

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_fanout");
    for fanout in [1, 10, 100] {
        let hits = Arc::new(AtomicUsize::new(0));
        let origin = fanout_origin(&format!("fanout-{fanout}"), fanout, hits.clone());
        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                next += 1;
                black_box(origin.set("x", next).unwrap());
            });
        });
        black_box(hits.load(Ordering::Relaxed));
    }
    group.finish();
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [1, 10, 50] {
        let origin = chain_origin(depth);
        let tail = format!("c{}", depth - 1);
        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                next += 1;
                origin.set("x", next).unwrap();
                black_box(origin.get(&tail).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let hits = Arc::new(AtomicUsize::new(0));
    let origin = fanout_origin("batch-fanout", 10, hits);
    let mut next = 0i64;

    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            let (_, report) = batch(|| {
                for _ in 0..100 {
                    next += 1;
                    origin.set("x", next).unwrap();
                }
            });
            black_box(report);
        });
    });
}

fn bench_effect(c: &mut Criterion) {
    let schema = Schema::builder("User")
        .atom("age", ValueKind::Int)
        .effect("adult", If::at_least("age", 18), |_| Ok(()))
        .build()
        .unwrap();
    let user = Origin::builder(schema, "bench-user").build().unwrap();
    let mut age = 0i64;

    c.bench_function("effect_edge_toggle", |b| {
        b.iter(|| {
            age = (age + 9) % 36;
            black_box(user.set("age", age).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_fanout,
    bench_computed_chain,
    bench_batch,
    bench_effect
);
criterion_main!(benches);
