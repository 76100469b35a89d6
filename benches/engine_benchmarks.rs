//! Engine benchmarks: fingerprinting, cache hits and suite execution.
//!
//! Run with: cargo bench --bench engine_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modeldoc::prelude::*;
use modeldoc::result::InputRef;
use serde_json::json;
use std::sync::Arc;

fn params(n: usize) -> Params {
    (0..n)
        .map(|i| (format!("param_{i}"), json!({"threshold": i, "label": "x"})))
        .collect()
}

fn inputs() -> Inputs {
    let dataset = TabularDataset::builder("raw_ds")
        .column("a", (0..1_000).map(f64::from).collect())
        .column("b", (0..1_000).map(|i| f64::from(i % 7)).collect())
        .build()
        .unwrap_or_else(|e| panic!("bench dataset: {e}"));
    Inputs::new().dataset("dataset", Arc::new(dataset))
}

/// Fingerprint cost as the parameter map grows.
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let refs = vec![
        InputRef {
            name: "dataset".to_string(),
            input_id: "raw_ds".to_string(),
        },
        InputRef {
            name: "model".to_string(),
            input_id: "xgb".to_string(),
        },
    ];
    for n in [1, 8, 64] {
        let p = params(n);
        group.bench_with_input(BenchmarkId::new("compute", n), &p, |b, p| {
            b.iter(|| Fingerprint::compute(black_box("acme.checks.RowCount:tag"), &refs, p));
        });
    }
    group.finish();
}

/// A cached execution: resolution, fingerprinting and the cache lookup.
fn bench_cache_hit(c: &mut Criterion) {
    let engine = ExecutionEngine::new(Arc::new(TestRegistry::with_builtins()));
    let inputs = inputs();
    let params = Params::new();
    let _ = engine.execute("modeldoc.data_validation.Zeros", &inputs, &params);

    c.bench_function("execute_cache_hit", |b| {
        b.iter(|| {
            black_box(engine.execute(
                black_box("modeldoc.data_validation.Zeros"),
                &inputs,
                &params,
            ))
        });
    });
}

/// Full suite run on a fresh cache, sequential versus work-stealing.
fn bench_suite_run(c: &mut Criterion) {
    let engine = ExecutionEngine::new(Arc::new(TestRegistry::with_builtins()));
    let pool = inputs();
    let template = SuiteTemplate::new("bench").section(
        SectionTemplate::new("data")
            .content(ContentRef::test("modeldoc.data_validation.Zeros:a"))
            .content(ContentRef::test("modeldoc.data_validation.Zeros:b"))
            .content(ContentRef::metric("modeldoc.data_validation.DatasetDescription")),
    );

    let mut group = c.benchmark_group("suite_run");
    for workers in [1, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &w| {
            b.iter(|| {
                let run = engine.start_run();
                let (_, summary) = SuiteRunner::new(&run)
                    .with_workers(w)
                    .run_template(&template, &pool);
                black_box(summary)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_cache_hit, bench_suite_run);
criterion_main!(benches);
