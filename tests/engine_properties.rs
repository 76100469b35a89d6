//! Execution engine properties: at-most-once execution per fingerprint,
//! parameter sensitivity, single-flight under concurrency and resolution
//! errors that never reach the unit.

use modeldoc::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SLOW_CHECK: &str = "acme.checks.SlowCount";

fn dataset(id: &str, values: Vec<f64>) -> Arc<dyn Dataset> {
    Arc::new(
        TabularDataset::builder(id)
            .column("x", values)
            .build()
            .unwrap(),
    )
}

fn counting_engine(delay_ms: u64) -> (ExecutionEngine, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let mut registry = TestRegistry::with_builtins();
    registry
        .load_external(
            TestDescriptor::new(SLOW_CHECK, TestKind::Metric, move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                let rows = ctx.dataset("dataset").map(|d| d.len()).unwrap_or(0);
                TestOutcome::Ok(RawResult::scalar(rows as f64))
            })
            .input("dataset"),
        )
        .unwrap();
    (ExecutionEngine::new(Arc::new(registry)), runs)
}

#[test]
fn test_repeated_calls_run_once() {
    let (engine, runs) = counting_engine(0);
    let inputs = Inputs::new().dataset("dataset", dataset("raw", vec![1.0, 2.0, 3.0]));
    let results: Vec<TestResult> = (0..10)
        .map(|_| engine.execute(SLOW_CHECK, &inputs, &Params::new()).unwrap())
        .collect();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].raw, &w[1].raw)));
    let stats = engine.cache().stats();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.hits, 9);
}

#[test]
fn test_different_dataset_identity_runs_again() {
    let (engine, runs) = counting_engine(0);
    let a = Inputs::new().dataset("dataset", dataset("raw", vec![1.0]));
    let b = Inputs::new().dataset("dataset", dataset("clean", vec![1.0]));
    engine.execute(SLOW_CHECK, &a, &Params::new()).unwrap();
    engine.execute(SLOW_CHECK, &b, &Params::new()).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_param_change_is_a_new_entry() {
    let registry = Arc::new(TestRegistry::with_builtins());
    let engine = ExecutionEngine::new(registry);
    let inputs = Inputs::new().dataset("dataset", dataset("raw", vec![0.0, 1.0, 2.0, 3.0]));

    let mut strict = Params::new();
    strict.insert("max_percent_threshold".to_string(), json!(0.03));
    let mut lenient = Params::new();
    lenient.insert("max_percent_threshold".to_string(), json!(0.3));

    let a = engine.execute("modeldoc.data_validation.Zeros", &inputs, &strict).unwrap();
    let b = engine.execute("modeldoc.data_validation.Zeros", &inputs, &lenient).unwrap();

    assert_eq!(engine.cache().len(), 2);
    assert_ne!(a.ref_id, b.ref_id);
    assert_eq!(a.passed(), Some(false));
    assert_eq!(b.passed(), Some(true));
}

#[test]
fn test_concurrent_identical_calls_share_one_execution() {
    let (engine, runs) = counting_engine(50);
    let inputs = Inputs::new().dataset("dataset", dataset("raw", vec![1.0, 2.0]));

    let results: Vec<TestResult> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| engine.execute(SLOW_CHECK, &inputs, &Params::new())))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r.ref_id == results[0].ref_id));
    assert_eq!(results[0].raw.scalar_value(), Some(2.0));
}

#[test]
fn test_missing_model_is_reported_before_running() {
    let registry = Arc::new(TestRegistry::with_builtins());
    let engine = ExecutionEngine::new(registry);
    let inputs = Inputs::new().dataset("dataset", dataset("raw", vec![1.0]));

    let err = engine
        .execute("modeldoc.model_validation.Accuracy", &inputs, &Params::new())
        .unwrap_err();
    match &err {
        DocError::MissingInput { test_id, input } => {
            assert_eq!(test_id, "modeldoc.model_validation.Accuracy");
            assert_eq!(input, "model");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.class(), ErrorClass::Resolution);
    assert!(engine.cache().is_empty());
}

#[test]
fn test_unknown_test_id() {
    let engine = ExecutionEngine::new(Arc::new(TestRegistry::with_builtins()));
    let err = engine
        .execute("acme.nowhere.Missing", &Inputs::new(), &Params::new())
        .unwrap_err();
    assert!(matches!(err, DocError::TestNotFound { .. }));
}

#[test]
fn test_new_run_starts_with_empty_cache() {
    let (engine, runs) = counting_engine(0);
    let inputs = Inputs::new().dataset("dataset", dataset("raw", vec![1.0]));
    engine.execute(SLOW_CHECK, &inputs, &Params::new()).unwrap();

    let next = engine.start_run();
    assert!(next.cache().is_empty());
    next.execute(SLOW_CHECK, &inputs, &Params::new()).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
