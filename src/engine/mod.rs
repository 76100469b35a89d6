//! Execution engine.
//!
//! Resolves a test's inputs, fingerprints the invocation and runs the unit
//! at most once per fingerprint:
//! - resolution errors propagate unchanged
//! - panics inside a unit are caught and reported as `TestExecution`
//! - skips surface as `TestSkipped`
//! - only successes are cached
//!
//! An engine and its cache belong to one documentation run. Use
//! [`ExecutionEngine::start_run`] to begin another run against the same
//! registry with an empty cache.

pub mod cache;
pub mod fingerprint;

pub use cache::{CacheStats, CachedResult, ResultCache};
pub use fingerprint::{canonicalize, Fingerprint};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::error::{DocError, DocResult};
use crate::inputs::{InputContext, Inputs, Params};
use crate::registry::{TestId, TestOutcome, TestRegistry, TestUnit};
use crate::result::{TestKind, TestResult};

/// Runs registered tests with single-flight caching.
#[derive(Debug)]
pub struct ExecutionEngine {
    registry: Arc<TestRegistry>,
    cache: ResultCache,
    catch_panics: bool,
}

impl ExecutionEngine {
    /// Engine over `registry` with an empty cache.
    #[must_use]
    pub fn new(registry: Arc<TestRegistry>) -> Self {
        Self {
            registry,
            cache: ResultCache::new(),
            catch_panics: true,
        }
    }

    /// Engine configured from the `execution` config section.
    #[must_use]
    pub fn from_config(registry: Arc<TestRegistry>, config: &ExecutionConfig) -> Self {
        Self::new(registry).with_catch_panics(config.catch_panics)
    }

    /// Whether panics inside a unit are converted into errors.
    #[must_use]
    pub const fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// A fresh engine for a new run: same registry, empty cache.
    #[must_use]
    pub fn start_run(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cache: ResultCache::new(),
            catch_panics: self.catch_panics,
        }
    }

    /// Registry the engine resolves ids against.
    #[must_use]
    pub fn registry(&self) -> &Arc<TestRegistry> {
        &self.registry
    }

    /// This run's result cache.
    #[must_use]
    pub const fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Execute a test, or return the cached result of an identical earlier
    /// invocation.
    ///
    /// `test_id` may carry a `:tag`; the tag is part of the result id and
    /// the fingerprint but not of the registry lookup.
    ///
    /// # Errors
    ///
    /// - `TestNotFound`, `MissingInput`, `InvalidInput`, `MissingParameter`
    ///   from resolution, unchanged
    /// - `TestSkipped` when the unit declines to run
    /// - `TestExecution` naming the test and its inputs when the unit fails
    ///   or panics
    pub fn execute(&self, test_id: &str, inputs: &Inputs, params: &Params) -> DocResult<TestResult> {
        let id = TestId::parse(test_id).map_err(|_| DocError::not_found(test_id))?;
        let unit = self.registry.lookup(test_id)?;
        let ctx = InputContext::resolve(
            test_id,
            unit.required_inputs(),
            unit.params(),
            inputs,
            params,
        )?;
        let fingerprint = Fingerprint::compute(&id.to_string(), &ctx.input_refs(), ctx.params());

        let (cached, hit) = self
            .cache
            .get_or_execute(fingerprint, || self.run_unit(&id, unit.as_ref(), &ctx, fingerprint))?;
        if hit {
            tracing::debug!(test_id = %id, fingerprint = %fingerprint.short(), "cache hit");
        }
        Ok(cached.result.clone())
    }

    fn run_unit(
        &self,
        id: &TestId,
        unit: &dyn TestUnit,
        ctx: &InputContext,
        fingerprint: Fingerprint,
    ) -> DocResult<TestResult> {
        tracing::debug!(test_id = %id, fingerprint = %fingerprint.short(), "executing test");
        let outcome = if self.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(|| unit.run(ctx)))
                .unwrap_or_else(|payload| TestOutcome::Failed(panic_message(payload.as_ref())))
        } else {
            unit.run(ctx)
        };

        let raw = match outcome {
            TestOutcome::Ok(raw) => raw,
            TestOutcome::Skipped(reason) => {
                tracing::info!(test_id = %id, reason = %reason, "test skipped");
                return Err(DocError::TestSkipped {
                    test_id: id.to_string(),
                    reason,
                });
            }
            TestOutcome::Failed(message) => {
                tracing::warn!(test_id = %id, error = %message, "test failed");
                return Err(DocError::TestExecution {
                    test_id: id.to_string(),
                    inputs: ctx.input_names(),
                    message,
                });
            }
        };

        if unit.kind() == TestKind::ThresholdTest && raw.passed().is_none() {
            tracing::warn!(test_id = %id, "threshold test returned no verdict");
            return Err(DocError::TestExecution {
                test_id: id.to_string(),
                inputs: ctx.input_names(),
                message: "threshold test produced no pass/fail verdict".to_string(),
            });
        }

        let summary = unit
            .summary(&raw)
            .unwrap_or_else(|| raw.summary(unit.name()));
        tracing::info!(
            test_id = %id,
            fingerprint = %fingerprint.short(),
            passed = ?raw.passed(),
            "test executed"
        );
        Ok(TestResult {
            result_id: id.to_string(),
            test_id: id.base().to_string(),
            name: unit.name().to_string(),
            kind: unit.kind(),
            description: unit.description().to_string(),
            inputs: ctx.input_refs(),
            params: ctx.params().clone(),
            ref_id: fingerprint.to_hex(),
            raw: Arc::new(raw),
            summary,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::inputs::{Dataset, TabularDataset};
    use crate::registry::builtin::ZEROS;
    use crate::registry::TestDescriptor;
    use crate::result::RawResult;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset() -> Arc<dyn Dataset> {
        Arc::new(
            TabularDataset::builder("ds")
                .column("x", vec![0.0, 1.0, 2.0])
                .build()
                .unwrap(),
        )
    }

    fn counting_engine(kind: TestKind, outcome: TestOutcome) -> (ExecutionEngine, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut registry = TestRegistry::new();
        registry
            .load_external(
                TestDescriptor::new("acme.checks.Counted", kind, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    outcome.clone()
                })
                .input("dataset")
                .param("bins", 10),
            )
            .unwrap();
        (ExecutionEngine::new(Arc::new(registry)), runs)
    }

    fn ok_scalar() -> TestOutcome {
        TestOutcome::Ok(RawResult::scalar(0.5))
    }

    #[test]
    fn test_execute_runs_once_per_fingerprint() {
        let (engine, runs) = counting_engine(TestKind::UnitMetric, ok_scalar());
        let inputs = Inputs::new().dataset("dataset", dataset());
        let a = engine.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        let b = engine.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.raw, &b.raw));
        assert_eq!(a.ref_id, b.ref_id);
    }

    #[test]
    fn test_explicit_default_param_shares_fingerprint() {
        let (engine, runs) = counting_engine(TestKind::UnitMetric, ok_scalar());
        let inputs = Inputs::new().dataset("dataset", dataset());
        let mut params = Params::new();
        params.insert("bins".to_string(), json!(10.0));
        engine.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        engine.execute("acme.checks.Counted", &inputs, &params).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tag_is_a_separate_result() {
        let (engine, runs) = counting_engine(TestKind::UnitMetric, ok_scalar());
        let inputs = Inputs::new().dataset("dataset", dataset());
        let tagged = engine
            .execute("acme.checks.Counted:holdout", &inputs, &Params::new())
            .unwrap();
        engine.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(tagged.result_id, "acme.checks.Counted:holdout");
        assert_eq!(tagged.test_id, "acme.checks.Counted");
    }

    #[test]
    fn test_failure_is_wrapped_and_retried() {
        let (engine, runs) =
            counting_engine(TestKind::Metric, TestOutcome::Failed("bad column".to_string()));
        let inputs = Inputs::new().dataset("dataset", dataset());
        for _ in 0..2 {
            let err = engine
                .execute("acme.checks.Counted", &inputs, &Params::new())
                .unwrap_err();
            match err {
                DocError::TestExecution {
                    test_id,
                    inputs,
                    message,
                } => {
                    assert_eq!(test_id, "acme.checks.Counted");
                    assert_eq!(inputs, ["dataset"]);
                    assert_eq!(message, "bad column");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_panic_is_caught() {
        let mut registry = TestRegistry::new();
        registry
            .load_external(TestDescriptor::new("acme.checks.Panics", TestKind::Metric, |_| {
                panic!("index out of range")
            }))
            .unwrap();
        let engine = ExecutionEngine::new(Arc::new(registry));
        let err = engine
            .execute("acme.checks.Panics", &Inputs::new(), &Params::new())
            .unwrap_err();
        assert!(matches!(err, DocError::TestExecution { ref message, .. } if message.contains("index out of range")));
    }

    #[test]
    fn test_skip_surfaces_distinctly() {
        let (engine, _) =
            counting_engine(TestKind::ThresholdTest, TestOutcome::Skipped("no target".to_string()));
        let inputs = Inputs::new().dataset("dataset", dataset());
        let err = engine
            .execute("acme.checks.Counted", &inputs, &Params::new())
            .unwrap_err();
        assert!(matches!(err, DocError::TestSkipped { ref reason, .. } if reason == "no target"));
    }

    #[test]
    fn test_threshold_without_verdict_fails() {
        let (engine, _) = counting_engine(TestKind::ThresholdTest, ok_scalar());
        let inputs = Inputs::new().dataset("dataset", dataset());
        assert!(matches!(
            engine.execute("acme.checks.Counted", &inputs, &Params::new()),
            Err(DocError::TestExecution { .. })
        ));
    }

    #[test]
    fn test_resolution_errors_propagate() {
        let engine = ExecutionEngine::new(Arc::new(TestRegistry::with_builtins()));
        assert!(matches!(
            engine.execute(ZEROS, &Inputs::new(), &Params::new()),
            Err(DocError::MissingInput { ref input, .. }) if input == "dataset"
        ));
        assert!(matches!(
            engine.execute("modeldoc.nope.Missing", &Inputs::new(), &Params::new()),
            Err(DocError::TestNotFound { .. })
        ));
        assert_eq!(engine.cache().stats().executions, 0);
    }

    #[test]
    fn test_start_run_has_empty_cache() {
        let (engine, runs) = counting_engine(TestKind::UnitMetric, ok_scalar());
        let inputs = Inputs::new().dataset("dataset", dataset());
        engine.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        let next = engine.start_run();
        assert!(next.cache().is_empty());
        next.execute("acme.checks.Counted", &inputs, &Params::new()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builtin_zeros_result_document() {
        let engine = ExecutionEngine::new(Arc::new(TestRegistry::with_builtins()));
        let inputs = Inputs::new().dataset("dataset", dataset());
        let result = engine.execute(ZEROS, &inputs, &Params::new()).unwrap();
        assert_eq!(result.kind, TestKind::ThresholdTest);
        assert_eq!(result.passed(), Some(false));
        assert_eq!(result.params.get("max_percent_threshold"), Some(&json!(0.03)));
        assert_eq!(result.inputs[0].input_id, "ds");
        assert_eq!(result.summary.tables[0].title(), Some("Zeros"));
    }
}
