//! Test units and their typed plugin descriptor.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{DocError, DocResult};
use crate::inputs::{InputContext, InputRequirement, ParamSpec};
use crate::result::{RawResult, ResultSummary, TestKind};

/// What a test run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    /// The test ran and produced output.
    Ok(RawResult),
    /// The test declined to run; neither pass nor fail.
    Skipped(String),
    /// The test failed with a message.
    Failed(String),
}

impl TestOutcome {
    /// Map a fallible computation to an outcome.
    ///
    /// `TestSkipped` errors become [`TestOutcome::Skipped`]; every other
    /// error becomes [`TestOutcome::Failed`] with its message.
    #[must_use]
    pub fn from_result(result: DocResult<RawResult>) -> Self {
        match result {
            Ok(raw) => Self::Ok(raw),
            Err(DocError::TestSkipped { reason, .. }) => Self::Skipped(reason),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// A named, immutable capability that validates datasets and models.
pub trait TestUnit: Send + Sync {
    /// Globally unique dotted id.
    fn id(&self) -> &str;

    /// Threshold test, metric or unit metric.
    fn kind(&self) -> TestKind;

    /// Display name; the last id segment by default.
    fn name(&self) -> &str {
        let id = self.id();
        id.rsplit('.').next().unwrap_or(id)
    }

    /// Longer description, documented next to the result.
    fn description(&self) -> &str {
        ""
    }

    /// Free-form tags used for listing and filtering.
    fn tags(&self) -> &[String] {
        &[]
    }

    /// Declared inputs, in order.
    fn required_inputs(&self) -> &[InputRequirement];

    /// Declared parameters.
    fn params(&self) -> &[ParamSpec] {
        &[]
    }

    /// Custom summary of a raw result; `None` uses the default summary.
    fn summary(&self, _raw: &RawResult) -> Option<ResultSummary> {
        None
    }

    /// Run against resolved inputs. Must not mutate shared inputs.
    fn run(&self, ctx: &InputContext) -> TestOutcome;

    /// Address of the code behind this unit. Registering two units with
    /// equal identities and equal declarations under one id is a no-op.
    fn identity(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

impl fmt::Debug for dyn TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Signature of a descriptor's run function.
pub type RunFn = dyn Fn(&InputContext) -> TestOutcome + Send + Sync;

/// A test unit assembled from declarations and a run function.
///
/// This is how hosts contribute tests that live outside the built-in
/// catalog: build a descriptor at startup and hand it to
/// [`super::TestRegistry::load_external`].
#[derive(Clone)]
pub struct TestDescriptor {
    id: String,
    kind: TestKind,
    name: Option<String>,
    description: String,
    tags: Vec<String>,
    inputs: Vec<InputRequirement>,
    params: Vec<ParamSpec>,
    run: Arc<RunFn>,
}

impl TestDescriptor {
    /// Descriptor with no inputs or parameters.
    pub fn new<F>(id: impl Into<String>, kind: TestKind, run: F) -> Self
    where
        F: Fn(&InputContext) -> TestOutcome + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            kind,
            name: None,
            description: String::new(),
            tags: Vec::new(),
            inputs: Vec::new(),
            params: Vec::new(),
            run: Arc::new(run),
        }
    }

    /// Descriptor whose run function returns a `DocResult`.
    pub fn from_fn<F>(id: impl Into<String>, kind: TestKind, run: F) -> Self
    where
        F: Fn(&InputContext) -> DocResult<RawResult> + Send + Sync + 'static,
    {
        Self::new(id, kind, move |ctx| TestOutcome::from_result(run(ctx)))
    }

    /// Declare an input (dotted paths allowed).
    #[must_use]
    pub fn input(mut self, spec: &str) -> Self {
        self.inputs.push(InputRequirement::parse(spec));
        self
    }

    /// Declare a parameter with a default.
    #[must_use]
    pub fn param(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(ParamSpec::with_default(name, default));
        self
    }

    /// Declare a parameter without a default.
    #[must_use]
    pub fn required_param(mut self, name: &str) -> Self {
        self.params.push(ParamSpec::required(name));
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl TestUnit for TestDescriptor {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TestKind {
        self.kind
    }

    fn name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self.id.rsplit('.').next().unwrap_or(&self.id),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn required_inputs(&self) -> &[InputRequirement] {
        &self.inputs
    }

    fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    fn run(&self, ctx: &InputContext) -> TestOutcome {
        (self.run)(ctx)
    }

    // Clones share the run closure.
    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.run).cast()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::inputs::{Cardinality, Inputs, Params};

    #[test]
    fn test_descriptor_declarations() {
        let desc = TestDescriptor::new("acme.checks.Noop", TestKind::Metric, |_| {
            TestOutcome::Ok(RawResult::default())
        })
        .input("dataset")
        .input("datasets")
        .input("model.test_dataset")
        .param("bins", 10)
        .required_param("cutoff")
        .description("Does nothing.")
        .tag("smoke");

        assert_eq!(TestUnit::name(&desc), "Noop");
        assert_eq!(desc.required_inputs().len(), 3);
        assert_eq!(desc.required_inputs()[1].cardinality, Cardinality::Many);
        assert_eq!(desc.required_inputs()[2].key(), "model.test_dataset");
        assert_eq!(desc.params().len(), 2);
        assert!(desc.params()[1].default.is_none());
        assert_eq!(desc.tags(), ["smoke"]);
    }

    #[test]
    fn test_from_fn_maps_skip() {
        let desc = TestDescriptor::from_fn("acme.checks.Skip", TestKind::ThresholdTest, |ctx| {
            Err(DocError::TestSkipped {
                test_id: ctx.test_id().to_string(),
                reason: "not applicable".to_string(),
            })
        });
        let ctx = InputContext::resolve("acme.checks.Skip", &[], &[], &Inputs::new(), &Params::new())
            .unwrap();
        assert_eq!(desc.run(&ctx), TestOutcome::Skipped("not applicable".to_string()));
    }

    #[test]
    fn test_from_result_failure_message() {
        let outcome = TestOutcome::from_result(Err(DocError::config("bad")));
        assert_eq!(outcome, TestOutcome::Failed("Configuration error: bad".to_string()));
    }

    #[test]
    fn test_custom_name() {
        let desc = TestDescriptor::new("a.b.c", TestKind::Metric, |_| TestOutcome::Failed(String::new()))
            .name("Pretty");
        assert_eq!(TestUnit::name(&desc), "Pretty");
    }
}
