//! Built-in reference catalog under the `modeldoc.` namespace.
//!
//! These are deliberately small checks: they exercise every test kind and
//! input shape the engine supports, not statistical depth.

use indexmap::IndexMap;
use std::sync::Arc;

use super::unit::{TestDescriptor, TestOutcome, TestUnit};
use super::TestRegistry;
use crate::error::{DocError, DocResult};
use crate::inputs::{Dataset, InputContext, InputRequirement, ParamSpec};
use crate::result::{RawResult, ResultTable, ResultValue, TestKind};

/// Share of zero values per numeric feature.
pub const ZEROS: &str = "modeldoc.data_validation.Zeros";
/// Per-column descriptive statistics.
pub const DATASET_DESCRIPTION: &str = "modeldoc.data_validation.DatasetDescription";
/// Share of correct predictions.
pub const ACCURACY: &str = "modeldoc.model_validation.Accuracy";
/// Relative mean shift between a reference and other datasets.
pub const TRAIN_TEST_DRIFT: &str = "modeldoc.model_validation.TrainTestDrift";

/// Register the built-in catalog.
///
/// Registration into an empty registry cannot conflict; conflicts with
/// pre-existing units are logged and the existing unit is kept.
pub fn register_builtins(registry: &mut TestRegistry) {
    let units: Vec<Arc<dyn TestUnit>> = vec![
        Arc::new(Zeros::new()),
        Arc::new(DatasetDescription::new()),
        Arc::new(accuracy()),
        Arc::new(train_test_drift()),
    ];
    for unit in units {
        let id = unit.id().to_string();
        if let Err(e) = registry.register(unit) {
            tracing::warn!(test_id = %id, error = %e, "built-in test not registered");
        }
    }
}

fn skip(ctx: &InputContext, reason: impl Into<String>) -> DocError {
    DocError::TestSkipped {
        test_id: ctx.test_id().to_string(),
        reason: reason.into(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Zero-value share per feature, against `max_percent_threshold`.
#[derive(Debug)]
pub struct Zeros {
    inputs: Vec<InputRequirement>,
    params: Vec<ParamSpec>,
    tags: Vec<String>,
}

impl Zeros {
    /// Create the test with its declarations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![InputRequirement::one("dataset")],
            params: vec![ParamSpec::with_default("max_percent_threshold", 0.03)],
            tags: vec!["data_quality".to_string(), "tabular_data".to_string()],
        }
    }

    fn compute(ctx: &InputContext) -> DocResult<RawResult> {
        let dataset = ctx.dataset("dataset")?;
        let threshold = ctx.param_f64("max_percent_threshold")?;
        if dataset.is_empty() {
            return Err(skip(ctx, "dataset has no rows"));
        }

        let mut table = ResultTable::new([
            "column",
            "number_of_zero_values",
            "percentage_of_zero_values",
            "pass",
        ]);
        let mut all_passed = true;
        for column in dataset.feature_columns() {
            let Some(values) = dataset.numeric_column(&column) else {
                continue;
            };
            let zeros = values.iter().filter(|v| **v == 0.0).count();
            let share = zeros as f64 / values.len() as f64;
            let passed = share <= threshold;
            all_passed &= passed;
            table.push_row(vec![
                column.into(),
                zeros.into(),
                share.into(),
                passed.into(),
            ])?;
        }

        RawResult::builder().table(table).passed(all_passed).build()
    }
}

impl Default for Zeros {
    fn default() -> Self {
        Self::new()
    }
}

impl TestUnit for Zeros {
    fn id(&self) -> &str {
        ZEROS
    }

    fn kind(&self) -> TestKind {
        TestKind::ThresholdTest
    }

    fn description(&self) -> &str {
        "Checks that the share of zero values in each numeric feature stays at or below max_percent_threshold."
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
        TestOutcome::from_result(Self::compute(ctx))
    }
}

/// Count, missing, mean, min and max per numeric column.
#[derive(Debug)]
pub struct DatasetDescription {
    inputs: Vec<InputRequirement>,
    tags: Vec<String>,
}

impl DatasetDescription {
    /// Create the test with its declarations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![InputRequirement::one("dataset")],
            tags: vec!["tabular_data".to_string()],
        }
    }

    fn describe_column(name: &str, values: &[f64]) -> IndexMap<String, ResultValue> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let min = finite.iter().copied().reduce(f64::min);
        let max = finite.iter().copied().reduce(f64::max);
        let mut row = IndexMap::new();
        row.insert("column".to_string(), ResultValue::from(name));
        row.insert("count".to_string(), ResultValue::from(finite.len()));
        row.insert(
            "missing".to_string(),
            ResultValue::from(values.len() - finite.len()),
        );
        row.insert("mean".to_string(), ResultValue::from(mean(values)));
        row.insert("min".to_string(), ResultValue::from(min));
        row.insert("max".to_string(), ResultValue::from(max));
        row
    }
}

impl Default for DatasetDescription {
    fn default() -> Self {
        Self::new()
    }
}

impl TestUnit for DatasetDescription {
    fn id(&self) -> &str {
        DATASET_DESCRIPTION
    }

    fn kind(&self) -> TestKind {
        TestKind::Metric
    }

    fn description(&self) -> &str {
        "Descriptive statistics for every numeric column of the dataset."
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn required_inputs(&self) -> &[InputRequirement] {
        &self.inputs
    }

    fn run(&self, ctx: &InputContext) -> TestOutcome {
        let dataset = match ctx.dataset("dataset") {
            Ok(d) => d,
            Err(e) => return TestOutcome::Failed(e.to_string()),
        };
        let records = dataset
            .columns()
            .iter()
            .filter_map(|c| {
                dataset
                    .numeric_column(c)
                    .map(|values| Self::describe_column(c, &values))
            })
            .collect();
        TestOutcome::from_result(
            RawResult::builder()
                .table(ResultTable::from_records(records))
                .build(),
        )
    }
}

fn accuracy() -> TestDescriptor {
    TestDescriptor::from_fn(ACCURACY, TestKind::UnitMetric, |ctx| {
        let dataset = ctx.dataset("dataset")?;
        let model = ctx.model("model")?;
        if dataset.is_empty() {
            return Err(skip(ctx, "dataset has no rows"));
        }
        let target = dataset
            .target_column()
            .and_then(|t| dataset.numeric_column(t))
            .ok_or_else(|| DocError::InvalidInput {
                test_id: ctx.test_id().to_string(),
                input: "dataset".to_string(),
                reason: "dataset has no numeric target column".to_string(),
            })?;
        let predictions = model.predict(&**dataset)?;
        if predictions.len() != target.len() {
            return Err(DocError::InvalidInput {
                test_id: ctx.test_id().to_string(),
                input: "model".to_string(),
                reason: format!(
                    "model returned {} predictions for {} rows",
                    predictions.len(),
                    target.len()
                ),
            });
        }
        let correct = predictions
            .iter()
            .zip(&target)
            .filter(|(p, t)| (*p - *t).abs() < 1e-9)
            .count();
        Ok(RawResult::scalar(correct as f64 / target.len() as f64))
    })
    .input("dataset")
    .input("model")
    .description("Share of rows where the model prediction equals the target.")
    .tag("classification")
}

fn train_test_drift() -> TestDescriptor {
    TestDescriptor::from_fn(TRAIN_TEST_DRIFT, TestKind::ThresholdTest, |ctx| {
        let datasets = ctx.datasets("datasets")?;
        let max_shift = ctx.param_f64("max_mean_shift")?;
        let (reference, others) = datasets
            .split_first()
            .ok_or_else(|| skip(ctx, "no reference dataset"))?;

        let mut table = ResultTable::new([
            "dataset",
            "column",
            "reference_mean",
            "mean",
            "relative_shift",
            "pass",
        ]);
        let mut all_passed = true;
        for other in others {
            for column in reference.feature_columns() {
                let (Some(ref_values), Some(values)) =
                    (reference.numeric_column(&column), other.numeric_column(&column))
                else {
                    continue;
                };
                let (Some(ref_mean), Some(other_mean)) = (mean(&ref_values), mean(&values))
                else {
                    continue;
                };
                let shift = (other_mean - ref_mean).abs() / ref_mean.abs().max(f64::EPSILON);
                let passed = shift <= max_shift;
                all_passed &= passed;
                table.push_row(vec![
                    other.input_id().into(),
                    column.into(),
                    ref_mean.into(),
                    other_mean.into(),
                    shift.into(),
                    passed.into(),
                ])?;
            }
        }

        RawResult::builder().table(table).passed(all_passed).build()
    })
    .input("datasets")
    .required_param("max_mean_shift")
    .description("Relative shift of feature means between the first dataset and every other one.")
    .tag("data_drift")
}
