//! Test result documents and the wire records they are shipped as.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::figure::Figure;
use super::value::NumberMode;
use super::{RawResult, ResultSummary, TestKind};
use crate::error::{DocError, DocResult};

/// A logical input name and the id of the object bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InputRef {
    /// Logical name (`dataset`, `model`, ...).
    pub name: String,
    /// Identity of the bound object.
    pub input_id: String,
}

/// A test's outcome together with everything needed to document it.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Id the result is documented under, including any `:tag` suffix.
    pub result_id: String,
    /// Registered test id.
    pub test_id: String,
    /// Human-readable test name.
    pub name: String,
    /// Test kind.
    pub kind: TestKind,
    /// Test description.
    pub description: String,
    /// Inputs the test ran against.
    pub inputs: Vec<InputRef>,
    /// Effective parameters.
    pub params: Map<String, Value>,
    /// Fingerprint hex of the execution.
    pub ref_id: String,
    /// Shared, read-only raw output.
    pub raw: Arc<RawResult>,
    /// Titled summary tables; keeps the raw verdict.
    pub summary: ResultSummary,
}

impl TestResult {
    /// Verdict, for threshold tests.
    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        if self.kind.has_verdict() {
            self.raw.passed()
        } else {
            None
        }
    }

    fn input_ids(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.input_id.clone()).collect()
    }

    /// Convert to the requests that document this result.
    ///
    /// Figures are cloned out of the shared raw result; ownership of the
    /// clones passes to the batch and from there to the outgoing requests.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a value is not JSON-representable
    /// under `mode`, or a threshold test carries no verdict.
    pub fn to_upload_batch(
        &self,
        section_id: Option<&str>,
        position: Option<usize>,
        mode: NumberMode,
    ) -> DocResult<UploadBatch> {
        let summary = &self.summary;
        let mut batch = UploadBatch {
            result_id: self.result_id.clone(),
            section_id: section_id.map(str::to_string),
            position,
            figures: self.raw.figures().cloned().collect(),
            metric: None,
            test_result: None,
            metadata: Vec::new(),
        };

        match self.kind {
            TestKind::ThresholdTest => {
                let passed = self.raw.passed().ok_or_else(|| {
                    DocError::serialization(format!(
                        "threshold test '{}' produced no verdict",
                        self.result_id
                    ))
                })?;
                batch.test_result = Some(ThresholdTestRecord {
                    test_name: self.result_id.clone(),
                    ref_id: self.ref_id.clone(),
                    params: self.params.clone(),
                    passed,
                    inputs: self.input_ids(),
                    summary: summary.encode(mode)?,
                });
            }
            TestKind::Metric | TestKind::UnitMetric => {
                let value = match (self.kind, self.raw.scalar_value()) {
                    (TestKind::UnitMetric, Some(v)) => {
                        super::ResultValue::Float(v).encode(mode)?
                    }
                    _ => summary.encode(mode)?,
                };
                batch.metric = Some(MetricRecord {
                    kind: self.kind.as_str().to_string(),
                    scope: section_id.unwrap_or_default().to_string(),
                    key: self.result_id.clone(),
                    value,
                    inputs: self.input_ids(),
                    output_template: None,
                });
            }
        }

        if !self.description.is_empty() {
            batch.metadata.push(MetadataRecord {
                content_id: format!("test_description:{}", self.result_id),
                text: Some(self.description.clone()),
                json: None,
            });
        }

        Ok(batch)
    }
}

/// Serialized metric, posted to `log_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    /// `metric` or `unit_metric`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Section the metric belongs to, or empty.
    pub scope: String,
    /// Result id.
    pub key: String,
    /// Scalar or summary tables.
    pub value: Value,
    /// Input ids.
    pub inputs: Vec<String>,
    /// Optional rendering template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_template: Option<String>,
}

/// Serialized threshold test result, posted to `log_test_results`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdTestRecord {
    /// Result id.
    pub test_name: String,
    /// Execution fingerprint.
    pub ref_id: String,
    /// Effective parameters.
    pub params: Map<String, Value>,
    /// Verdict.
    pub passed: bool,
    /// Input ids.
    pub inputs: Vec<String>,
    /// Summary tables.
    pub summary: Value,
}

/// Text or JSON metadata, posted to `log_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    /// Content slot id.
    pub content_id: String,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// JSON content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

/// Every request needed to document one result.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    /// Result id the batch documents.
    pub result_id: String,
    /// Documentation section, if placed.
    pub section_id: Option<String>,
    /// Position within the section.
    pub position: Option<usize>,
    /// Figures to upload first.
    pub figures: Vec<Figure>,
    /// Metric record, for metrics.
    pub metric: Option<MetricRecord>,
    /// Test record, for threshold tests.
    pub test_result: Option<ThresholdTestRecord>,
    /// Metadata records.
    pub metadata: Vec<MetadataRecord>,
}

impl UploadBatch {
    /// Number of HTTP requests the batch turns into.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.figures.len()
            + usize::from(self.metric.is_some())
            + usize::from(self.test_result.is_some())
            + self.metadata.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::result::{ResultTable, ResultValue};
    use serde_json::json;

    fn result(kind: TestKind, raw: RawResult) -> TestResult {
        let summary = raw.summary("Zeros");
        TestResult {
            result_id: "modeldoc.data_validation.Zeros:raw".to_string(),
            test_id: "modeldoc.data_validation.Zeros".to_string(),
            name: "Zeros".to_string(),
            kind,
            description: "Share of zero values per column.".to_string(),
            inputs: vec![InputRef {
                name: "dataset".to_string(),
                input_id: "raw_ds".to_string(),
            }],
            params: Map::new(),
            ref_id: "abc123".to_string(),
            raw: Arc::new(raw),
            summary,
        }
    }

    #[test]
    fn test_threshold_batch() {
        let mut table = ResultTable::new(["column", "zeros_pct"]);
        table.push_row(vec!["age".into(), 0.0.into()]).unwrap();
        let raw = RawResult::builder()
            .table(table)
            .passed(true)
            .figure(crate::result::Figure::png("hist", vec![1]))
            .build()
            .unwrap();
        let batch = result(TestKind::ThresholdTest, raw)
            .to_upload_batch(Some("data_quality"), Some(2), NumberMode::Strict)
            .unwrap();

        let record = batch.test_result.as_ref().unwrap();
        assert!(record.passed);
        assert_eq!(record.inputs, ["raw_ds"]);
        assert_eq!(record.summary[0]["title"], json!("Zeros"));
        assert!(batch.metric.is_none());
        assert_eq!(batch.figures.len(), 1);
        assert_eq!(batch.metadata.len(), 1);
        assert_eq!(batch.request_count(), 3);
        assert_eq!(batch.section_id.as_deref(), Some("data_quality"));
    }

    #[test]
    fn test_threshold_without_verdict_is_rejected() {
        let batch = result(TestKind::ThresholdTest, RawResult::scalar(1.0)).to_upload_batch(
            None,
            None,
            NumberMode::Strict,
        );
        assert!(matches!(batch, Err(DocError::Serialization(_))));
    }

    #[test]
    fn test_unit_metric_value_is_scalar() {
        let batch = result(TestKind::UnitMetric, RawResult::scalar(0.87))
            .to_upload_batch(None, None, NumberMode::Strict)
            .unwrap();
        let metric = batch.metric.unwrap();
        assert_eq!(metric.value, json!(0.87));
        assert_eq!(metric.kind, "unit_metric");
        assert_eq!(metric.scope, "");
        let wire = serde_json::to_value(&metric).unwrap();
        assert_eq!(wire["type"], json!("unit_metric"));
        assert!(wire.get("output_template").is_none());
    }

    #[test]
    fn test_unit_metric_nan_strict() {
        let batch = result(TestKind::UnitMetric, RawResult::scalar(f64::NAN)).to_upload_batch(
            None,
            None,
            NumberMode::Strict,
        );
        assert!(batch.is_err());
    }

    #[test]
    fn test_metric_passed_is_none() {
        let raw = RawResult::builder()
            .metadata(ResultValue::from("x"))
            .passed(true)
            .build()
            .unwrap();
        assert_eq!(result(TestKind::Metric, raw).passed(), None);
    }

    #[test]
    fn test_metadata_record_skips_absent_fields() {
        let record = MetadataRecord {
            content_id: "x".to_string(),
            text: Some("y".to_string()),
            json: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"content_id": "x", "text": "y"})
        );
    }
}
