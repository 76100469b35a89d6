//! Result model: what a test produces and how it is summarized.
//!
//! A test's [`RawResult`] is a list of tagged [`ResultItem`]s (tables,
//! scalar, pass/fail flag, figures, metadata). Every raw result converts to
//! a [`ResultSummary`] of one or more titled tables that keeps the pass/fail
//! flag. Wire records for the documentation service live in [`record`].

pub mod figure;
pub mod record;
pub mod value;

pub use figure::{Figure, FigureFormat};
pub use record::{
    InputRef, MetadataRecord, MetricRecord, TestResult, ThresholdTestRecord, UploadBatch,
};
pub use value::{to_json, NdArray, NumberMode, ResultValue};

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::error::{DocError, DocResult};

/// Kind of test unit, which decides how its result affects pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    /// Produces a pass/fail verdict.
    ThresholdTest,
    /// Produces tables or values, no verdict.
    Metric,
    /// Produces a single scalar, no verdict.
    UnitMetric,
}

impl TestKind {
    /// Whether results of this kind contribute to aggregate pass/fail.
    #[must_use]
    pub const fn has_verdict(self) -> bool {
        matches!(self, Self::ThresholdTest)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdTest => "threshold_test",
            Self::Metric => "metric",
            Self::UnitMetric => "unit_metric",
        }
    }
}

/// A titled table with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    title: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<ResultValue>>,
}

impl ResultTable {
    /// Empty table with the given columns.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: None,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from records; columns follow first appearance.
    #[must_use]
    pub fn from_records(records: Vec<IndexMap<String, ResultValue>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.swap_remove(c).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self {
            title: None,
            columns,
            rows,
        }
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the row width differs from the
    /// column count.
    pub fn push_row(&mut self, row: Vec<ResultValue>) -> DocResult<()> {
        if row.len() != self.columns.len() {
            return Err(DocError::serialization(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Table title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, aligned with [`Self::columns`].
    #[must_use]
    pub fn rows(&self) -> &[Vec<ResultValue>] {
        &self.rows
    }

    /// Look up a cell by row index and column name.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&ResultValue> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)
    }

    /// Encode as `{title, columns, data: [records]}`.
    ///
    /// # Errors
    ///
    /// Fails in strict mode when a cell holds a non-finite number.
    pub fn encode(&self, mode: NumberMode) -> DocResult<Value> {
        let mut data = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let record: IndexMap<String, ResultValue> = self
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            data.push(ResultValue::Map(record).encode(mode)?);
        }
        Ok(json!({
            "title": self.title,
            "columns": self.columns,
            "data": data,
        }))
    }
}

/// One output item of a test run.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    /// Tabular rows.
    Table(ResultTable),
    /// Single numeric value.
    Scalar(f64),
    /// Pass/fail verdict.
    PassFail(bool),
    /// Figures, keyed uniquely within the result.
    Figures(Vec<Figure>),
    /// Free-form metadata.
    Metadata(ResultValue),
}

/// In-memory output of a test unit before wire serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResult {
    items: Vec<ResultItem>,
}

impl RawResult {
    /// Start building a result.
    #[must_use]
    pub fn builder() -> RawResultBuilder {
        RawResultBuilder::default()
    }

    /// Result holding a single scalar.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self {
            items: vec![ResultItem::Scalar(value)],
        }
    }

    /// All items in production order.
    #[must_use]
    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    /// Pass/fail verdict, if the test produced one.
    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        self.items.iter().find_map(|item| match item {
            ResultItem::PassFail(p) => Some(*p),
            _ => None,
        })
    }

    /// Scalar value, if the test produced one.
    #[must_use]
    pub fn scalar_value(&self) -> Option<f64> {
        self.items.iter().find_map(|item| match item {
            ResultItem::Scalar(v) => Some(*v),
            _ => None,
        })
    }

    /// Tables in production order.
    pub fn tables(&self) -> impl Iterator<Item = &ResultTable> {
        self.items.iter().filter_map(|item| match item {
            ResultItem::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Figures in production order.
    pub fn figures(&self) -> impl Iterator<Item = &Figure> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ResultItem::Figures(f) => Some(f.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Metadata items in production order.
    pub fn metadata(&self) -> impl Iterator<Item = &ResultValue> {
        self.items.iter().filter_map(|item| match item {
            ResultItem::Metadata(m) => Some(m),
            _ => None,
        })
    }

    /// Summarize as one or more titled tables, keeping the verdict.
    ///
    /// Untitled tables are named after `title`. A result without tables is
    /// summarized from its scalar and metadata; an empty result yields one
    /// empty table so that the summary is never empty.
    #[must_use]
    pub fn summary(&self, title: &str) -> ResultSummary {
        let mut tables: Vec<ResultTable> = self.tables().cloned().collect();
        let untitled = tables.iter().filter(|t| t.title.is_none()).count();
        let mut n = 0;
        for table in &mut tables {
            if table.title.is_none() {
                n += 1;
                table.title = Some(if untitled == 1 {
                    title.to_string()
                } else {
                    format!("{title} ({n})")
                });
            }
        }

        if tables.is_empty() {
            let mut table = ResultTable::new(["name", "value"]).with_title(title);
            if let Some(v) = self.scalar_value() {
                table.rows.push(vec![ResultValue::from(title), ResultValue::Float(v)]);
            }
            for meta in self.metadata() {
                match meta {
                    ResultValue::Map(entries) => {
                        for (k, v) in entries {
                            table.rows.push(vec![ResultValue::from(k.as_str()), v.clone()]);
                        }
                    }
                    other => table
                        .rows
                        .push(vec![ResultValue::from("metadata"), other.clone()]),
                }
            }
            tables.push(table);
        }

        ResultSummary {
            tables,
            passed: self.passed(),
        }
    }
}

/// Incremental constructor for [`RawResult`].
#[derive(Debug, Default)]
pub struct RawResultBuilder {
    items: Vec<ResultItem>,
}

impl RawResultBuilder {
    /// Add a table.
    #[must_use]
    pub fn table(mut self, table: ResultTable) -> Self {
        self.items.push(ResultItem::Table(table));
        self
    }

    /// Add a scalar.
    #[must_use]
    pub fn scalar(mut self, value: f64) -> Self {
        self.items.push(ResultItem::Scalar(value));
        self
    }

    /// Add the pass/fail verdict.
    #[must_use]
    pub fn passed(mut self, passed: bool) -> Self {
        self.items.push(ResultItem::PassFail(passed));
        self
    }

    /// Add a figure.
    #[must_use]
    pub fn figure(mut self, figure: Figure) -> Self {
        if let Some(ResultItem::Figures(figs)) = self.items.last_mut() {
            figs.push(figure);
        } else {
            self.items.push(ResultItem::Figures(vec![figure]));
        }
        self
    }

    /// Add metadata.
    #[must_use]
    pub fn metadata(mut self, value: impl Into<ResultValue>) -> Self {
        self.items.push(ResultItem::Metadata(value.into()));
        self
    }

    /// Finish the result.
    ///
    /// # Errors
    ///
    /// Rejects duplicate figure keys and more than one verdict or scalar.
    pub fn build(self) -> DocResult<RawResult> {
        let mut keys = HashSet::new();
        let mut verdicts = 0;
        let mut scalars = 0;
        for item in &self.items {
            match item {
                ResultItem::Figures(figs) => {
                    for fig in figs {
                        if !keys.insert(fig.key()) {
                            return Err(DocError::serialization(format!(
                                "duplicate figure key '{}'",
                                fig.key()
                            )));
                        }
                    }
                }
                ResultItem::PassFail(_) => verdicts += 1,
                ResultItem::Scalar(_) => scalars += 1,
                _ => {}
            }
        }
        if verdicts > 1 {
            return Err(DocError::serialization("result has more than one pass/fail verdict"));
        }
        if scalars > 1 {
            return Err(DocError::serialization("result has more than one scalar"));
        }
        Ok(RawResult { items: self.items })
    }
}

/// One or more titled tables plus the optional verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    /// Titled tables, never empty.
    pub tables: Vec<ResultTable>,
    /// Verdict carried over from the raw result.
    pub passed: Option<bool>,
}

impl ResultSummary {
    /// Encode the tables as a JSON array.
    ///
    /// # Errors
    ///
    /// Fails in strict mode when a cell holds a non-finite number.
    pub fn encode(&self, mode: NumberMode) -> DocResult<Value> {
        Ok(Value::Array(
            self.tables
                .iter()
                .map(|t| t.encode(mode))
                .collect::<DocResult<Vec<_>>>()?,
        ))
    }
}
