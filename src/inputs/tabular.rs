//! In-memory columnar dataset.

use indexmap::IndexMap;

use super::objects::Dataset;
use crate::error::{DocError, DocResult};

/// Numeric columns held in memory, with an optional target column.
#[derive(Debug, Clone)]
pub struct TabularDataset {
    input_id: String,
    columns: IndexMap<String, Vec<f64>>,
    target: Option<String>,
    rows: usize,
}

impl TabularDataset {
    /// Start building a dataset with the given identity.
    #[must_use]
    pub fn builder(input_id: impl Into<String>) -> TabularDatasetBuilder {
        TabularDatasetBuilder {
            input_id: input_id.into(),
            columns: IndexMap::new(),
            target: None,
        }
    }

    /// Borrow a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

impl Dataset for TabularDataset {
    fn input_id(&self) -> &str {
        &self.input_id
    }

    fn columns(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    fn target_column(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        self.columns.get(name).cloned()
    }

    fn len(&self) -> usize {
        self.rows
    }
}

/// Builder for [`TabularDataset`].
#[derive(Debug)]
pub struct TabularDatasetBuilder {
    input_id: String,
    columns: IndexMap<String, Vec<f64>>,
    target: Option<String>,
}

impl TabularDatasetBuilder {
    /// Add a numeric column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    /// Mark a column as the target.
    #[must_use]
    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    /// Build the dataset.
    ///
    /// # Errors
    ///
    /// Fails if columns differ in length or the target column is absent.
    pub fn build(self) -> DocResult<TabularDataset> {
        let rows = self.columns.values().next().map_or(0, Vec::len);
        if let Some((name, col)) = self.columns.iter().find(|(_, c)| c.len() != rows) {
            return Err(DocError::config(format!(
                "dataset '{}': column '{name}' has {} rows, expected {rows}",
                self.input_id,
                col.len()
            )));
        }
        if let Some(target) = &self.target {
            if !self.columns.contains_key(target) {
                return Err(DocError::config(format!(
                    "dataset '{}': target column '{target}' does not exist",
                    self.input_id
                )));
            }
        }
        Ok(TabularDataset {
            input_id: self.input_id,
            columns: self.columns,
            target: self.target,
            rows,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_introspect() {
        let ds = TabularDataset::builder("train")
            .column("x1", vec![0.0, 1.0, 2.0])
            .column("x2", vec![3.0, 4.0, 5.0])
            .column("y", vec![0.0, 1.0, 1.0])
            .target("y")
            .build()
            .unwrap();
        assert_eq!(ds.input_id(), "train");
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.feature_columns(), ["x1", "x2"]);
        assert_eq!(ds.target_column(), Some("y"));
        assert_eq!(ds.numeric_column("x2"), Some(vec![3.0, 4.0, 5.0]));
        assert!(ds.numeric_column("missing").is_none());
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = TabularDataset::builder("bad")
            .column("a", vec![1.0])
            .column("b", vec![1.0, 2.0])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let result = TabularDataset::builder("bad")
            .column("a", vec![1.0])
            .target("y")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_dataset() {
        let ds = TabularDataset::builder("empty").build().unwrap();
        assert!(ds.is_empty());
    }
}
