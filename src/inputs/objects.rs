//! Dataset and model capabilities consumed by test units.
//!
//! Both are opaque beyond these accessors. Implementations are shared
//! read-only between concurrently running tests; nothing here takes
//! `&mut self`.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{DocError, DocResult};

/// A dataset a test can inspect.
pub trait Dataset: Send + Sync + Debug {
    /// Stable identity of the dataset within a documentation run.
    fn input_id(&self) -> &str;

    /// All column names, in order.
    fn columns(&self) -> Vec<String>;

    /// Feature column names (all columns except the target by default).
    fn feature_columns(&self) -> Vec<String> {
        let target = self.target_column();
        self.columns()
            .into_iter()
            .filter(|c| Some(c.as_str()) != target)
            .collect()
    }

    /// Target column name, if the dataset is labelled.
    fn target_column(&self) -> Option<&str>;

    /// Numeric values of a column, if it exists and is numeric.
    fn numeric_column(&self, name: &str) -> Option<Vec<f64>>;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Whether the dataset has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Named attribute traversal (e.g. a dataset linked to this one).
    fn attribute(&self, _name: &str) -> Option<InputValue> {
        None
    }
}

/// A model a test can query for predictions.
pub trait Model: Send + Sync + Debug {
    /// Stable identity of the model within a documentation run.
    fn input_id(&self) -> &str;

    /// Library of origin (used by tests that only support some libraries).
    fn library(&self) -> &str {
        ""
    }

    /// Class or value predictions for every row of `dataset`.
    ///
    /// # Errors
    ///
    /// Implementation-defined prediction failures.
    fn predict(&self, dataset: &dyn Dataset) -> DocResult<Vec<f64>>;

    /// Positive-class probabilities for every row of `dataset`.
    ///
    /// # Errors
    ///
    /// Fails by default: not every model is probabilistic.
    fn predict_proba(&self, _dataset: &dyn Dataset) -> DocResult<Vec<f64>> {
        Err(DocError::config(format!(
            "model '{}' does not provide probabilities",
            self.input_id()
        )))
    }

    /// Named attribute traversal (e.g. `test_dataset`).
    fn attribute(&self, _name: &str) -> Option<InputValue> {
        None
    }
}

/// A concrete object bound to a logical input name.
#[derive(Debug, Clone)]
pub enum InputValue {
    /// One dataset.
    Dataset(Arc<dyn Dataset>),
    /// One model.
    Model(Arc<dyn Model>),
    /// Sequence of datasets.
    Datasets(Vec<Arc<dyn Dataset>>),
    /// Sequence of models.
    Models(Vec<Arc<dyn Model>>),
}

impl InputValue {
    /// Identities of the bound objects, in order.
    #[must_use]
    pub fn input_ids(&self) -> Vec<String> {
        match self {
            Self::Dataset(d) => vec![d.input_id().to_string()],
            Self::Model(m) => vec![m.input_id().to_string()],
            Self::Datasets(ds) => ds.iter().map(|d| d.input_id().to_string()).collect(),
            Self::Models(ms) => ms.iter().map(|m| m.input_id().to_string()).collect(),
        }
    }

    /// Number of bound objects.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Dataset(_) | Self::Model(_) => 1,
            Self::Datasets(ds) => ds.len(),
            Self::Models(ms) => ms.len(),
        }
    }

    /// Follow one attribute segment. Sequences have no attributes.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Self> {
        match self {
            Self::Dataset(d) => d.attribute(name),
            Self::Model(m) => m.attribute(name),
            Self::Datasets(_) | Self::Models(_) => None,
        }
    }

    /// Unwrap a one-element sequence into a single object.
    #[must_use]
    pub fn into_single(self) -> Self {
        match self {
            Self::Datasets(mut ds) if ds.len() == 1 => Self::Dataset(ds.remove(0)),
            Self::Models(mut ms) if ms.len() == 1 => Self::Model(ms.remove(0)),
            other => other,
        }
    }

    /// Whether this binds a sequence rather than a single object.
    #[must_use]
    pub const fn is_sequence(&self) -> bool {
        matches!(self, Self::Datasets(_) | Self::Models(_))
    }
}
