//! Input context resolution.
//!
//! A test declares what it needs as [`InputRequirement`]s and
//! [`ParamSpec`]s. [`InputContext::resolve`] checks the caller's
//! [`Inputs`] and parameters against those declarations and produces the
//! immutable context the test runs against.

pub mod objects;
pub mod tabular;

pub use objects::{Dataset, InputValue, Model};
pub use tabular::{TabularDataset, TabularDatasetBuilder};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{DocError, DocResult};
use crate::result::InputRef;

/// Test parameters: name to JSON value.
pub type Params = Map<String, Value>;

/// How many objects a requirement binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Exactly one object.
    One,
    /// A sequence of two or more objects.
    Many,
}

/// A declared input: a logical name, an optional attribute path, and a
/// cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputRequirement {
    /// Logical input name.
    pub name: String,
    /// Attribute segments followed after resolving `name`.
    pub path: Vec<String>,
    /// Expected cardinality of the resolved value.
    pub cardinality: Cardinality,
}

impl InputRequirement {
    /// Requirement for exactly one object.
    #[must_use]
    pub fn one(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
            cardinality: Cardinality::One,
        }
    }

    /// Requirement for two or more objects.
    #[must_use]
    pub fn many(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
            cardinality: Cardinality::Many,
        }
    }

    /// Parse a dotted declaration such as `model.test_dataset`.
    ///
    /// `datasets` and `models` are sequences; everything else binds one
    /// object.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let mut segments = spec.split('.').map(str::to_string);
        let name = segments.next().unwrap_or_default();
        let path: Vec<String> = segments.collect();
        let cardinality = if path.is_empty() && matches!(name.as_str(), "datasets" | "models") {
            Cardinality::Many
        } else {
            Cardinality::One
        };
        Self {
            name,
            path,
            cardinality,
        }
    }

    /// Follow an attribute after resolving the name.
    #[must_use]
    pub fn with_path(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Key the resolved value is stored under in the context.
    #[must_use]
    pub fn key(&self) -> String {
        if self.path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.path.join("."))
        }
    }
}

/// A declared parameter, with an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Default value; `None` makes the parameter required.
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Parameter with a default value.
    #[must_use]
    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    /// Parameter that callers must supply.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

/// Caller-provided objects keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    values: IndexMap<String, InputValue>,
}

impl Inputs {
    /// Empty input set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a dataset.
    #[must_use]
    pub fn dataset(mut self, name: impl Into<String>, dataset: Arc<dyn Dataset>) -> Self {
        self.values.insert(name.into(), InputValue::Dataset(dataset));
        self
    }

    /// Bind a model.
    #[must_use]
    pub fn model(mut self, name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        self.values.insert(name.into(), InputValue::Model(model));
        self
    }

    /// Bind a sequence of datasets.
    #[must_use]
    pub fn datasets(mut self, name: impl Into<String>, datasets: Vec<Arc<dyn Dataset>>) -> Self {
        self.values.insert(name.into(), InputValue::Datasets(datasets));
        self
    }

    /// Bind a sequence of models.
    #[must_use]
    pub fn models(mut self, name: impl Into<String>, models: Vec<Arc<dyn Model>>) -> Self {
        self.values.insert(name.into(), InputValue::Models(models));
        self
    }

    /// Bind any value.
    pub fn insert(&mut self, name: impl Into<String>, value: InputValue) {
        self.values.insert(name.into(), value);
    }

    /// Look up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut values = self.values.clone();
        for (k, v) in &other.values {
            values.insert(k.clone(), v.clone());
        }
        Self { values }
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolved inputs and effective parameters for one test invocation.
///
/// Built per invocation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct InputContext {
    test_id: String,
    values: IndexMap<String, InputValue>,
    params: Params,
}

impl InputContext {
    /// Resolve declared requirements and parameters.
    ///
    /// # Errors
    ///
    /// - `MissingInput` naming the absent input or the first unresolved
    ///   attribute segment
    /// - `InvalidInput` when cardinality does not match
    /// - `MissingParameter` when a parameter has no default and no override
    pub fn resolve(
        test_id: &str,
        requirements: &[InputRequirement],
        param_specs: &[ParamSpec],
        inputs: &Inputs,
        overrides: &Params,
    ) -> DocResult<Self> {
        let mut values = IndexMap::with_capacity(requirements.len());
        for req in requirements {
            let mut value = inputs
                .get(&req.name)
                .cloned()
                .ok_or_else(|| DocError::missing_input(test_id, &req.name))?;
            for segment in &req.path {
                value = value
                    .attribute(segment)
                    .ok_or_else(|| DocError::missing_input(test_id, segment))?;
            }
            let value = check_cardinality(test_id, req, value)?;
            values.insert(req.key(), value);
        }

        let mut params = Params::new();
        for spec in param_specs {
            match overrides.get(&spec.name).or(spec.default.as_ref()) {
                Some(v) => {
                    params.insert(spec.name.clone(), v.clone());
                }
                None => {
                    return Err(DocError::MissingParameter {
                        test_id: test_id.to_string(),
                        param: spec.name.clone(),
                    })
                }
            }
        }
        for (k, v) in overrides {
            if !params.contains_key(k) {
                params.insert(k.clone(), v.clone());
            }
        }

        Ok(Self {
            test_id: test_id.to_string(),
            values,
            params,
        })
    }

    /// Test this context was resolved for.
    #[must_use]
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Resolved input keys, in declaration order.
    #[must_use]
    pub fn input_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Input names with the identities bound to them.
    #[must_use]
    pub fn input_refs(&self) -> Vec<InputRef> {
        self.values
            .iter()
            .flat_map(|(name, value)| {
                value.input_ids().into_iter().map(move |input_id| InputRef {
                    name: name.clone(),
                    input_id,
                })
            })
            .collect()
    }

    /// Effective parameters (defaults overridden by the caller).
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Raw resolved value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.values.get(key)
    }

    /// A single dataset.
    ///
    /// # Errors
    ///
    /// `MissingInput` if unbound, `InvalidInput` if bound to something else.
    pub fn dataset(&self, key: &str) -> DocResult<&Arc<dyn Dataset>> {
        match self.lookup(key)? {
            InputValue::Dataset(d) => Ok(d),
            _ => Err(self.wrong_kind(key, "a dataset")),
        }
    }

    /// A single model.
    ///
    /// # Errors
    ///
    /// `MissingInput` if unbound, `InvalidInput` if bound to something else.
    pub fn model(&self, key: &str) -> DocResult<&Arc<dyn Model>> {
        match self.lookup(key)? {
            InputValue::Model(m) => Ok(m),
            _ => Err(self.wrong_kind(key, "a model")),
        }
    }

    /// A sequence of datasets.
    ///
    /// # Errors
    ///
    /// `MissingInput` if unbound, `InvalidInput` if bound to something else.
    pub fn datasets(&self, key: &str) -> DocResult<&[Arc<dyn Dataset>]> {
        match self.lookup(key)? {
            InputValue::Datasets(ds) => Ok(ds),
            _ => Err(self.wrong_kind(key, "a sequence of datasets")),
        }
    }

    /// A sequence of models.
    ///
    /// # Errors
    ///
    /// `MissingInput` if unbound, `InvalidInput` if bound to something else.
    pub fn models(&self, key: &str) -> DocResult<&[Arc<dyn Model>]> {
        match self.lookup(key)? {
            InputValue::Models(ms) => Ok(ms),
            _ => Err(self.wrong_kind(key, "a sequence of models")),
        }
    }

    /// A parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// A numeric parameter.
    ///
    /// # Errors
    ///
    /// `MissingParameter` if absent, `InvalidInput` if not a number.
    pub fn param_f64(&self, name: &str) -> DocResult<f64> {
        let value = self.param(name).ok_or_else(|| DocError::MissingParameter {
            test_id: self.test_id.clone(),
            param: name.to_string(),
        })?;
        value.as_f64().ok_or_else(|| DocError::InvalidInput {
            test_id: self.test_id.clone(),
            input: name.to_string(),
            reason: format!("expected a number, got {value}"),
        })
    }

    fn lookup(&self, key: &str) -> DocResult<&InputValue> {
        self.values
            .get(key)
            .ok_or_else(|| DocError::missing_input(&self.test_id, key))
    }

    fn wrong_kind(&self, key: &str, expected: &str) -> DocError {
        DocError::InvalidInput {
            test_id: self.test_id.clone(),
            input: key.to_string(),
            reason: format!("expected {expected}"),
        }
    }
}

fn check_cardinality(
    test_id: &str,
    req: &InputRequirement,
    value: InputValue,
) -> DocResult<InputValue> {
    match req.cardinality {
        Cardinality::One => {
            let value = value.into_single();
            if value.is_sequence() {
                return Err(DocError::InvalidInput {
                    test_id: test_id.to_string(),
                    input: req.key(),
                    reason: format!("expected exactly one object, got {}", value.count()),
                });
            }
            Ok(value)
        }
        Cardinality::Many => {
            if !value.is_sequence() || value.count() < 2 {
                return Err(DocError::InvalidInput {
                    test_id: test_id.to_string(),
                    input: req.key(),
                    reason: format!("expected two or more objects, got {}", value.count()),
                });
            }
            Ok(value)
        }
    }
}
