//! Canonical value tree for test outputs.
//!
//! Test units produce numbers that JSON cannot always represent (NaN,
//! infinities, n-dimensional arrays). [`ResultValue`] holds them verbatim and
//! [`ResultValue::encode`] is the single place where they are converted to
//! JSON, either strictly (reject non-finite numbers) or leniently (encode
//! them as `null`).

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{DocError, DocResult};

/// How non-finite floats are handled during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberMode {
    /// Reject NaN and infinities with a serialization error.
    #[default]
    Strict,
    /// Encode NaN and infinities as `null`.
    Lenient,
}

/// Dense n-dimensional numeric array in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    /// Create an array, checking that `data` matches `shape`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the element count differs from the
    /// product of the shape, or if that product overflows `usize`.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> DocResult<Self> {
        // Right to left, so every trailing sub-shape product is checked too.
        let expected = shape
            .iter()
            .rev()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                DocError::serialization(format!("array shape {shape:?} overflows usize"))
            })?;
        if expected != data.len() {
            return Err(DocError::serialization(format!(
                "array of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array.
    #[must_use]
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Array shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat row-major data.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// A value produced by a test: scalar, text, nested collection or array.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResultValue {
    /// Missing value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float, possibly non-finite.
    Float(f64),
    /// Text.
    Text(String),
    /// Heterogeneous list.
    List(Vec<ResultValue>),
    /// Ordered string-keyed map.
    Map(IndexMap<String, ResultValue>),
    /// Numeric n-dimensional array.
    Array(NdArray),
}

impl ResultValue {
    /// Encode to JSON under the given number mode.
    ///
    /// # Errors
    ///
    /// In strict mode, returns a serialization error naming the path of the
    /// first non-finite number.
    pub fn encode(&self, mode: NumberMode) -> DocResult<Value> {
        self.encode_at(mode, "$")
    }

    fn encode_at(&self, mode: NumberMode, path: &str) -> DocResult<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number(Number::from(*i)),
            Self::Float(f) => encode_float(*f, mode, path)?,
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v.encode_at(mode, &format!("{path}[{i}]")))
                    .collect::<DocResult<Vec<_>>>()?,
            ),
            Self::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), v.encode_at(mode, &format!("{path}.{k}"))?);
                }
                Value::Object(map)
            }
            Self::Array(array) => nest(array.shape(), array.data(), mode, path)?,
        })
    }

    /// Convert plain JSON into a value tree.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Numeric view of the value, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether the value is [`ResultValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

fn encode_float(f: f64, mode: NumberMode, path: &str) -> DocResult<Value> {
    match Number::from_f64(f) {
        Some(n) => Ok(Value::Number(n)),
        None => match mode {
            NumberMode::Strict => Err(DocError::serialization(format!(
                "non-finite number {f} at {path} is not JSON-representable"
            ))),
            NumberMode::Lenient => Ok(Value::Null),
        },
    }
}

/// Serialize an arbitrary payload to JSON under `mode`.
///
/// `serde_json` silently writes non-finite floats as `null`. In strict mode
/// the payload is first rendered as a YAML tree, which keeps them, and the
/// first one found is reported with its path.
///
/// # Errors
///
/// Returns a serialization error if the payload cannot be serialized, or in
/// strict mode if it holds NaN or an infinity.
pub fn to_json<T: Serialize + ?Sized>(payload: &T, mode: NumberMode) -> DocResult<Value> {
    if mode == NumberMode::Strict {
        let tree = serde_yaml::to_value(payload).map_err(|e| DocError::serialization(e.to_string()))?;
        if let Some((path, f)) = first_non_finite(&tree, "$") {
            return Err(DocError::serialization(format!(
                "non-finite number {f} at {path} is not JSON-representable"
            )));
        }
    }
    serde_json::to_value(payload).map_err(|e| DocError::serialization(e.to_string()))
}

fn first_non_finite(value: &serde_yaml::Value, path: &str) -> Option<(String, f64)> {
    match value {
        serde_yaml::Value::Number(n) => n
            .as_f64()
            .filter(|f| !f.is_finite())
            .map(|f| (path.to_string(), f)),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, v)| first_non_finite(v, &format!("{path}[{i}]"))),
        serde_yaml::Value::Mapping(map) => map.iter().find_map(|(k, v)| {
            let key = k.as_str().map_or_else(|| format!("{k:?}"), str::to_string);
            first_non_finite(v, &format!("{path}.{key}"))
        }),
        serde_yaml::Value::Tagged(tagged) => first_non_finite(&tagged.value, path),
        _ => None,
    }
}

fn nest(shape: &[usize], data: &[f64], mode: NumberMode, path: &str) -> DocResult<Value> {
    let Some((&outer, inner)) = shape.split_first() else {
        return match data.first() {
            Some(&f) => encode_float(f, mode, path),
            None => Ok(Value::Null),
        };
    };
    let chunk: usize = inner.iter().product();
    let mut out = Vec::with_capacity(outer);
    for i in 0..outer {
        let slice = &data[i * chunk..(i + 1) * chunk];
        out.push(nest(inner, slice, mode, &format!("{path}[{i}]"))?);
    }
    Ok(Value::Array(out))
}

impl From<f64> for ResultValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ResultValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ResultValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for ResultValue {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(Self::Float(v as f64), Self::Int)
    }
}

impl From<bool> for ResultValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ResultValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for ResultValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(NdArray::vector(v))
    }
}

impl From<NdArray> for ResultValue {
    fn from(v: NdArray) -> Self {
        Self::Array(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for ResultValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_rejects_nan_with_path() {
        let value = ResultValue::List(vec![ResultValue::Float(1.0), ResultValue::Float(f64::NAN)]);
        let err = value.encode(NumberMode::Strict).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("$[1]"), "{msg}");
        assert!(matches!(err, DocError::Serialization(_)));
    }

    #[test]
    fn test_lenient_encodes_non_finite_as_null() {
        let value = ResultValue::List(vec![
            ResultValue::Float(f64::INFINITY),
            ResultValue::Float(f64::NEG_INFINITY),
            ResultValue::Float(0.5),
        ]);
        assert_eq!(
            value.encode(NumberMode::Lenient).unwrap(),
            json!([null, null, 0.5])
        );
    }

    #[test]
    fn test_ndarray_nests_by_shape() {
        let array = NdArray::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let encoded = ResultValue::from(array).encode(NumberMode::Strict).unwrap();
        assert_eq!(encoded, json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    }

    #[test]
    fn test_ndarray_shape_mismatch() {
        assert!(NdArray::new(vec![2, 2], vec![1.0]).is_err());
    }

    #[test]
    fn test_ndarray_shape_overflow_is_error() {
        let err = NdArray::new(vec![usize::MAX, 2], vec![]).unwrap_err();
        assert!(matches!(err, DocError::Serialization(_)));
        assert!(err.to_string().contains("overflows"));
        assert!(NdArray::new(vec![0, usize::MAX, 2], vec![]).is_err());
    }

    #[test]
    fn test_ndarray_empty_dimension() {
        let array = NdArray::new(vec![2, 0], vec![]).unwrap();
        let encoded = ResultValue::from(array).encode(NumberMode::Strict).unwrap();
        assert_eq!(encoded, json!([[], []]));
    }

    #[test]
    fn test_map_preserves_order() {
        let mut map = IndexMap::new();
        map.insert("z".to_string(), ResultValue::from(1));
        map.insert("a".to_string(), ResultValue::from("x"));
        let encoded = ResultValue::Map(map).encode(NumberMode::Strict).unwrap();
        let keys: Vec<_> = encoded.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_nested_map_path_in_error() {
        let mut map = IndexMap::new();
        map.insert("auc".to_string(), ResultValue::Float(f64::NAN));
        let err = ResultValue::Map(map).encode(NumberMode::Strict).unwrap_err();
        assert!(err.to_string().contains("$.auc"));
    }

    #[derive(Serialize)]
    struct Point {
        key: &'static str,
        value: f64,
    }

    #[test]
    fn test_to_json_strict_rejects_nested_nan() {
        let payload = vec![
            Point { key: "a", value: 1.0 },
            Point { key: "b", value: f64::NAN },
        ];
        let err = to_json(&payload, NumberMode::Strict).unwrap_err();
        assert!(matches!(err, DocError::Serialization(_)));
        assert!(err.to_string().contains("$[1].value"), "{err}");
    }

    #[test]
    fn test_to_json_lenient_and_finite() {
        let payload = vec![Point { key: "a", value: f64::INFINITY }];
        assert_eq!(
            to_json(&payload, NumberMode::Lenient).unwrap(),
            json!([{"key": "a", "value": null}])
        );
        assert_eq!(
            to_json(&json!({"n": 3, "x": 0.5}), NumberMode::Strict).unwrap(),
            json!({"n": 3, "x": 0.5})
        );
    }

    #[test]
    fn test_from_json() {
        let v = ResultValue::from_json(&json!({"a": 1, "b": [1.5, "x", null]}));
        let ResultValue::Map(map) = v else {
            panic!("expected map");
        };
        assert_eq!(map["a"], ResultValue::Int(1));
        assert_eq!(
            map["b"],
            ResultValue::List(vec![
                ResultValue::Float(1.5),
                ResultValue::Text("x".to_string()),
                ResultValue::Null
            ])
        );
    }

    #[test]
    fn test_option_conversion() {
        assert!(ResultValue::from(None::<f64>).is_null());
        assert_eq!(ResultValue::from(Some(2.0)).as_f64(), Some(2.0));
    }
}
