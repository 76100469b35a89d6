//! Execution fingerprints.
//!
//! A fingerprint is a BLAKE3 digest over the result id, the identity of
//! every resolved input and the canonical form of the effective parameters.
//! Canonicalization sorts object keys and folds integral floats into
//! integers, so `{"x": 1}` and `{"x": 1.0}` hash identically.

use serde_json::Value;
use std::fmt;

use crate::inputs::Params;
use crate::result::InputRef;

const DOMAIN: &[u8] = b"modeldoc.fingerprint.v1";

/// Deterministic cache key for one test invocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint an invocation.
    #[must_use]
    pub fn compute(result_id: &str, inputs: &[InputRef], params: &Params) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN);
        write_str(&mut hasher, result_id);
        hasher.update(&(inputs.len() as u64).to_le_bytes());
        for input in inputs {
            write_str(&mut hasher, &input.name);
            write_str(&mut hasher, &input.input_id);
        }
        write_object(&mut hasher, params.iter());
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex characters, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonical JSON form of a parameter value.
///
/// Object keys are sorted and integral floats become integers. Two values
/// with equal canonical forms produce equal fingerprints.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Number(n) => match canonical_number(n) {
            CanonicalNumber::Int(i) => Value::from(i),
            CanonicalNumber::UInt(u) => Value::from(u),
            CanonicalNumber::Float(bits) => Value::from(f64::from_bits(bits)),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

enum CanonicalNumber {
    Int(i64),
    UInt(u64),
    Float(u64),
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn canonical_number(n: &serde_json::Number) -> CanonicalNumber {
    if let Some(i) = n.as_i64() {
        return CanonicalNumber::Int(i);
    }
    if let Some(u) = n.as_u64() {
        return CanonicalNumber::UInt(u);
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    // 2^63 is exactly representable, so the range check is exact.
    if f.is_finite() && f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) {
        CanonicalNumber::Int(f as i64)
    } else {
        CanonicalNumber::Float(f.to_bits())
    }
}

fn write_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn write_object<'a>(
    hasher: &mut blake3::Hasher,
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    hasher.update(b"{");
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for (k, v) in entries {
        write_str(hasher, k);
        write_value(hasher, v);
    }
}

fn write_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"t" } else { b"f" });
        }
        Value::Number(n) => match canonical_number(n) {
            CanonicalNumber::Int(i) => {
                hasher.update(b"i");
                hasher.update(&i.to_le_bytes());
            }
            CanonicalNumber::UInt(u) => {
                hasher.update(b"u");
                hasher.update(&u.to_le_bytes());
            }
            CanonicalNumber::Float(bits) => {
                hasher.update(b"d");
                hasher.update(&bits.to_le_bytes());
            }
        },
        Value::String(s) => {
            hasher.update(b"s");
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"[");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => write_object(hasher, map.iter()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    fn input(name: &str, id: &str) -> InputRef {
        InputRef {
            name: name.to_string(),
            input_id: id.to_string(),
        }
    }

    #[test]
    fn test_int_and_integral_float_hash_equal() {
        let a = Fingerprint::compute("t", &[], &params(json!({"x": 1})));
        let b = Fingerprint::compute("t", &[], &params(json!({"x": 1.0})));
        assert_eq!(a, b);
    }

    #[test]
    fn test_param_value_changes_fingerprint() {
        let a = Fingerprint::compute("t", &[], &params(json!({"max_percent_threshold": 0.03})));
        let b = Fingerprint::compute("t", &[], &params(json!({"max_percent_threshold": 0.05})));
        assert_ne!(a, b);
    }

    #[test]
    fn test_inputs_and_tag_change_fingerprint() {
        let p = Params::new();
        let base = Fingerprint::compute("t", &[input("dataset", "a")], &p);
        assert_ne!(base, Fingerprint::compute("t", &[input("dataset", "b")], &p));
        assert_ne!(base, Fingerprint::compute("t:raw", &[input("dataset", "a")], &p));
        assert_ne!(base, Fingerprint::compute("t", &[input("model", "a")], &p));
    }

    #[test]
    fn test_string_boundaries_are_unambiguous() {
        let a = Fingerprint::compute("ab", &[input("c", "d")], &Params::new());
        let b = Fingerprint::compute("a", &[input("bc", "d")], &Params::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let a = Fingerprint::compute("t", &[], &params(json!({"o": {"a": 1, "b": [2.0, "x"]}})));
        let b = Fingerprint::compute("t", &[], &params(json!({"o": {"b": [2, "x"], "a": 1.0}})));
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonicalize() {
        let canon = canonicalize(&json!({"b": 2.0, "a": [1.5, 3.0]}));
        assert_eq!(canon, json!({"a": [1.5, 3], "b": 2}));
    }

    #[test]
    fn test_hex_and_display() {
        let fp = Fingerprint::compute("t", &[], &Params::new());
        assert_eq!(fp.to_hex().len(), 64);
        assert_eq!(fp.to_string(), fp.to_hex());
        assert!(format!("{fp:?}").contains(&fp.short()));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_key_order_irrelevant(
                entries in prop::collection::btree_map("[a-z]{1,6}", -1000i64..1000, 0..8)
            ) {
                let forward: Params = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect();
                let reverse: Params = entries
                    .iter()
                    .rev()
                    .map(|(k, v)| (k.clone(), json!(*v as f64)))
                    .collect();
                prop_assert_eq!(
                    Fingerprint::compute("t", &[], &forward),
                    Fingerprint::compute("t", &[], &reverse)
                );
            }

            #[test]
            fn prop_distinct_values_distinct_fingerprints(a in -1e6f64..1e6, b in -1e6f64..1e6) {
                prop_assume!(a != b);
                let pa = params(json!({"x": a}));
                let pb = params(json!({"x": b}));
                prop_assert_ne!(
                    Fingerprint::compute("t", &[], &pa),
                    Fingerprint::compute("t", &[], &pb)
                );
            }
        }
    }
}
