//! The structured `details` payload carried by every audit entry.
//!
//! `DetailValue` is a closed, tagged value type. Maps are `BTreeMap`s, so
//! key order is fixed by construction and the canonical encoding never
//! depends on the order in which a producer inserted keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChainlogError, ChainlogResult};

/// A structured, serializable value describing an audited action.
///
/// Serializes to plain JSON (`null`, `true`, `42`, `1.5`, `"text"`, `[...]`,
/// `{...}`). `Integer` is tried before `Float` when reading, so whole
/// numbers written as integers come back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DetailValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<DetailValue>),
    Map(BTreeMap<String, DetailValue>),
}

impl DetailValue {
    /// An empty map, the usual starting point for a `details` payload.
    pub fn empty_map() -> Self {
        DetailValue::Map(BTreeMap::new())
    }

    /// Build a map from `(key, value)` pairs. Later duplicates win.
    pub fn map<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<DetailValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        DetailValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&DetailValue> {
        match self {
            DetailValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DetailValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DetailValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DetailValue::Null)
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Integer(v)
    }
}

impl From<u32> for DetailValue {
    fn from(v: u32) -> Self {
        DetailValue::Integer(i64::from(v))
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Float(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}

impl<T: Into<DetailValue>> From<Vec<T>> for DetailValue {
    fn from(v: Vec<T>) -> Self {
        DetailValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<DetailValue>> From<Option<T>> for DetailValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DetailValue::Null)
    }
}

impl TryFrom<serde_json::Value> for DetailValue {
    type Error = ChainlogError;

    /// Convert arbitrary JSON into a `DetailValue`.
    ///
    /// Fails with `EncodingFailure` for numbers that fit neither `i64` nor a
    /// finite `f64` (e.g. integers above `i64::MAX`, which would otherwise be
    /// silently rounded).
    fn try_from(value: serde_json::Value) -> ChainlogResult<Self> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => DetailValue::Null,
            Value::Bool(b) => DetailValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DetailValue::Integer(i)
                } else if n.is_u64() {
                    return Err(ChainlogError::EncodingFailure {
                        reason: format!("integer {n} exceeds the signed 64-bit range"),
                    });
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => DetailValue::Float(f),
                        _ => {
                            return Err(ChainlogError::EncodingFailure {
                                reason: format!("number {n} has no finite representation"),
                            })
                        }
                    }
                }
            }
            Value::String(s) => DetailValue::Text(s),
            Value::Array(items) => DetailValue::List(
                items
                    .into_iter()
                    .map(DetailValue::try_from)
                    .collect::<ChainlogResult<Vec<_>>>()?,
            ),
            Value::Object(map) => DetailValue::Map(
                map.into_iter()
                    .map(|(k, v)| DetailValue::try_from(v).map(|v| (k, v)))
                    .collect::<ChainlogResult<BTreeMap<_, _>>>()?,
            ),
        })
    }
}

impl From<&DetailValue> for serde_json::Value {
    fn from(value: &DetailValue) -> Self {
        use serde_json::Value;

        match value {
            DetailValue::Null => Value::Null,
            DetailValue::Bool(b) => Value::Bool(*b),
            DetailValue::Integer(i) => Value::from(*i),
            // Non-finite floats map to null here; the codec rejects them
            // before they can ever reach a committed entry.
            DetailValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DetailValue::Text(s) => Value::String(s.clone()),
            DetailValue::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            DetailValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}
