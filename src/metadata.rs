//! Scalar metadata values and the key/value maps that carry them.
//!
//! A [`MetadataMap`] serializes as a flat JSON object with no type tags; the
//! JSON form of each scalar (`true`, `123`, `1.5`, `"s"`) is the only
//! discriminant. Decoding tries bool, integer, float and string in that order
//! and keeps the first match.
//!
//! Integers round-trip as integers: `serde_json` keeps `3` and `3.0` apart, so
//! `Int(3)` encodes to `3` and decodes back to `Int(3)`, while `Float(3.0)`
//! encodes to `3.0` and decodes back to `Float(3.0)`. The lossy edges are a
//! foreign encoder writing an integral float as `3` (read back as `Int`) and an
//! integer wider than the map's integer width (read back as `Float`).

use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;
use std::marker::PhantomData;

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ChromaError, Result};

/// A single metadata value. Exactly one variant is ever populated.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScalarValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the populated variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "int",
            ScalarValue::Float(_) => "float",
            ScalarValue::Str(_) => "string",
        }
    }

    /// Decode a raw JSON value using the ordered attempt sequence for the
    /// given integer width. Returns `None` when no variant matches.
    pub(crate) fn decode_raw<W: IntWidth>(raw: &Value) -> Option<ScalarValue> {
        decode_bool(raw)
            .or_else(|| decode_int::<W>(raw))
            .or_else(|| decode_float(raw))
            .or_else(|| decode_string(raw))
    }

    /// Like [`ScalarValue::decode_raw`] but reports the offending key.
    pub(crate) fn decode<W: IntWidth>(key: &str, raw: &Value) -> Result<ScalarValue> {
        Self::decode_raw::<W>(raw).ok_or_else(|| {
            ChromaError::decode(
                key,
                format!(
                    "expected bool, integer, float or string, found {}",
                    json_kind(raw)
                ),
            )
        })
    }

    /// Untyped-source dispatch used by [`MetadataMap::from_untyped`].
    /// Same priority as JSON decoding: bool, integer, float, string.
    fn from_untyped<W: IntWidth>(raw: &Value) -> Option<ScalarValue> {
        Self::decode_raw::<W>(raw)
    }
}

fn decode_bool(raw: &Value) -> Option<ScalarValue> {
    raw.as_bool().map(ScalarValue::Bool)
}

fn decode_int<W: IntWidth>(raw: &Value) -> Option<ScalarValue> {
    let n = raw.as_i64()?;
    W::Int::try_from(n).ok().map(|v| ScalarValue::Int(v.into()))
}

fn decode_float(raw: &Value) -> Option<ScalarValue> {
    match raw {
        Value::Number(n) => n.as_f64().map(ScalarValue::Float),
        _ => None,
    }
}

fn decode_string(raw: &Value) -> Option<ScalarValue> {
    raw.as_str().map(|s| ScalarValue::Str(s.to_string()))
}

pub(crate) fn json_kind(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Str(v) => f.write_str(v),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Bool(v) => serializer.serialize_bool(*v),
            ScalarValue::Int(v) => serializer.serialize_i64(*v),
            ScalarValue::Float(v) if !v.is_finite() => Err(S::Error::custom(format!(
                "non-finite float {v} cannot be encoded as JSON"
            ))),
            ScalarValue::Float(v) => serializer.serialize_f64(*v),
            ScalarValue::Str(v) => serializer.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        ScalarValue::decode_raw::<Int64>(&raw).ok_or_else(|| {
            D::Error::custom(format!(
                "expected bool, integer, float or string, found {}",
                json_kind(&raw)
            ))
        })
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int(value.into())
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float(value.into())
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Str(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Str(value)
    }
}

/// Integer width carried by a metadata map.
pub trait IntWidth: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    type Int: Copy + fmt::Debug + Into<i64> + TryFrom<i64>;
    const BITS: u32;
}

/// 32-bit integers (collection metadata).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Int32;

/// 64-bit integers (document metadata).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Int64;

impl IntWidth for Int32 {
    type Int = i32;
    const BITS: u32 = 32;
}

impl IntWidth for Int64 {
    type Int = i64;
    const BITS: u32 = 64;
}

/// Unordered mapping from key to [`ScalarValue`].
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataMap<W: IntWidth> {
    entries: HashMap<String, ScalarValue>,
    _width: PhantomData<W>,
}

/// Metadata attached to a collection.
pub type CollectionMetadata = MetadataMap<Int32>;

/// Metadata attached to a single record.
pub type DocumentMetadata = MetadataMap<Int64>;

impl<W: IntWidth> Default for MetadataMap<W> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            _width: PhantomData,
        }
    }
}

impl<W: IntWidth> MetadataMap<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from untyped values, silently dropping anything that is
    /// not a bool, integer, float or string.
    pub fn from_untyped<I, K>(source: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut map = Self::new();
        for (key, raw) in source {
            let key = key.into();
            match ScalarValue::from_untyped::<W>(&raw) {
                Some(value) => {
                    map.entries.insert(key, value);
                }
                None => {
                    tracing::debug!(
                        target: "chroma::metadata",
                        key = %key,
                        kind = json_kind(&raw),
                        "dropping unsupported metadata value"
                    );
                }
            }
        }
        map
    }

    /// Strict counterpart of [`MetadataMap::from_untyped`]: an unsupported
    /// value fails with [`ChromaError::Decode`] naming its key.
    pub fn try_from_untyped<I, K>(source: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut map = Self::new();
        for (key, raw) in source {
            let key = key.into();
            let value = ScalarValue::decode::<W>(&key, &raw)?;
            map.entries.insert(key, value);
        }
        Ok(map)
    }

    /// Decode a flat JSON object.
    pub fn from_json_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Self::try_from_untyped(object),
            other => Err(ChromaError::Serialization(
                <serde_json::Error as serde::de::Error>::custom(format!(
                    "metadata must be a JSON object, found {}",
                    json_kind(&other)
                )),
            )),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json_value(value)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.entries.insert(key.into(), ScalarValue::Bool(value));
        self
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: W::Int) -> &mut Self {
        self.entries.insert(key.into(), ScalarValue::Int(value.into()));
        self
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.entries.insert(key.into(), ScalarValue::Float(value));
        self
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .insert(key.into(), ScalarValue::Str(value.into()));
        self
    }

    /// Insert an already-built value. Integers outside this map's width and
    /// non-finite floats are rejected.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: ScalarValue,
    ) -> Result<Option<ScalarValue>> {
        let key = key.into();
        match value {
            ScalarValue::Int(n) if W::Int::try_from(n).is_err() => {
                return Err(ChromaError::InvalidInput(format!(
                    "integer {n} for key `{key}` does not fit in {} bits",
                    W::BITS
                )));
            }
            ScalarValue::Float(v) if !v.is_finite() => {
                return Err(ChromaError::InvalidInput(format!(
                    "non-finite float {v} for key `{key}`"
                )));
            }
            _ => {}
        }
        Ok(self.entries.insert(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.entries.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries.get(key).and_then(ScalarValue::as_bool)
    }

    pub fn get_int(&self, key: &str) -> Option<W::Int> {
        self.entries
            .get(key)
            .and_then(ScalarValue::as_i64)
            .and_then(|n| W::Int::try_from(n).ok())
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(ScalarValue::as_f64)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(ScalarValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ScalarValue> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, ScalarValue> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, W: IntWidth> IntoIterator for &'a MetadataMap<W> {
    type Item = (&'a String, &'a ScalarValue);
    type IntoIter = hash_map::Iter<'a, String, ScalarValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<W: IntWidth> Serialize for MetadataMap<W> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, W: IntWidth> Deserialize<'de> for MetadataMap<W> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let object = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Self::try_from_untyped(object).map_err(D::Error::custom)
    }
}
