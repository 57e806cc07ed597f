//! Structured Values
//!
//! [`Value`] is the closed set of shapes the store accepts: scalars, dates,
//! sequences and key-unique mappings. Every value is an owned tree, so a
//! cyclic graph cannot be expressed and never has to be rejected at runtime.
//!
//! ## Text Form
//!
//! Values travel as JSON. Dates have no JSON counterpart, so they are written
//! as a single-key object:
//!
//! ```text
//! Value::Date(1700000000000)  <->  {"$date": 1700000000000}
//! ```
//!
//! A caller's own single-key object whose key is `$date` or `$obj` would be
//! ambiguous, so it is wrapped once more:
//!
//! ```text
//! {"$date": 5} (an object)  <->  {"$obj": {"$date": 5}}
//! ```
//!
//! Non-finite floats become `null`, matching what a browser's JSON encoder does.

use crate::error::StorageResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved object key used to carry [`Value::Date`] through JSON.
pub const DATE_TAG: &str = "$date";

/// Reserved object key wrapping caller objects that would read as a tag.
pub const OBJECT_TAG: &str = "$obj";

/// A structured value that can be stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// Text scalar.
    String(String),
    /// Point in time, milliseconds since the Unix epoch.
    Date(i64),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Mapping with unique keys.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Builds an object from key/value pairs. Later duplicates win.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns a copy sharing no structure with `self`.
    ///
    /// Walks the tree explicitly; dates are copied as plain values.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(n) => Value::Int(*n),
            Value::Float(f) => Value::Float(*f),
            Value::String(s) => Value::String(s.as_str().to_owned()),
            Value::Date(ms) => Value::Date(*ms),
            Value::Array(items) => Value::Array(items.iter().map(Value::deep_clone).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.as_str().to_owned(), v.deep_clone()))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Looks up a field when this value is an object.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(field),
            _ => None,
        }
    }

    /// Converts to the JSON tree used on the wire.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(ms) => {
                let mut tagged = serde_json::Map::with_capacity(1);
                tagged.insert(DATE_TAG.to_string(), Json::from(*ms));
                Json::Object(tagged)
            }
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => {
                let fields: serde_json::Map<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                let reserved = map.len() == 1
                    && map.keys().all(|k| k == DATE_TAG || k == OBJECT_TAG);
                if !reserved {
                    return Json::Object(fields);
                }
                let mut wrapper = serde_json::Map::with_capacity(1);
                wrapper.insert(OBJECT_TAG.to_string(), Json::Object(fields));
                Json::Object(wrapper)
            }
        }
    }

    /// Converts from a JSON tree, recognising the date and object tags.
    pub fn from_json(json: serde_json::Value) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(mut map) => {
                if map.len() == 1 {
                    if let Some(ms) = map.get(DATE_TAG).and_then(Json::as_i64) {
                        return Value::Date(ms);
                    }
                    if let Some(Json::Object(inner)) = map.get_mut(OBJECT_TAG) {
                        return Value::object_from_json(std::mem::take(inner));
                    }
                }
                Value::object_from_json(map)
            }
        }
    }

    fn object_from_json(map: serde_json::Map<String, serde_json::Value>) -> Value {
        Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect(),
        )
    }

    /// Converts any serializable type into a value.
    pub fn from_typed<T: Serialize + ?Sized>(typed: &T) -> StorageResult<Value> {
        Ok(Value::from_json(serde_json::to_value(typed)?))
    }

    /// Converts this value into a deserializable type.
    pub fn to_typed<T: DeserializeOwned>(&self) -> StorageResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
