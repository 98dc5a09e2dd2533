//! In-memory representation of a single dataset record.
//!
//! An [`Example`] is a loosely typed tree (maps, lists and scalars) whose
//! shape is checked against a [`SchemaNode`](crate::SchemaNode) when it is
//! encoded for storage or decoded for a caller.
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Example {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Example>),
    Map(BTreeMap<String, Example>),
}

impl Example {
    /// Name of the variant, used in mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Example::Null => "None",
            Example::Bool(_) => "bool",
            Example::Int(_) => "int",
            Example::Float(_) => "float",
            Example::Str(_) => "string",
            Example::Bytes(_) => "bytes",
            Example::List(_) => "list",
            Example::Map(_) => "dict",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Example::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Example::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Example::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Example::Float(v) => Some(*v),
            Example::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Example::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Example]> {
        match self {
            Example::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Example>> {
        match self {
            Example::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on a map example. Missing keys and non-map values give `None`.
    pub fn get(&self, key: &str) -> Option<&Example> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Builds a map example from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Example>,
        I: IntoIterator<Item = (K, V)>,
    {
        Example::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<bool> for Example {
    fn from(value: bool) -> Self {
        Example::Bool(value)
    }
}

impl From<i64> for Example {
    fn from(value: i64) -> Self {
        Example::Int(value)
    }
}

impl From<i32> for Example {
    fn from(value: i32) -> Self {
        Example::Int(value as i64)
    }
}

impl From<f64> for Example {
    fn from(value: f64) -> Self {
        Example::Float(value)
    }
}

impl From<f32> for Example {
    fn from(value: f32) -> Self {
        Example::Float(value as f64)
    }
}

impl From<&str> for Example {
    fn from(value: &str) -> Self {
        Example::Str(value.to_string())
    }
}

impl From<String> for Example {
    fn from(value: String) -> Self {
        Example::Str(value)
    }
}

impl From<Vec<u8>> for Example {
    fn from(value: Vec<u8>) -> Self {
        Example::Bytes(value)
    }
}

impl<T: Into<Example>> From<Option<T>> for Example {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Example::Null)
    }
}

impl From<Vec<Example>> for Example {
    fn from(value: Vec<Example>) -> Self {
        Example::List(value)
    }
}

impl From<Vec<f32>> for Example {
    fn from(value: Vec<f32>) -> Self {
        Example::List(value.into_iter().map(Example::from).collect())
    }
}

impl From<Vec<f64>> for Example {
    fn from(value: Vec<f64>) -> Self {
        Example::List(value.into_iter().map(Example::from).collect())
    }
}

impl From<Vec<String>> for Example {
    fn from(value: Vec<String>) -> Self {
        Example::List(value.into_iter().map(Example::from).collect())
    }
}

impl From<BTreeMap<String, Example>> for Example {
    fn from(value: BTreeMap<String, Example>) -> Self {
        Example::Map(value)
    }
}

impl From<serde_json::Value> for Example {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Example::Null,
            Json::Bool(b) => Example::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Example::Int(i),
                None => Example::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Example::Str(s),
            Json::Array(items) => Example::List(items.into_iter().map(Example::from).collect()),
            Json::Object(map) => Example::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Example::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Example {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Example::Null => serializer.serialize_none(),
            Example::Bool(b) => serializer.serialize_bool(*b),
            Example::Int(i) => serializer.serialize_i64(*i),
            Example::Float(f) => serializer.serialize_f64(*f),
            Example::Str(s) => serializer.serialize_str(s),
            Example::Bytes(b) => serializer.serialize_bytes(b),
            Example::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Example::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}
