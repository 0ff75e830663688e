//! The canonical state tree.
//!
//! [`Data`] is the immutable, JSON-like representation that lives inside the
//! store. Containers are reference-counted, so cloning a tree is cheap and
//! unchanged subtrees stay shared between successive states. [`Data::same`]
//! exposes that sharing: it is the identity test used for change detection.

use crate::{Path, Seg};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The physical representation a stored value takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    /// Absent value.
    Undefined,
    /// JSON null.
    Null,
    /// JSON boolean.
    Boolean,
    /// JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl StorageKind {
    /// Lower-case name of the storage kind.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Undefined => "undefined",
            StorageKind::Null => "null",
            StorageKind::Boolean => "boolean",
            StorageKind::Number => "number",
            StorageKind::String => "string",
            StorageKind::Object => "object",
            StorageKind::Array => "array",
        }
    }
}

/// A node of the canonical state tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Data {
    /// Absent value. Never stored under an object key.
    #[default]
    Undefined,
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(Arc<str>),
    /// Array; slots may hold `Undefined`.
    Array(Arc<Vec<Data>>),
    /// Object with ordered keys.
    Object(Arc<BTreeMap<String, Data>>),
}

impl Data {
    /// Create a string node.
    #[inline]
    pub fn string(s: impl AsRef<str>) -> Self {
        Data::String(Arc::from(s.as_ref()))
    }

    /// Create an array node.
    #[inline]
    pub fn array(items: Vec<Data>) -> Self {
        Data::Array(Arc::new(items))
    }

    /// Create an object node. `Undefined` entries are dropped.
    pub fn object(entries: impl IntoIterator<Item = (String, Data)>) -> Self {
        Data::Object(Arc::new(
            entries
                .into_iter()
                .filter(|(_, v)| !v.is_undefined())
                .collect(),
        ))
    }

    /// An empty object node.
    #[inline]
    pub fn empty_object() -> Self {
        Data::Object(Arc::new(BTreeMap::new()))
    }

    /// Identity comparison.
    ///
    /// Scalars compare by value, containers by pointer. Two structurally equal
    /// trees built independently are *not* the same.
    pub fn same(&self, other: &Data) -> bool {
        match (self, other) {
            (Data::Undefined, Data::Undefined) | (Data::Null, Data::Null) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Number(a), Data::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Data::String(a), Data::String(b)) => Arc::ptr_eq(a, b) || a == b,
            (Data::Array(a), Data::Array(b)) => Arc::ptr_eq(a, b),
            (Data::Object(a), Data::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The storage kind of this node.
    pub fn storage_kind(&self) -> StorageKind {
        match self {
            Data::Undefined => StorageKind::Undefined,
            Data::Null => StorageKind::Null,
            Data::Bool(_) => StorageKind::Boolean,
            Data::Number(_) => StorageKind::Number,
            Data::String(_) => StorageKind::String,
            Data::Array(_) => StorageKind::Array,
            Data::Object(_) => StorageKind::Object,
        }
    }

    /// Lower-case type name, for messages.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.storage_kind().as_str()
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Data::Undefined)
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Data::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Arc<Vec<Data>>> {
        match self {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&Arc<BTreeMap<String, Data>>> {
        match self {
            Data::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a direct child. Arrays accept numeric keys.
    pub fn get(&self, seg: &Seg) -> Option<&Data> {
        match self {
            Data::Object(map) => match seg {
                Seg::Key(k) => map.get(k),
                Seg::Index(i) => map.get(&i.to_string()),
            },
            Data::Array(items) => seg.as_index().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Owned child lookup; missing children read as `Undefined`.
    #[inline]
    pub fn child(&self, seg: &Seg) -> Data {
        self.get(seg).cloned().unwrap_or_default()
    }

    /// Walk a path; missing nodes read as `Undefined`.
    pub fn get_path(&self, path: &Path) -> Data {
        let mut current = self;
        for seg in path {
            match current.get(seg) {
                Some(next) => current = next,
                None => return Data::Undefined,
            }
        }
        current.clone()
    }

    /// Whether a direct child key exists.
    pub fn has_key(&self, key: &str) -> bool {
        match self {
            Data::Object(map) => map.contains_key(key),
            Data::Array(items) => Seg::key(key).as_index().is_some_and(|i| i < items.len()),
            _ => false,
        }
    }

    /// Own keys: object keys in order, array indices as strings.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Data::Object(map) => map.keys().cloned().collect(),
            Data::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    /// `Undefined` becomes `null` in arrays and at the top level; non-finite
    /// numbers become `null` as well.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Data::Undefined | Data::Null => Json::Null,
            Data::Bool(b) => Json::Bool(*b),
            Data::Number(n) => number_to_json(*n),
            Data::String(s) => Json::String(s.to_string()),
            Data::Array(items) => Json::Array(items.iter().map(Data::to_json).collect()),
            Data::Object(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<&serde_json::Value> for Data {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Data::Null,
            Json::Bool(b) => Data::Bool(*b),
            Json::Number(n) => Data::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Data::string(s),
            Json::Array(items) => Data::array(items.iter().map(Data::from).collect()),
            Json::Object(map) => Data::object(map.iter().map(|(k, v)| (k.clone(), Data::from(v)))),
        }
    }
}

impl From<serde_json::Value> for Data {
    fn from(value: serde_json::Value) -> Self {
        Data::from(&value)
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

impl From<f64> for Data {
    fn from(n: f64) -> Self {
        Data::Number(n)
    }
}

impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Data::Number(n as f64)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::string(s)
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::String(Arc::from(s))
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Data::Undefined | Data::Null => serializer.serialize_unit(),
            Data::Bool(b) => serializer.serialize_bool(*b),
            Data::Number(n) => number_to_json(*n).serialize(serializer),
            Data::String(s) => serializer.serialize_str(s),
            Data::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Data::Object(map) => {
                let mut out = serializer.serialize_map(None)?;
                for (k, v) in map.iter().filter(|(_, v)| !v.is_undefined()) {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Data::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_same_is_identity_for_containers() {
        let a = Data::from(json!({"x": 1}));
        let b = Data::from(json!({"x": 1}));
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));
    }

    #[test]
    fn test_same_is_value_for_scalars() {
        assert!(Data::from(1.0).same(&Data::from(1.0)));
        assert!(Data::from("a").same(&Data::from("a")));
        assert!(Data::Number(f64::NAN).same(&Data::Number(f64::NAN)));
        assert!(!Data::Null.same(&Data::Undefined));
    }

    #[test]
    fn test_get_path() {
        let data = Data::from(json!({"todos": [{"text": "a"}, {"text": "b"}]}));
        assert_eq!(data.get_path(&path!("todos", 1, "text")), Data::from("b"));
        assert_eq!(data.get_path(&path!("todos", "0", "text")), Data::from("a"));
        assert!(data.get_path(&path!("todos", 5)).is_undefined());
        assert!(data.get_path(&path!("missing", "deep")).is_undefined());
    }

    #[test]
    fn test_keys() {
        let data = Data::from(json!({"b": 1, "a": 2}));
        assert_eq!(data.keys(), vec!["a", "b"]);
        let list = Data::from(json!([1, 2, 3]));
        assert_eq!(list.keys(), vec!["0", "1", "2"]);
        assert!(list.has_key("2"));
        assert!(!list.has_key("3"));
    }

    #[test]
    fn test_json_round_trip_drops_undefined() {
        let data = Data::array(vec![Data::Undefined, Data::from(2.0)]);
        assert_eq!(data.to_json(), json!([null, 2]));
        let obj = Data::object(vec![
            ("a".to_string(), Data::Undefined),
            ("b".to_string(), Data::Bool(true)),
        ]);
        assert_eq!(serde_json::to_value(&obj).unwrap(), json!({"b": true}));
    }

    #[test]
    fn test_number_serialization() {
        assert_eq!(Data::from(3.0).to_json(), json!(3));
        assert_eq!(Data::from(1.5).to_json(), json!(1.5));
        assert_eq!(Data::Number(f64::INFINITY).to_json(), json!(null));
    }
}
