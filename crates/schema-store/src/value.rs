//! External values: what callers assign and what reads return.
//!
//! A [`Value`] is richer than the stored [`Data`]: it can carry dates,
//! regular expressions, error objects, live [`Instance`]s and pending
//! results. Types translate between the two with `pack` and `unpack`.

use crate::data::number_to_json;
use crate::{Data, Instance, ModelError, ModelResult};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, IntoFuture};

/// An external value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Undefined,
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// Plain array.
    Array(Vec<Value>),
    /// Plain object.
    Object(BTreeMap<String, Value>),
    /// Date; `None` is an invalid date.
    Date(Option<DateTime<Utc>>),
    /// Regular expression with its flags and match cursor.
    RegExp(RegExpValue),
    /// Error object.
    Error(ErrorValue),
    /// Live object bound to a store location.
    Instance(Instance),
    /// A result that is not available yet.
    Pending(PendingValue),
}

impl Value {
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending(_))
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Take the instance out of the value.
    pub fn into_instance(self) -> ModelResult<Instance> {
        match self {
            Value::Instance(instance) => Ok(instance),
            other => Err(ModelError::invalid_operation(format!(
                "expected an object instance, found {}",
                other.type_name()
            ))),
        }
    }

    /// Lower-case type name, for messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) | Value::Instance(_) => "object",
            Value::Date(_) => "date",
            Value::RegExp(_) => "regexp",
            Value::Error(_) => "error",
            Value::Pending(_) => "pending",
        }
    }

    /// Convert a plain value into data. Instances are read through their
    /// accessors; exotic values are rejected.
    pub fn to_data(&self) -> ModelResult<Data> {
        match self {
            Value::Undefined => Ok(Data::Undefined),
            Value::Null => Ok(Data::Null),
            Value::Bool(b) => Ok(Data::Bool(*b)),
            Value::Number(n) => Ok(Data::Number(*n)),
            Value::String(s) => Ok(Data::string(s)),
            Value::Array(items) => items
                .iter()
                .map(Value::to_data)
                .collect::<ModelResult<Vec<_>>>()
                .map(Data::array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), v.to_data()?)))
                .collect::<ModelResult<Vec<_>>>()
                .map(Data::object),
            Value::Instance(instance) => instance.to_object()?.to_data(),
            other => Err(ModelError::validation(format!(
                "cannot store a {} value as plain data",
                other.type_name()
            ))),
        }
    }

    /// Convert to JSON for display and serialization.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::Pending(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Date(date) => date.map(format_date).map(Json::String).unwrap_or(Json::Null),
            Value::RegExp(re) => Json::String(re.to_string()),
            Value::Error(err) => serde_json::json!({"name": err.name, "message": err.message}),
            Value::Instance(instance) => Json::String(format!("~{}", instance.instance_path())),
        }
    }
}

/// Canonical date text: ISO 8601, millisecond precision, `Z` suffix.
pub(crate) fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Number formatting with integral values printed without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match item {
                        Value::Undefined | Value::Null => {}
                        other => write!(f, "{}", other)?,
                    }
                }
                Ok(())
            }
            Value::Object(_) | Value::Instance(_) => write!(f, "[object Object]"),
            Value::Date(Some(date)) => write!(f, "{}", format_date(*date)),
            Value::Date(None) => write!(f, "Invalid Date"),
            Value::RegExp(re) => write!(f, "{}", re),
            Value::Error(err) => write!(f, "{}", err),
            Value::Pending(_) => write!(f, "[object Promise]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(map) => f.debug_map().entries(map).finish(),
            Value::Date(date) => f.debug_tuple("Date").field(date).finish(),
            Value::RegExp(re) => f.debug_tuple("RegExp").field(re).finish(),
            Value::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Value::Instance(instance) => fmt::Debug::fmt(instance, f),
            Value::Pending(_) => write!(f, "Pending"),
        }
    }
}

/// Values compare structurally; instances by identity; pending values never
/// compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::RegExp(a), Value::RegExp(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(None)?;
                for (k, v) in map.iter().filter(|(_, v)| !v.is_undefined()) {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            other => other.to_json().serialize(serializer),
        }
    }
}

impl From<&Data> for Value {
    fn from(data: &Data) -> Self {
        match data {
            Data::Undefined => Value::Undefined,
            Data::Null => Value::Null,
            Data::Bool(b) => Value::Bool(*b),
            Data::Number(n) => Value::Number(*n),
            Data::String(s) => Value::String(s.to_string()),
            Data::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            Data::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Data> for Value {
    fn from(data: Data) -> Self {
        Value::from(&data)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from(&Data::from(&json))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Instance(instance)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(Some(date))
    }
}

impl From<RegExpValue> for Value {
    fn from(re: RegExpValue) -> Self {
        Value::RegExp(re)
    }
}

impl From<ErrorValue> for Value {
    fn from(err: ErrorValue) -> Self {
        Value::Error(err)
    }
}

impl From<PendingValue> for Value {
    fn from(pending: PendingValue) -> Self {
        Value::Pending(pending)
    }
}

/// A regular expression value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegExpValue {
    /// Pattern source text.
    pub source: String,
    /// Flag letters, any of `dgimsuy`.
    pub flags: String,
    /// Match cursor for global and sticky patterns.
    pub last_index: usize,
}

impl RegExpValue {
    /// Create a regular expression value, checking that it compiles.
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> ModelResult<Self> {
        let value = Self {
            source: source.into(),
            flags: flags.into(),
            last_index: 0,
        };
        value.compile()?;
        Ok(value)
    }

    /// Compile into a matcher honouring the `i`, `m` and `s` flags.
    pub fn compile(&self) -> ModelResult<regex::Regex> {
        let mut seen = String::new();
        for flag in self.flags.chars() {
            if !"dgimsuy".contains(flag) || seen.contains(flag) {
                return Err(ModelError::validation(format!(
                    "Invalid regular expression flags \"{}\"",
                    self.flags
                )));
            }
            seen.push(flag);
        }
        regex::RegexBuilder::new(&self.source)
            .case_insensitive(self.flags.contains('i'))
            .multi_line(self.flags.contains('m'))
            .dot_matches_new_line(self.flags.contains('s'))
            .build()
            .map_err(|e| ModelError::validation(format!("Invalid regular expression: {}", e)))
    }

    /// Test a string against the expression.
    pub fn is_match(&self, text: &str) -> ModelResult<bool> {
        Ok(self.compile()?.is_match(text))
    }
}

impl fmt::Display for RegExpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// An error object value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorValue {
    /// Error class name, e.g. `TypeError`.
    pub name: String,
    /// Human readable message.
    pub message: String,
    /// Stack trace text, one frame per line.
    pub stack: Option<String>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

type SharedResult = Shared<BoxFuture<'static, ModelResult<Value>>>;

/// A value that resolves later.
///
/// Cloning shares the underlying computation; every clone observes the same
/// result. Await it directly.
#[derive(Clone)]
pub struct PendingValue(SharedResult);

impl PendingValue {
    /// Wrap a future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ModelResult<Value>> + Send + 'static,
    {
        Self(future.boxed().shared())
    }

    /// A pending value that is already settled.
    pub fn ready(result: ModelResult<Value>) -> Self {
        Self::new(futures::future::ready(result))
    }
}

impl IntoFuture for PendingValue {
    type Output = ModelResult<Value>;
    type IntoFuture = SharedResult;

    fn into_future(self) -> Self::IntoFuture {
        self.0
    }
}
