//! The schema definition language.
//!
//! A [`Schema`] describes the shape of a state tree: scalar types, shapes with
//! named properties, methods and virtual properties, lists, tuples, unions,
//! wrappers such as [`optional`] and [`validate`], and the model/collection
//! family. Schemas are plain values; [`Schema::compile`] turns one into a
//! [`CompiledSchema`](crate::CompiledSchema).
//!
//! Definitions can also be written as JSON literals, mirroring the shorthand
//! `{"text": "String", "tags": ["String"]}`:
//!
//! ```
//! use schema_store::{Schema, TypeOptions};
//! use serde_json::json;
//!
//! let schema = Schema::from(json!({"text": "String", "tags": ["String"]}));
//! let compiled = schema.compile(TypeOptions::default()).unwrap();
//! assert_eq!(compiled.root_descriptor().kind().as_str(), "object");
//! ```

use crate::{Data, Instance, ModelError, ModelResult, Value};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A method body that runs against the live instance.
pub type MethodFn = Arc<dyn Fn(&Instance, &[Value]) -> ModelResult<Value> + Send + Sync>;

/// A method body that maps the instance's current data to new data.
///
/// Whatever the body stores in the [`MethodResult`] is returned to the caller.
pub type ReducerFn =
    Arc<dyn Fn(&Instance, &Data, &[Value], &mut MethodResult) -> ModelResult<Data> + Send + Sync>;

/// Virtual property getter.
pub type GetterFn = Arc<dyn Fn(&Instance) -> ModelResult<Value> + Send + Sync>;

/// Virtual property setter.
pub type SetterFn = Arc<dyn Fn(&Instance, Value) -> ModelResult<()> + Send + Sync>;

/// Custom validation; `Err` carries the message.
pub type CheckFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Data normalization applied when coercing stored data.
pub type CoerceFn = Arc<dyn Fn(&Data) -> Data + Send + Sync>;

/// Result slot handed to reducer-style methods.
#[derive(Debug, Default)]
pub struct MethodResult(Option<Value>);

impl MethodResult {
    /// Set the value returned to the caller.
    #[inline]
    pub fn set(&mut self, value: impl Into<Value>) {
        self.0 = Some(value.into());
    }

    #[inline]
    pub(crate) fn take(self) -> Value {
        self.0.unwrap_or_default()
    }
}

/// How a method computes its effect.
#[derive(Clone)]
pub enum MethodImpl {
    /// Runs against the instance; writes go through the store.
    Call(MethodFn),
    /// Maps current data to new data, written back when it changed.
    Reducer(ReducerFn),
}

/// A method declared on a shape.
#[derive(Clone)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Whether calls are dispatched as actions. Bare methods run in place.
    pub dispatched: bool,
    /// Whether a pending argument defers the call until it settles.
    pub auto_resolve: bool,
    /// The body.
    pub implementation: MethodImpl,
}

impl MethodDescriptor {
    /// A dispatched method.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&Instance, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dispatched: true,
            auto_resolve: false,
            implementation: MethodImpl::Call(Arc::new(f)),
        }
    }

    /// A dispatched reducer-style method.
    pub fn reducer(
        name: impl Into<String>,
        f: impl Fn(&Instance, &Data, &[Value], &mut MethodResult) -> ModelResult<Data>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dispatched: true,
            auto_resolve: false,
            implementation: MethodImpl::Reducer(Arc::new(f)),
        }
    }

    /// Run in place instead of dispatching an action.
    #[must_use]
    pub fn bare(mut self) -> Self {
        self.dispatched = false;
        self
    }

    /// Defer the call while any argument is pending.
    #[must_use]
    pub fn auto_resolve(mut self) -> Self {
        self.auto_resolve = true;
        self
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("dispatched", &self.dispatched)
            .field("auto_resolve", &self.auto_resolve)
            .finish_non_exhaustive()
    }
}

/// A computed property with an optional setter.
#[derive(Clone, Default)]
pub struct VirtualDescriptor {
    pub get: Option<GetterFn>,
    pub set: Option<SetterFn>,
}

impl VirtualDescriptor {
    /// A read-only virtual property.
    pub fn getter(f: impl Fn(&Instance) -> ModelResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            get: Some(Arc::new(f)),
            set: None,
        }
    }

    /// Add a setter; assignments are dispatched as actions.
    #[must_use]
    pub fn with_setter(
        mut self,
        f: impl Fn(&Instance, Value) -> ModelResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for VirtualDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDescriptor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// A validation rule attached with [`validate`].
#[derive(Clone)]
pub enum Validator {
    /// The value's string form must match.
    Pattern(Regex),
    /// Arbitrary check.
    Check(CheckFn),
}

impl Validator {
    /// A custom check.
    pub fn check(f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Validator::Check(Arc::new(f))
    }

    /// A pattern rule from regex source.
    pub fn pattern(source: &str) -> ModelResult<Self> {
        Regex::new(source)
            .map(Validator::Pattern)
            .map_err(|e| ModelError::schema(format!("Invalid validation pattern: {}", e)))
    }

    /// Run the rule; `Some` carries the failure message.
    pub fn run(&self, value: &Value) -> Option<String> {
        match self {
            Validator::Pattern(re) => {
                if re.is_match(&value.to_string()) {
                    None
                } else {
                    Some(format!("Must match /{}/", re.as_str()))
                }
            }
            Validator::Check(f) => f(value).err(),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Pattern(re) => write!(f, "Pattern(/{}/)", re.as_str()),
            Validator::Check(_) => write!(f, "Check"),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ShapeEntry {
    Prop(Schema),
    Method(MethodDescriptor),
    Virtual(VirtualDescriptor),
}

/// An object definition: named properties, a rest type under `*`, methods
/// and virtual properties, in declaration order.
///
/// ```
/// use schema_store::{Schema, Shape};
///
/// let todo = Shape::new()
///     .prop("text", Schema::String)
///     .prop("completed", Schema::Boolean);
/// assert_eq!(todo.prop_names(), vec!["text", "completed"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Shape {
    pub(crate) entries: Vec<(String, ShapeEntry)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, name: String, entry: ShapeEntry) -> Self {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((name, entry)),
        }
        self
    }

    /// Declare a property.
    #[must_use]
    pub fn prop(self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.insert(name.into(), ShapeEntry::Prop(schema.into()))
    }

    /// Declare the type of every undeclared key.
    #[must_use]
    pub fn rest(self, schema: impl Into<Schema>) -> Self {
        self.prop("*", schema)
    }

    /// Declare a method.
    #[must_use]
    pub fn method(self, method: MethodDescriptor) -> Self {
        self.insert(method.name.clone(), ShapeEntry::Method(method))
    }

    /// Declare a model constructor. It receives the `create` arguments after
    /// the record has been initialized with defaults and its id.
    #[must_use]
    pub fn constructor(
        self,
        f: impl Fn(&Instance, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.method(MethodDescriptor::new("constructor", f))
    }

    /// Declare a virtual property.
    #[must_use]
    pub fn virtual_prop(self, name: impl Into<String>, descriptor: VirtualDescriptor) -> Self {
        self.insert(name.into(), ShapeEntry::Virtual(descriptor))
    }

    /// Names of declared properties, excluding the rest type.
    pub fn prop_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(name, entry)| name != "*" && matches!(entry, ShapeEntry::Prop(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub(crate) fn prop_schema(&self, name: &str) -> Option<&Schema> {
        self.entries.iter().find_map(|(n, entry)| match entry {
            ShapeEntry::Prop(schema) if n == name => Some(schema),
            _ => None,
        })
    }
}

/// A named model definition.
#[derive(Clone, Debug)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) definition: Box<Schema>,
}

impl ModelDef {
    /// The model name, e.g. `Todo`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection key for this model: its name with a lower-cased first
    /// letter, e.g. `todo` for `Todo`.
    pub fn collection_key(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// A type definition.
#[derive(Clone, Debug)]
pub enum Schema {
    /// Any plain object.
    Object,
    /// Any plain array.
    Array,
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Date,
    RegExp,
    Error,
    /// A string id marking a model's identity key.
    ObjectId,
    /// JSON shorthand, resolved at compile time.
    Literal(serde_json::Value),
    /// Object with declared members.
    Shape(Shape),
    /// Homogeneous array.
    List(Box<Schema>),
    /// Fixed-length array.
    Tuple(Vec<Schema>),
    /// First matching member wins.
    Union(Vec<Schema>),
    /// The inner type or undefined.
    Optional(Box<Schema>),
    /// The base type with an extra rule.
    Validate(Box<Schema>, Validator),
    /// The base type with a data normalization step.
    Coerce(Box<Schema>, Coercion),
    /// A single number, string or boolean.
    Constant(serde_json::Value),
    /// Id of a model instance held in an enclosing collection.
    Reference(String),
    /// A model stored in place.
    Model(ModelDef),
    /// Models keyed by id.
    Collection(ModelDef),
    /// One collection per model.
    Collections(Vec<ModelDef>),
    /// A literal object carrying `type`, `validate` and `optional` options.
    Spec {
        ty: Box<Schema>,
        validate: Option<Validator>,
        optional: bool,
    },
}

/// A data normalization attached with [`coerce`].
#[derive(Clone)]
pub struct Coercion(pub CoerceFn);

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Coercion")
    }
}

impl From<Shape> for Schema {
    fn from(shape: Shape) -> Self {
        Schema::Shape(shape)
    }
}

impl From<ModelDef> for Schema {
    fn from(def: ModelDef) -> Self {
        Schema::Model(def)
    }
}

impl From<serde_json::Value> for Schema {
    fn from(literal: serde_json::Value) -> Self {
        Schema::Literal(literal)
    }
}

/// Empty shape builder.
#[inline]
pub fn shape() -> Shape {
    Shape::new()
}

/// Homogeneous array of `item`.
#[inline]
pub fn list(item: impl Into<Schema>) -> Schema {
    Schema::List(Box::new(item.into()))
}

/// Fixed-length array; needs at least two members.
#[inline]
pub fn tuple(items: Vec<Schema>) -> Schema {
    Schema::Tuple(items)
}

/// First-match union of `members`.
#[inline]
pub fn union(members: Vec<Schema>) -> Schema {
    Schema::Union(members)
}

/// `schema` or undefined.
#[inline]
pub fn optional(schema: impl Into<Schema>) -> Schema {
    Schema::Optional(Box::new(schema.into()))
}

/// `schema` plus a validation rule.
#[inline]
pub fn validate(schema: impl Into<Schema>, validator: Validator) -> Schema {
    Schema::Validate(Box::new(schema.into()), validator)
}

/// `schema` plus a normalization applied to stored data.
pub fn coerce(schema: impl Into<Schema>, f: impl Fn(&Data) -> Data + Send + Sync + 'static) -> Schema {
    Schema::Coerce(Box::new(schema.into()), Coercion(Arc::new(f)))
}

/// A constant number, string or boolean.
#[inline]
pub fn constant(value: impl Into<serde_json::Value>) -> Schema {
    Schema::Constant(value.into())
}

/// A reference to a model by name or by collection key.
#[inline]
pub fn reference(target: impl Into<String>) -> Schema {
    Schema::Reference(target.into())
}

/// A named model. `definition` must describe an object.
pub fn model(name: impl Into<String>, definition: impl Into<Schema>) -> ModelDef {
    ModelDef {
        name: name.into(),
        definition: Box::new(definition.into()),
    }
}

/// A collection of `model` keyed by id.
#[inline]
pub fn collection(model: ModelDef) -> Schema {
    Schema::Collection(model)
}

/// One collection per model, keyed by each model's collection key.
#[inline]
pub fn collections(models: Vec<ModelDef>) -> Schema {
    Schema::Collections(models)
}

/// Constructor names recognized in JSON literals.
pub(crate) fn named_type(name: &str) -> Option<Schema> {
    Some(match name {
        "Object" => Schema::Object,
        "Array" => Schema::Array,
        "String" => Schema::String,
        "Number" => Schema::Number,
        "Boolean" => Schema::Boolean,
        "Date" => Schema::Date,
        "RegExp" => Schema::RegExp,
        "Error" => Schema::Error,
        "ObjectId" => Schema::ObjectId,
        "null" | "Null" => Schema::Null,
        "undefined" | "Undefined" => Schema::Undefined,
        _ => return None,
    })
}

/// Resolve JSON shorthand into a schema.
///
/// - a constructor name such as `"String"`;
/// - `[]` for any array, `[T]` for a list, `[A, B, ...]` for a union;
/// - `{}` for any object;
/// - an object whose `type` names a constructor, with optional `validate`
///   (regex source) and `optional` flags;
/// - any other object is a shape, with `*` as the rest key.
pub(crate) fn resolve_literal(literal: &serde_json::Value) -> ModelResult<Schema> {
    use serde_json::Value as Json;
    match literal {
        Json::Null => Ok(Schema::Null),
        Json::String(name) => {
            named_type(name).ok_or_else(|| ModelError::schema(format!("Unknown type \"{}\"", name)))
        }
        Json::Array(items) => match items.as_slice() {
            [] => Ok(Schema::Array),
            [item] => Ok(list(resolve_literal(item)?)),
            many => many
                .iter()
                .map(resolve_literal)
                .collect::<ModelResult<Vec<_>>>()
                .map(Schema::Union),
        },
        Json::Object(map) if map.is_empty() => Ok(Schema::Object),
        Json::Object(map) => {
            if let Some(ty) = map
                .get("type")
                .and_then(Json::as_str)
                .and_then(named_type)
            {
                let validate = match map.get("validate") {
                    Some(Json::String(source)) => Some(Validator::pattern(source)?),
                    Some(other) => {
                        return Err(ModelError::schema(format!(
                            "Unsupported validate option {}",
                            other
                        )))
                    }
                    None => None,
                };
                let optional = map.get("optional").and_then(Json::as_bool).unwrap_or(false);
                return Ok(Schema::Spec {
                    ty: Box::new(ty),
                    validate,
                    optional,
                });
            }
            let mut shape = Shape::new();
            for (name, member) in map {
                shape = shape.prop(name.clone(), resolve_literal(member)?);
            }
            Ok(Schema::Shape(shape))
        }
        other => Err(ModelError::schema(format!("Unknown type {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_constructor_names() {
        assert!(matches!(resolve_literal(&json!("String")).unwrap(), Schema::String));
        assert!(matches!(resolve_literal(&json!(null)).unwrap(), Schema::Null));
        let err = resolve_literal(&json!("Strin")).unwrap_err();
        assert!(matches!(err, ModelError::Schema { .. }));
        assert!(resolve_literal(&json!(42)).is_err());
    }

    #[test]
    fn test_literal_arrays() {
        assert!(matches!(resolve_literal(&json!([])).unwrap(), Schema::Array));
        assert!(matches!(resolve_literal(&json!(["Number"])).unwrap(), Schema::List(_)));
        match resolve_literal(&json!(["Number", "String"])).unwrap() {
            Schema::Union(members) => assert_eq!(members.len(), 2),
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_objects() {
        assert!(matches!(resolve_literal(&json!({})).unwrap(), Schema::Object));
        match resolve_literal(&json!({"type": "String", "validate": "^a", "optional": true})).unwrap()
        {
            Schema::Spec { validate, optional, .. } => {
                assert!(validate.is_some());
                assert!(optional);
            }
            other => panic!("expected type options, got {:?}", other),
        }
        match resolve_literal(&json!({"type": ["String"], "text": "String"})).unwrap() {
            Schema::Shape(shape) => assert_eq!(shape.prop_names(), vec!["text", "type"]),
            other => panic!("expected shape, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_redeclaration_replaces() {
        let shape = shape().prop("a", Schema::String).prop("a", Schema::Number);
        assert_eq!(shape.prop_names(), vec!["a"]);
        assert!(matches!(shape.prop_schema("a"), Some(Schema::Number)));
    }

    #[test]
    fn test_validator_pattern_message() {
        let validator = Validator::pattern("^\\d+$").unwrap();
        assert_eq!(validator.run(&Value::from("123")), None);
        assert_eq!(validator.run(&Value::from(42)), None);
        assert_eq!(validator.run(&Value::from("abc")).unwrap(), "Must match /^\\d+$/");
    }

    #[test]
    fn test_collection_key() {
        assert_eq!(model("Todo", shape()).collection_key(), "todo");
        assert_eq!(model("UserGroup", shape()).collection_key(), "userGroup");
    }
}
