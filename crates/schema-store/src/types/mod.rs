//! Compiled types.
//!
//! Compiling a [`Schema`](crate::Schema) produces a [`TypeArena`]: a flat table
//! of [`TypeDescriptor`]s addressed by [`TypeId`]. Descriptors refer to their
//! children and parents by id, so recursive and self-referencing structures
//! need no shared ownership. Each descriptor carries a [`TypeHandler`] that
//! implements the type's behaviour:
//!
//! - `validate_data` / `coerce_data` check and repair stored data;
//! - `validate_assign` checks an external value before it is written;
//! - `pack` / `unpack` translate between external values and stored data;
//! - `type_from_path` resolves a store path to the moniker of the type
//!   declared there, which names actions.

mod any_object;
mod basic;
mod collection;
mod constant;
mod date;
mod error_type;
mod model;
mod object;
mod reference;
mod regexp;
mod union;
mod validate;

pub(crate) use any_object::AnyObjectType;
pub(crate) use basic::{BasicKind, BasicType};
pub(crate) use collection::{collection_shape, collections_shape};
pub(crate) use constant::ConstantType;
pub(crate) use date::DateType;
pub(crate) use error_type::ErrorType;
pub(crate) use model::model_shape;
pub(crate) use object::{Form, ObjectType};
pub(crate) use reference::ReferenceType;
pub(crate) use regexp::RegExpType;
pub(crate) use union::UnionType;
pub(crate) use validate::{CoerceType, ValidateType};

use crate::hydrate::Prototype;
use crate::options::TypeOptions;
use crate::{Data, Instance, ModelError, ModelResult, Path, Seg, StorageKind, Store, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a descriptor inside its [`TypeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

/// The logical kind of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Object,
    Array,
    Tuple,
    Union,
    Reference,
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Date,
    RegExp,
    Error,
    Constant,
}

impl Kind {
    /// Lower-case kind name; also the stem of union discriminants.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::Tuple => "tuple",
            Kind::Union => "union",
            Kind::Reference => "reference",
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Boolean => "boolean",
            Kind::Null => "null",
            Kind::Undefined => "undefined",
            Kind::Date => "date",
            Kind::RegExp => "regexp",
            Kind::Error => "error",
            Kind::Constant => "constant",
        }
    }

    /// Whether instances of this kind are array-like.
    #[inline]
    pub fn is_array_like(self) -> bool {
        matches!(self, Kind::Array | Kind::Tuple)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model name, e.g. `Todo`.
    pub name: String,
    /// Property holding the model's id.
    pub id_key: String,
}

/// Collection metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionInfo {
    /// The element model type.
    pub model: TypeId,
    /// The element model's name.
    pub model_name: String,
}

/// Metadata of a set of collections.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CollectionsInfo {
    /// Model name to collection key.
    pub by_model: BTreeMap<String, String>,
}

/// What a descriptor means beyond its kind.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Plain,
    /// A string id marking a model's identity.
    ObjectId,
    Model(ModelInfo),
    Collection(CollectionInfo),
    Collections(CollectionsInfo),
}

/// A compiled type.
pub struct TypeDescriptor {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) kind: Kind,
    pub(crate) storage_kinds: Vec<StorageKind>,
    pub(crate) moniker: Path,
    pub(crate) parent: Option<TypeId>,
    pub(crate) role: Role,
    pub(crate) handler: Box<dyn TypeHandler>,
}

impl TypeDescriptor {
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Display name, e.g. `union(number, string)` or `Todo`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Storage kinds this type may occupy.
    #[inline]
    pub fn storage_kinds(&self) -> &[StorageKind] {
        &self.storage_kinds
    }

    /// Where the type was declared in the schema.
    #[inline]
    pub fn moniker(&self) -> &Path {
        &self.moniker
    }

    /// The enclosing type, if any.
    #[inline]
    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    #[inline]
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Model metadata, when this descriptor is a model.
    pub fn model_info(&self) -> Option<&ModelInfo> {
        match &self.role {
            Role::Model(info) => Some(info),
            _ => None,
        }
    }

    /// Declared property types, for object-like types.
    pub fn properties(&self) -> Option<&BTreeMap<String, TypeId>> {
        self.handler.properties()
    }

    /// The `*` type, for object-like types.
    pub fn rest_type(&self) -> Option<TypeId> {
        self.handler.rest_type()
    }

    /// Union members with their discriminants.
    pub fn union_members(&self) -> Option<&[(String, TypeId)]> {
        self.handler.union().map(|u| u.members())
    }

    pub(crate) fn prototype(&self) -> Option<&Prototype> {
        self.handler.prototype()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("storage_kinds", &self.storage_kinds)
            .field("moniker", &self.moniker)
            .field("role", &self.role)
            .finish()
    }
}

/// Context passed to every handler call.
#[derive(Clone, Copy)]
pub(crate) struct TypeCx<'a> {
    pub arena: &'a TypeArena,
    pub desc: &'a TypeDescriptor,
}

impl<'a> TypeCx<'a> {
    #[inline]
    pub fn moniker(&self) -> &'a Path {
        &self.desc.moniker
    }
}

/// Where an unpacked value is bound.
pub(crate) struct UnpackRequest<'a> {
    pub store: &'a Store,
    pub store_path: Path,
    pub instance_path: Path,
    pub current: Option<&'a Instance>,
    pub owner: Option<&'a Instance>,
}

/// Behaviour of one compiled type.
pub(crate) trait TypeHandler: Send + Sync {
    /// Check stored data; `Some` carries the message.
    fn validate_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String>;

    /// Repair stored data. Never fails.
    fn coerce_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Data {
        if self.validate_data(cx, value, path).is_none() {
            value.clone()
        } else {
            self.default_value(cx)
        }
    }

    /// Check an external value before it is written; `Some` carries the message.
    fn validate_assign(&self, cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String>;

    /// Translate an external value into stored data.
    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data>;

    /// Translate stored data at a location into an external value.
    fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value>;

    /// Initial stored data.
    fn default_value(&self, cx: TypeCx<'_>) -> Data;

    /// Moniker of the type declared at `path` below this one.
    fn type_from_path(&self, cx: TypeCx<'_>, path: &[Seg]) -> ModelResult<Path> {
        if path.is_empty() {
            Ok(cx.moniker().clone())
        } else {
            Err(ModelError::invalid_operation(format!(
                "Cannot get type path for properties of {}s",
                cx.desc.kind
            )))
        }
    }

    fn prototype(&self) -> Option<&Prototype> {
        None
    }

    fn properties(&self) -> Option<&BTreeMap<String, TypeId>> {
        None
    }

    fn rest_type(&self) -> Option<TypeId> {
        None
    }

    fn prop_type(&self, _seg: &Seg) -> Option<TypeId> {
        None
    }

    fn union(&self) -> Option<&UnionType> {
        None
    }

    /// Fixed length, for tuples.
    fn tuple_len(&self) -> Option<usize> {
        None
    }

    /// Read a property of an instance of this type.
    fn get_prop(
        &self,
        cx: TypeCx<'_>,
        _store: &Store,
        _instance: &Instance,
        seg: Seg,
    ) -> ModelResult<Value> {
        Err(ModelError::invalid_operation(format!(
            "Cannot read property \"{}\" of a {}",
            seg.to_key(),
            cx.desc.kind
        )))
    }

    /// Write a property of an instance of this type.
    fn set_prop(
        &self,
        cx: TypeCx<'_>,
        _store: &Store,
        _instance: &Instance,
        seg: Seg,
        _value: Value,
    ) -> ModelResult<()> {
        Err(ModelError::invalid_operation(format!(
            "Cannot set property \"{}\" of a {}",
            seg.to_key(),
            cx.desc.kind
        )))
    }

    /// Pack a value for the property or element at `seg`.
    fn pack_prop(&self, cx: TypeCx<'_>, seg: &Seg, _value: &Value) -> ModelResult<Data> {
        Err(ModelError::invalid_operation(format!(
            "Cannot pack property \"{}\" of a {}",
            seg.to_key(),
            cx.desc.kind
        )))
    }

    /// Default data for a new element at `seg`.
    fn default_prop(&self, _cx: TypeCx<'_>, _seg: &Seg) -> Data {
        Data::Undefined
    }
}

/// Stand-in handler for a descriptor whose definition is still being parsed.
pub(crate) struct Reserved;

impl TypeHandler for Reserved {
    fn validate_data(&self, _cx: TypeCx<'_>, _value: &Data, path: &Path) -> Option<String> {
        Some(format!("Type of \"{}\" is not compiled yet", path))
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, _value: &Value, path: &Path) -> Option<String> {
        Some(format!("Type of \"{}\" is not compiled yet", path))
    }

    fn pack(&self, cx: TypeCx<'_>, _value: &Value) -> ModelResult<Data> {
        Err(ModelError::schema(format!("Type \"{}\" is not compiled yet", cx.moniker())))
    }

    fn unpack(&self, cx: TypeCx<'_>, _req: UnpackRequest<'_>) -> ModelResult<Value> {
        Err(ModelError::schema(format!("Type \"{}\" is not compiled yet", cx.moniker())))
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        Data::Undefined
    }
}

/// Flat table of compiled types.
pub struct TypeArena {
    types: Vec<TypeDescriptor>,
    options: TypeOptions,
}

impl TypeArena {
    pub(crate) fn new(options: TypeOptions) -> Self {
        Self {
            types: Vec::new(),
            options,
        }
    }

    /// Options the schema was compiled with.
    #[inline]
    pub fn options(&self) -> TypeOptions {
        self.options
    }

    /// Number of descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up a descriptor. Ids are only ever issued by this arena.
    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.0]
    }

    /// Iterate over all descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    #[inline]
    pub(crate) fn cx(&self, id: TypeId) -> TypeCx<'_> {
        TypeCx {
            arena: self,
            desc: self.get(id),
        }
    }

    /// Reserve an id so children can name their parent before it exists.
    pub(crate) fn reserve(&mut self, moniker: Path, parent: Option<TypeId>) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeDescriptor {
            id,
            name: String::new(),
            kind: Kind::Undefined,
            storage_kinds: Vec::new(),
            moniker,
            parent,
            role: Role::Plain,
            handler: Box::new(Reserved),
        });
        id
    }

    /// Complete a reserved descriptor.
    pub(crate) fn fill(
        &mut self,
        id: TypeId,
        name: String,
        kind: Kind,
        storage_kinds: Vec<StorageKind>,
        role: Role,
        handler: Box<dyn TypeHandler>,
    ) {
        let desc = &mut self.types[id.0];
        desc.name = name;
        desc.kind = kind;
        desc.storage_kinds = storage_kinds;
        desc.role = role;
        desc.handler = handler;
    }

    pub(crate) fn rename(&mut self, id: TypeId, name: String) {
        self.types[id.0].name = name;
    }

    /// Check stored data against a type, reporting paths from its moniker.
    pub fn validate_data(&self, id: TypeId, value: &Data) -> Option<String> {
        self.validate_data_at(id, value, self.get(id).moniker())
    }

    pub fn validate_data_at(&self, id: TypeId, value: &Data, path: &Path) -> Option<String> {
        self.get(id).handler.validate_data(self.cx(id), value, path)
    }

    /// Repair stored data so that it validates.
    pub fn coerce_data(&self, id: TypeId, value: &Data) -> Data {
        self.coerce_data_at(id, value, self.get(id).moniker())
    }

    pub fn coerce_data_at(&self, id: TypeId, value: &Data, path: &Path) -> Data {
        self.get(id).handler.coerce_data(self.cx(id), value, path)
    }

    /// Check an external value against a type.
    pub fn validate_assign(&self, id: TypeId, value: &Value) -> Option<String> {
        self.validate_assign_at(id, value, self.get(id).moniker())
    }

    pub fn validate_assign_at(&self, id: TypeId, value: &Value, path: &Path) -> Option<String> {
        self.get(id).handler.validate_assign(self.cx(id), value, path)
    }

    /// Pack a value, verifying it first when validation is enabled.
    pub fn pack(&self, id: TypeId, value: &Value) -> ModelResult<Data> {
        if self.options.validate {
            if let Some(message) = self.validate_assign(id, value) {
                return Err(ModelError::validation(message));
            }
        }
        self.pack_unverified(id, value)
    }

    /// Pack without verification.
    pub fn pack_unverified(&self, id: TypeId, value: &Value) -> ModelResult<Data> {
        self.get(id).handler.pack(self.cx(id), value)
    }

    pub(crate) fn unpack(&self, id: TypeId, req: UnpackRequest<'_>) -> ModelResult<Value> {
        self.get(id).handler.unpack(self.cx(id), req)
    }

    /// Initial data for a type.
    pub fn default_value(&self, id: TypeId) -> Data {
        self.get(id).handler.default_value(self.cx(id))
    }

    /// Moniker of the type declared at `path` below `id`.
    pub fn get_type_from_path(&self, id: TypeId, path: &[Seg]) -> ModelResult<Path> {
        self.get(id).handler.type_from_path(self.cx(id), path)
    }

    /// The type of the member at `seg`, for object-like types.
    pub fn prop_type(&self, id: TypeId, seg: &Seg) -> Option<TypeId> {
        self.get(id).handler.prop_type(seg)
    }

    pub(crate) fn pack_prop(&self, id: TypeId, seg: &Seg, value: &Value) -> ModelResult<Data> {
        self.get(id).handler.pack_prop(self.cx(id), seg, value)
    }

    pub(crate) fn default_prop(&self, id: TypeId, seg: &Seg) -> Data {
        self.get(id).handler.default_prop(self.cx(id), seg)
    }
}

impl fmt::Debug for TypeArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.iter()).finish()
    }
}

/// A compiled schema: the arena plus its root type.
#[derive(Debug)]
pub struct CompiledSchema {
    pub(crate) arena: TypeArena,
    pub(crate) root: TypeId,
}

impl CompiledSchema {
    #[inline]
    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    #[inline]
    pub fn root(&self) -> TypeId {
        self.root
    }

    #[inline]
    pub fn root_descriptor(&self) -> &TypeDescriptor {
        self.arena.get(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant, list, optional, path, shape, union, Schema, TypeOptions};
    use serde_json::json;

    fn compile(schema: impl Into<Schema>) -> CompiledSchema {
        schema.into().compile(TypeOptions::default()).unwrap()
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    #[test]
    fn test_basic_checks_storage_and_assign() {
        let compiled = compile(Schema::Number);
        let (arena, root) = (compiled.arena(), compiled.root());

        assert!(arena.validate_data(root, &Data::from(1.0)).is_none());
        assert!(arena.validate_data(root, &Data::from("1")).is_some());
        assert!(arena.validate_assign(root, &Value::from("1")).is_some());
        assert_eq!(arena.coerce_data(root, &Data::from("1")), Data::from(0.0));
    }

    #[test]
    fn test_date_coerces_to_canonical_string() {
        let compiled = compile(Schema::Date);
        let (arena, root) = (compiled.arena(), compiled.root());

        assert_eq!(
            arena.coerce_data(root, &Data::from(0.0)),
            Data::from("1970-01-01T00:00:00.000Z")
        );
        assert!(arena.validate_data(root, &Data::from("1970-01-01T00:00:00Z")).is_some());
        assert_eq!(arena.default_value(root), Data::from(""));
    }

    #[test]
    fn test_constant_repairs_to_itself() {
        let compiled = compile(constant(5));
        let (arena, root) = (compiled.arena(), compiled.root());

        assert_eq!(arena.coerce_data(root, &Data::from("x")), Data::from(5.0));
        let message = arena.validate_assign(root, &Value::from(6)).unwrap();
        assert!(message.contains("must be \"5\""));
    }

    // ========================================================================
    // Composites
    // ========================================================================

    #[test]
    fn test_object_coerce_fills_each_property() {
        let compiled = compile(json!({"a": "Number", "b": "String"}));
        let (arena, root) = (compiled.arena(), compiled.root());

        let fixed = arena.coerce_data(root, &Data::from(json!({"a": "x", "c": 1})));
        assert_eq!(fixed.to_json(), json!({"a": 0, "b": ""}));
    }

    #[test]
    fn test_union_data_checks() {
        let simple = compile(union(vec![Schema::Number, Schema::String]));
        assert!(simple.arena().validate_data(simple.root(), &Data::from("x")).is_none());
        assert!(simple.arena().validate_data(simple.root(), &Data::from(true)).is_some());

        let complex = compile(union(vec![
            shape().prop("a", Schema::Number).into(),
            shape().prop("b", Schema::String).into(),
        ]));
        let message = complex
            .arena()
            .validate_data(complex.root(), &Data::from(json!({"object3": {}})))
            .unwrap();
        assert!(message.contains("Unexpected type \"object3\""));
        assert!(complex.arena().validate_data(complex.root(), &Data::empty_object()).is_some());
    }

    #[test]
    fn test_optional_complex_union_defaults_to_absent() {
        let compiled = compile(optional(union(vec![
            shape().prop("a", Schema::Number).into(),
            shape().prop("b", Schema::String).into(),
        ])));
        let (arena, root) = (compiled.arena(), compiled.root());

        let default = arena.default_value(root);
        assert_eq!(default, Data::empty_object());
        assert!(arena.validate_data(root, &default).is_none());
        assert!(arena
            .validate_data(root, &Data::from(json!({"object2": {"b": "x"}})))
            .is_none());
    }

    #[test]
    fn test_type_from_path_collapses_indices() {
        let compiled = compile(shape().prop("items", list(Schema::Number)));
        let moniker = compiled
            .arena()
            .get_type_from_path(compiled.root(), &[Seg::key("items"), Seg::Index(3)])
            .unwrap();
        assert_eq!(moniker, path!("items", "*"));
    }
}
