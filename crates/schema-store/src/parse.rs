//! Schema compilation.
//!
//! [`Schema::compile`] walks a schema once and fills a [`TypeArena`]. Every
//! type is registered under its *moniker*, the path where it was declared:
//! object properties under their name, list items and rest types under `*`,
//! tuple members under their index, union members under their discriminant.
//! Models are the exception; a collection's model is declared next to the
//! collection, under the model's name, so that `Todo` methods dispatch
//! `TODO_*` actions wherever the collection lives.

use crate::array::{array_methods, array_virtuals};
use crate::hydrate::Prototype;
use crate::schema::{resolve_literal, ShapeEntry};
use crate::types::{
    collection_shape, collections_shape, model_shape, AnyObjectType, BasicKind, BasicType,
    CoerceType, CollectionInfo, CollectionsInfo, CompiledSchema, ConstantType, DateType, ErrorType,
    Form, Kind, ModelInfo, ObjectType, ReferenceType, RegExpType, Role, TypeArena, TypeHandler,
    TypeId, UnionType, ValidateType,
};
use crate::{
    Data, ModelDef, ModelError, ModelResult, Path, Schema, Shape, StorageKind, TypeOptions,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The outside of a compiled type, used to lay out unions.
struct Summary {
    name: String,
    kind: Kind,
    storage_kinds: Vec<StorageKind>,
}

struct TypeParser {
    arena: TypeArena,
}

impl TypeParser {
    fn new(options: TypeOptions) -> Self {
        Self {
            arena: TypeArena::new(options),
        }
    }

    fn parse(&mut self, schema: &Schema, moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        match schema {
            Schema::Literal(literal) => {
                let resolved = resolve_literal(literal)?;
                self.parse(&resolved, moniker, parent)
            }
            Schema::String => Ok(self.basic(BasicKind::String, moniker, parent)),
            Schema::Number => Ok(self.basic(BasicKind::Number, moniker, parent)),
            Schema::Boolean => Ok(self.basic(BasicKind::Boolean, moniker, parent)),
            Schema::Null => Ok(self.basic(BasicKind::Null, moniker, parent)),
            Schema::Undefined => Ok(self.basic(BasicKind::Undefined, moniker, parent)),
            Schema::ObjectId => {
                let id = self.arena.reserve(moniker, parent);
                self.arena.fill(
                    id,
                    "objectid".to_string(),
                    Kind::String,
                    vec![StorageKind::String],
                    Role::ObjectId,
                    Box::new(BasicType::new(BasicKind::String)),
                );
                Ok(id)
            }
            Schema::Date => Ok(self.leaf(
                moniker,
                parent,
                Kind::Date,
                StorageKind::String,
                Box::new(DateType),
            )),
            Schema::RegExp => Ok(self.leaf(
                moniker,
                parent,
                Kind::RegExp,
                StorageKind::Object,
                Box::new(RegExpType),
            )),
            Schema::Error => Ok(self.leaf(
                moniker,
                parent,
                Kind::Error,
                StorageKind::Object,
                Box::new(ErrorType),
            )),
            Schema::Constant(value) => self.constant(value, moniker, parent),
            Schema::Reference(target) => {
                let id = self.leaf(
                    moniker,
                    parent,
                    Kind::Reference,
                    StorageKind::String,
                    Box::new(ReferenceType::new(target.as_str())),
                );
                self.arena.rename(id, format!("reference({})", target));
                Ok(id)
            }
            Schema::Object => Ok(self.any_object(false, moniker, parent)),
            Schema::Array => Ok(self.any_object(true, moniker, parent)),
            Schema::Shape(shape) => {
                let id = self.arena.reserve(moniker.clone(), parent);
                let handler = self.object(id, &moniker, shape, None, None)?;
                self.arena.fill(
                    id,
                    "object".to_string(),
                    Kind::Object,
                    vec![StorageKind::Object],
                    Role::Plain,
                    handler,
                );
                Ok(id)
            }
            Schema::List(item) => self.list(item, moniker, parent),
            Schema::Tuple(items) => self.tuple(items, moniker, parent),
            Schema::Union(members) => self.union(members, moniker, parent, None),
            Schema::Optional(inner) => self.optional(inner, moniker, parent),
            Schema::Validate(base, validator) => self.wrapper(base, moniker, parent, |base| {
                Box::new(ValidateType::new(base, validator.clone()))
            }),
            Schema::Coerce(base, coercion) => self.wrapper(base, moniker, parent, |base| {
                Box::new(CoerceType::new(base, coercion.clone()))
            }),
            Schema::Spec {
                ty,
                validate,
                optional,
            } => {
                let mut expanded = ty.as_ref().clone();
                if let Some(validator) = validate {
                    expanded = Schema::Validate(Box::new(expanded), validator.clone());
                }
                if *optional {
                    expanded = Schema::Optional(Box::new(expanded));
                }
                self.parse(&expanded, moniker, parent)
            }
            Schema::Model(def) => self.model(def, moniker, parent),
            Schema::Collection(def) => self.collection(def, moniker, parent),
            Schema::Collections(defs) => self.collections(defs, moniker, parent),
        }
    }

    fn leaf(
        &mut self,
        moniker: Path,
        parent: Option<TypeId>,
        kind: Kind,
        storage: StorageKind,
        handler: Box<dyn TypeHandler>,
    ) -> TypeId {
        let id = self.arena.reserve(moniker, parent);
        self.arena
            .fill(id, kind.as_str().to_string(), kind, vec![storage], Role::Plain, handler);
        id
    }

    fn basic(&mut self, kind: BasicKind, moniker: Path, parent: Option<TypeId>) -> TypeId {
        self.leaf(
            moniker,
            parent,
            kind.kind(),
            kind.storage_kind(),
            Box::new(BasicType::new(kind)),
        )
    }

    fn constant(
        &mut self,
        value: &serde_json::Value,
        moniker: Path,
        parent: Option<TypeId>,
    ) -> ModelResult<TypeId> {
        let base = BasicKind::of_json(value).ok_or_else(|| {
            ModelError::schema(format!(
                "Constant {} must be a number, string or boolean",
                value
            ))
        })?;
        let id = self.leaf(
            moniker,
            parent,
            Kind::Constant,
            base.storage_kind(),
            Box::new(ConstantType::new(Data::from(value), base)),
        );
        self.arena.rename(id, format!("constant({})", value));
        Ok(id)
    }

    /// `Object` and `Array`: a type plus a pair of child types under `*` that
    /// stand for every nested object and array.
    fn any_object(&mut self, array: bool, moniker: Path, parent: Option<TypeId>) -> TypeId {
        let id = self.arena.reserve(moniker.clone(), parent);
        let child_moniker = moniker.with_segment("*");
        let object_child = self.arena.reserve(child_moniker.clone(), Some(id));
        let array_child = self.arena.reserve(child_moniker, Some(id));
        for (target, is_array) in [(object_child, false), (array_child, true), (id, array)] {
            let target_moniker = self.arena.get(target).moniker().clone();
            let prototype = if is_array {
                Prototype::new(&target_moniker, Vec::new(), array_methods(), array_virtuals())
            } else {
                Prototype::new(&target_moniker, Vec::new(), Vec::new(), Vec::new())
            };
            let (kind, storage) = if is_array {
                (Kind::Array, StorageKind::Array)
            } else {
                (Kind::Object, StorageKind::Object)
            };
            self.arena.fill(
                target,
                kind.as_str().to_string(),
                kind,
                vec![storage],
                Role::Plain,
                Box::new(AnyObjectType::new(is_array, object_child, array_child, prototype)),
            );
        }
        id
    }

    /// The handler of a shaped object. `rest` is used when the shape itself
    /// declares no `*` entry.
    fn object(
        &mut self,
        id: TypeId,
        moniker: &Path,
        shape: &Shape,
        rest: Option<TypeId>,
        model_id_key: Option<String>,
    ) -> ModelResult<Box<dyn TypeHandler>> {
        let mut properties = BTreeMap::new();
        let mut rest = rest;
        let mut names = Vec::new();
        let mut methods = Vec::new();
        let mut virtuals = Vec::new();
        for (name, entry) in &shape.entries {
            match entry {
                ShapeEntry::Prop(schema) if name == "*" => {
                    rest = Some(self.parse(schema, moniker.with_segment("*"), Some(id))?);
                }
                ShapeEntry::Prop(schema) => {
                    let child = self.parse(schema, moniker.with_segment(name.as_str()), Some(id))?;
                    properties.insert(name.clone(), child);
                    names.push(name.clone());
                }
                ShapeEntry::Method(method) => methods.push(method.clone()),
                ShapeEntry::Virtual(descriptor) => virtuals.push((name.clone(), descriptor.clone())),
            }
        }
        let prototype = Prototype::new(moniker, names, methods, virtuals);
        Ok(Box::new(ObjectType::new(
            Form::Object,
            properties,
            rest,
            prototype,
            model_id_key,
        )))
    }

    fn list(&mut self, item: &Schema, moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        let id = self.arena.reserve(moniker.clone(), parent);
        let item = self.parse(item, moniker.with_segment("*"), Some(id))?;
        let prototype = Prototype::new(&moniker, Vec::new(), array_methods(), array_virtuals());
        self.arena.fill(
            id,
            "array".to_string(),
            Kind::Array,
            vec![StorageKind::Array],
            Role::Plain,
            Box::new(ObjectType::new(
                Form::Array,
                BTreeMap::new(),
                Some(item),
                prototype,
                None,
            )),
        );
        Ok(id)
    }

    fn tuple(&mut self, items: &[Schema], moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        if items.len() < 2 {
            return Err(ModelError::schema(format!(
                "Tuple \"{}\" needs at least two members",
                moniker
            )));
        }
        let id = self.arena.reserve(moniker.clone(), parent);
        let mut properties = BTreeMap::new();
        for (index, item) in items.iter().enumerate() {
            let member = self.parse(item, moniker.with_segment(index), Some(id))?;
            properties.insert(index.to_string(), member);
        }
        let prototype = Prototype::new(&moniker, Vec::new(), array_methods(), array_virtuals());
        self.arena.fill(
            id,
            "tuple".to_string(),
            Kind::Tuple,
            vec![StorageKind::Array],
            Role::Plain,
            Box::new(ObjectType::new(
                Form::Tuple(items.len()),
                properties,
                None,
                prototype,
                None,
            )),
        );
        Ok(id)
    }

    /// Compile `schema` on its own to learn its kind and storage.
    fn summarize(&self, schema: &Schema, moniker: &Path) -> ModelResult<Summary> {
        let mut scratch = TypeParser::new(self.arena.options());
        let id = scratch.parse(schema, moniker.clone(), None)?;
        let desc = scratch.arena.get(id);
        Ok(Summary {
            name: desc.name().to_string(),
            kind: desc.kind(),
            storage_kinds: desc.storage_kinds().to_vec(),
        })
    }

    fn union(
        &mut self,
        members: &[Schema],
        moniker: Path,
        parent: Option<TypeId>,
        name: Option<String>,
    ) -> ModelResult<TypeId> {
        let mut flat = Vec::new();
        for member in members {
            flatten(member, &mut flat)?;
        }
        let mut seen_undefined = false;
        flat.retain(|member| {
            if !matches!(member, Schema::Undefined) {
                return true;
            }
            !std::mem::replace(&mut seen_undefined, true)
        });
        match flat.as_slice() {
            [] => {
                return Err(ModelError::schema(format!(
                    "Union \"{}\" needs at least one member",
                    moniker
                )))
            }
            [single] => return self.parse(single, moniker, parent),
            _ => {}
        }

        let summaries = flat
            .iter()
            .map(|member| self.summarize(member, &moniker))
            .collect::<ModelResult<Vec<_>>>()?;
        let mut ordinals: HashMap<Kind, usize> = HashMap::new();
        let mut storage = BTreeSet::new();
        let mut simple = true;
        for summary in &summaries {
            for kind in &summary.storage_kinds {
                simple &= storage.insert(*kind);
            }
        }

        let id = self.arena.reserve(moniker.clone(), parent);
        let mut compiled = Vec::with_capacity(flat.len());
        for (member, summary) in flat.iter().zip(&summaries) {
            let ordinal = ordinals.entry(summary.kind).or_default();
            *ordinal += 1;
            let key = format!("{}{}", summary.kind.as_str(), ordinal);
            let member_id = self.parse(member, moniker.with_segment(key.as_str()), Some(id))?;
            compiled.push((key, member_id));
        }
        let name = name.unwrap_or_else(|| {
            let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
            format!("union({})", names.join(", "))
        });
        let storage_kinds = if simple {
            storage.into_iter().collect()
        } else {
            vec![StorageKind::Object]
        };
        self.arena.fill(
            id,
            name,
            Kind::Union,
            storage_kinds,
            Role::Plain,
            Box::new(UnionType::new(compiled, simple)),
        );
        Ok(id)
    }

    /// `T` when `T` can already store undefined, otherwise `T | undefined`.
    fn optional(&mut self, inner: &Schema, moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        let summary = self.summarize(inner, &moniker)?;
        if summary.storage_kinds.contains(&StorageKind::Undefined) {
            return self.parse(inner, moniker, parent);
        }
        self.union(
            &[Schema::Undefined, inner.clone()],
            moniker,
            parent,
            Some(format!("optional({})", summary.name)),
        )
    }

    /// A type that wraps `base` and looks like it from outside.
    fn wrapper(
        &mut self,
        base: &Schema,
        moniker: Path,
        parent: Option<TypeId>,
        handler: impl FnOnce(TypeId) -> Box<dyn TypeHandler>,
    ) -> ModelResult<TypeId> {
        let id = self.arena.reserve(moniker.clone(), parent);
        let base = self.parse(base, moniker, Some(id))?;
        let desc = self.arena.get(base);
        let (name, kind, storage_kinds, role) = (
            desc.name().to_string(),
            desc.kind(),
            desc.storage_kinds().to_vec(),
            desc.role().clone(),
        );
        self.arena
            .fill(id, name, kind, storage_kinds, role, handler(base));
        Ok(id)
    }

    fn model(&mut self, def: &ModelDef, moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        let (shape, id_key) = model_shape(def)?;
        let id = self.arena.reserve(moniker.clone(), parent);
        let handler = self.object(id, &moniker, &shape, None, Some(id_key.clone()))?;
        self.arena.fill(
            id,
            def.name().to_string(),
            Kind::Object,
            vec![StorageKind::Object],
            Role::Model(ModelInfo {
                name: def.name().to_string(),
                id_key,
            }),
            handler,
        );
        Ok(id)
    }

    fn collection(&mut self, def: &ModelDef, moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        let id = self.arena.reserve(moniker.clone(), parent);
        let model_moniker = moniker.parent().unwrap_or_default().key(def.name());
        let model = self.model(def, model_moniker, Some(id))?;
        let handler = self.object(id, &moniker, &collection_shape(def), Some(model), None)?;
        self.arena.fill(
            id,
            format!("collection({})", def.name()),
            Kind::Object,
            vec![StorageKind::Object],
            Role::Collection(CollectionInfo {
                model,
                model_name: def.name().to_string(),
            }),
            handler,
        );
        Ok(id)
    }

    fn collections(&mut self, defs: &[ModelDef], moniker: Path, parent: Option<TypeId>) -> ModelResult<TypeId> {
        let mut keys = BTreeSet::new();
        for def in defs {
            if !keys.insert(def.collection_key()) {
                return Err(ModelError::schema(format!(
                    "Model \"{}\" is declared more than once",
                    def.name()
                )));
            }
        }
        let (shape, by_model) = collections_shape(defs);
        let id = self.arena.reserve(moniker.clone(), parent);
        let handler = self.object(id, &moniker, &shape, None, None)?;
        let names: Vec<&str> = defs.iter().map(ModelDef::name).collect();
        self.arena.fill(
            id,
            format!("collections({})", names.join(", ")),
            Kind::Object,
            vec![StorageKind::Object],
            Role::Collections(CollectionsInfo { by_model }),
            handler,
        );
        Ok(id)
    }
}

/// Spread nested unions and optionals into one member list.
fn flatten(schema: &Schema, out: &mut Vec<Schema>) -> ModelResult<()> {
    match schema {
        Schema::Union(members) => {
            for member in members {
                flatten(member, out)?;
            }
        }
        Schema::Optional(inner) => {
            out.push(Schema::Undefined);
            flatten(inner, out)?;
        }
        Schema::Spec {
            ty,
            validate,
            optional: true,
        } => {
            out.push(Schema::Undefined);
            flatten(
                &Schema::Spec {
                    ty: ty.clone(),
                    validate: validate.clone(),
                    optional: false,
                },
                out,
            )?;
        }
        Schema::Literal(literal) => {
            let resolved = resolve_literal(literal)?;
            match resolved {
                Schema::Union(_) | Schema::Optional(_) | Schema::Spec { optional: true, .. } => {
                    flatten(&resolved, out)?
                }
                other => out.push(other),
            }
        }
        other => out.push(other.clone()),
    }
    Ok(())
}

impl Schema {
    /// Compile into a type arena.
    pub fn compile(&self, options: TypeOptions) -> ModelResult<CompiledSchema> {
        let mut parser = TypeParser::new(options);
        let root = parser.parse(self, Path::root(), None)?;
        Ok(CompiledSchema {
            arena: parser.arena,
            root,
        })
    }

    /// Resolve JSON shorthand eagerly, reporting unknown names right away.
    pub fn literal(literal: serde_json::Value) -> ModelResult<Schema> {
        resolve_literal(&literal)
    }
}
