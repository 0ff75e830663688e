//! Live objects bound to a location in a store.
//!
//! An [`Instance`] is a typed view of the data at one store path. It never
//! holds data itself: every read goes through the store, and every write is
//! dispatched as an action. Instances know three things about where they are:
//!
//! - the *store path*, where their data lives;
//! - the *instance path*, how the object graph reached them (a reference
//!   resolved through a collection has an instance path under the referring
//!   object, but a store path under the collection);
//! - their *owner*, the instance they were read from.

use crate::naming::{method_action_type, type_snake, virtual_action_type};
use crate::store::StoreInner;
use crate::types::{Kind, TypeDescriptor, TypeId, UnpackRequest};
use crate::{
    CompiledSchema, Data, MethodDescriptor, ModelError, ModelResult, Path, Seg, Store, Value,
    VirtualDescriptor,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Clone, Debug)]
pub(crate) struct BoundMethod {
    pub descriptor: MethodDescriptor,
    pub action_type: String,
}

#[derive(Clone, Debug)]
pub(crate) struct BoundVirtual {
    pub descriptor: VirtualDescriptor,
    pub action_type: String,
}

/// Members shared by every instance of one object type, with their action
/// types resolved at compile time.
#[derive(Debug, Default)]
pub struct Prototype {
    type_snake: String,
    properties: Vec<String>,
    methods: BTreeMap<String, BoundMethod>,
    virtuals: BTreeMap<String, BoundVirtual>,
}

impl Prototype {
    pub(crate) fn new(
        moniker: &Path,
        properties: Vec<String>,
        methods: Vec<MethodDescriptor>,
        virtuals: Vec<(String, VirtualDescriptor)>,
    ) -> Self {
        let snake = type_snake(moniker);
        let methods = methods
            .into_iter()
            .map(|descriptor| {
                let action_type = method_action_type(&snake, &descriptor.name);
                (
                    descriptor.name.clone(),
                    BoundMethod {
                        descriptor,
                        action_type,
                    },
                )
            })
            .collect();
        let virtuals = virtuals
            .into_iter()
            .map(|(name, descriptor)| {
                let action_type = virtual_action_type(&snake, &name);
                (
                    name,
                    BoundVirtual {
                        descriptor,
                        action_type,
                    },
                )
            })
            .collect();
        Self {
            type_snake: snake,
            properties,
            methods,
            virtuals,
        }
    }

    /// The snake-cased type name that prefixes this type's action types.
    pub fn type_snake(&self) -> &str {
        &self.type_snake
    }

    /// Declared property names.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Declared method names.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Action type dispatched by a method, if it exists.
    pub fn method_action_type(&self, name: &str) -> Option<&str> {
        self.methods.get(name).map(|m| m.action_type.as_str())
    }

    pub(crate) fn method(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.get(name)
    }

    pub(crate) fn virtual_prop(&self, name: &str) -> Option<&BoundVirtual> {
        self.virtuals.get(name)
    }
}

#[derive(Clone)]
struct Location {
    store_path: Path,
    instance_path: Path,
    owner: Option<Instance>,
}

struct InstanceInner {
    store: Weak<StoreInner>,
    type_id: TypeId,
    location: RwLock<Location>,
    keys_memo: Mutex<Option<(Data, Arc<Vec<String>>)>>,
}

/// A live object bound to a store location.
///
/// Cloning is cheap and yields a handle to the same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    /// Bind an instance of `type_id` to the request's location, rebinding
    /// `req.current` in place when given.
    pub(crate) fn hydrate(req: &UnpackRequest<'_>, type_id: TypeId) -> Instance {
        let location = Location {
            store_path: req.store_path.clone(),
            instance_path: req.instance_path.clone(),
            owner: req.owner.cloned(),
        };
        if let Some(current) = req.current {
            *current.inner.location.write() = location;
            *current.inner.keys_memo.lock() = None;
            return current.clone();
        }
        Instance {
            inner: Arc::new(InstanceInner {
                store: req.store.downgrade(),
                type_id,
                location: RwLock::new(location),
                keys_memo: Mutex::new(None),
            }),
        }
    }

    /// The store this instance reads from.
    pub fn store(&self) -> ModelResult<Store> {
        self.inner
            .store
            .upgrade()
            .map(Store::from_inner)
            .ok_or(ModelError::StoreDropped)
    }

    fn context(&self) -> ModelResult<(Store, Arc<CompiledSchema>)> {
        let store = self.store()?;
        let schema = store.schema().clone();
        Ok((store, schema))
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    /// Where the data lives.
    pub fn store_path(&self) -> Path {
        self.inner.location.read().store_path.clone()
    }

    /// How the object graph reached this instance.
    pub fn instance_path(&self) -> Path {
        self.inner.location.read().instance_path.clone()
    }

    /// The instance this one was read from.
    pub fn owner(&self) -> Option<Instance> {
        self.inner.location.read().owner.clone()
    }

    /// Whether both handles refer to the same instance.
    #[inline]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with this instance's descriptor.
    pub fn type_descriptor<R>(&self, f: impl FnOnce(&TypeDescriptor) -> R) -> ModelResult<R> {
        let (_, schema) = self.context()?;
        Ok(f(schema.arena().get(self.type_id())))
    }

    pub fn kind(&self) -> ModelResult<Kind> {
        self.type_descriptor(TypeDescriptor::kind)
    }

    /// The descriptor's display name, e.g. `Todo`.
    pub fn type_name(&self) -> ModelResult<String> {
        self.type_descriptor(|desc| desc.name().to_string())
    }

    /// The stored data.
    pub fn state(&self) -> ModelResult<Data> {
        self.store()?.get(&self.store_path())
    }

    /// Replace the stored data.
    pub fn set_state(&self, data: Data) -> ModelResult<()> {
        self.store()?.put(&self.store_path(), data).map(|_| ())
    }

    /// Read a property, element or virtual property.
    pub fn get(&self, key: impl Into<Seg>) -> ModelResult<Value> {
        let seg = key.into();
        let (store, schema) = self.context()?;
        let arena = schema.arena();
        let desc = arena.get(self.type_id());
        let bound = seg
            .as_key()
            .and_then(|name| desc.prototype().and_then(|p| p.virtual_prop(name)));
        if let Some(bound) = bound {
            return match &bound.descriptor.get {
                Some(get) => get(self),
                None => Ok(Value::Undefined),
            };
        }
        desc.handler.get_prop(arena.cx(self.type_id()), &store, self, seg)
    }

    /// Read a property that must be an instance.
    pub fn child(&self, key: impl Into<Seg>) -> ModelResult<Instance> {
        self.get(key)?.into_instance()
    }

    /// Write a property, element or virtual property.
    pub fn set(&self, key: impl Into<Seg>, value: impl Into<Value>) -> ModelResult<()> {
        let seg = key.into();
        let value = value.into();
        let (store, schema) = self.context()?;
        let arena = schema.arena();
        let desc = arena.get(self.type_id());
        let bound = seg
            .as_key()
            .and_then(|name| desc.prototype().and_then(|p| p.virtual_prop(name)));
        if let Some(bound) = bound {
            let path = self.instance_path().with_segment(seg.clone());
            store.set_virtual(
                self,
                &bound.action_type,
                path,
                bound.descriptor.set.as_ref(),
                value,
            )?;
            return Ok(());
        }
        desc.handler
            .set_prop(arena.cx(self.type_id()), &store, self, seg, value)
    }

    /// Call a method.
    pub fn call(&self, name: &str, args: Vec<Value>) -> ModelResult<Value> {
        let (store, schema) = self.context()?;
        let desc = schema.arena().get(self.type_id());
        let bound = desc
            .prototype()
            .and_then(|p| p.method(name))
            .ok_or_else(|| {
                ModelError::invalid_operation(format!(
                    "\"{}\" is not a method of {}",
                    name,
                    desc.name()
                ))
            })?;
        if !bound.descriptor.dispatched {
            return store.apply_method(self, &bound.descriptor, &args);
        }
        store.invoke(
            self,
            &bound.action_type,
            self.instance_path().key(name),
            &bound.descriptor,
            args,
        )
    }

    /// Whether the type declares a method.
    pub fn has_method(&self, name: &str) -> bool {
        self.type_descriptor(|desc| desc.prototype().is_some_and(|p| p.method(name).is_some()))
            .unwrap_or(false)
    }

    /// Own keys of the stored data.
    ///
    /// Memoized until the stored data changes identity.
    pub fn keys(&self) -> ModelResult<Arc<Vec<String>>> {
        let store = self.store()?;
        let path = self.store_path();
        store.record_keys(&path);
        let state = store.peek(&path)?;
        let mut memo = self.inner.keys_memo.lock();
        if let Some((seen, keys)) = memo.as_ref() {
            if seen.same(&state) {
                return Ok(keys.clone());
            }
        }
        let keys = Arc::new(state.keys());
        *memo = Some((state, keys.clone()));
        Ok(keys)
    }

    /// Number of own keys; the length for arrays.
    pub fn len(&self) -> ModelResult<usize> {
        let store = self.store()?;
        let path = self.store_path();
        store.record_keys(&path);
        Ok(match store.peek(&path)? {
            Data::Array(items) => items.len(),
            Data::Object(map) => map.len(),
            _ => 0,
        })
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        self.len().map(|len| len == 0)
    }

    pub(crate) fn pack_prop(&self, seg: &Seg, value: &Value) -> ModelResult<Data> {
        let (_, schema) = self.context()?;
        schema.arena().pack_prop(self.type_id(), seg, value)
    }

    pub(crate) fn default_prop(&self, seg: &Seg) -> ModelResult<Data> {
        let (_, schema) = self.context()?;
        Ok(schema.arena().default_prop(self.type_id(), seg))
    }

    pub(crate) fn tuple_len(&self) -> ModelResult<Option<usize>> {
        self.type_descriptor(|desc| desc.handler.tuple_len())
    }

    /// Deep plain copy with nested instances expanded.
    ///
    /// An instance met again while it is being expanded is replaced by the
    /// string `[Circular ~<instance path>]`.
    pub fn to_object(&self) -> ModelResult<Value> {
        let mut visiting = Vec::new();
        self.to_object_inner(&mut visiting)
    }

    fn to_object_inner(&self, visiting: &mut Vec<Instance>) -> ModelResult<Value> {
        if visiting.iter().any(|seen| seen.ptr_eq(self)) {
            return Ok(Value::String(format!(
                "[Circular ~{}]",
                self.instance_path()
            )));
        }
        visiting.push(self.clone());
        let array = self.kind()?.is_array_like();
        let mut entries = Vec::new();
        for key in self.keys()?.iter() {
            let value = match self.get(key.as_str())? {
                Value::Instance(child) => child.to_object_inner(visiting)?,
                other => other,
            };
            entries.push((key.clone(), value));
        }
        visiting.pop();
        Ok(if array {
            Value::Array(entries.into_iter().map(|(_, v)| v).collect())
        } else {
            Value::Object(entries.into_iter().collect())
        })
    }

    /// Plain JSON copy.
    pub fn to_json(&self) -> ModelResult<serde_json::Value> {
        Ok(self.to_object()?.to_json())
    }

    /// Human-readable dump of the expanded object.
    pub fn inspect(&self) -> String {
        match self.to_json() {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|e| e.to_string()),
            Err(e) => format!("<{}>", e),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.inner.location.read();
        f.debug_struct("Instance")
            .field("type_id", &self.inner.type_id)
            .field("store_path", &location.store_path.to_string())
            .field("instance_path", &location.instance_path.to_string())
            .finish()
    }
}
