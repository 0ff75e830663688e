//! The store: a live object graph over dispatcher-held state.
//!
//! A [`Store`] owns a compiled schema, a connection to a [`Dispatcher`] and a
//! cache of hydrated instances. It never keeps the authoritative state. Reads
//! ask the dispatcher for its current state; writes become [`Action`]s that
//! the dispatcher feeds back through [`Store::reducer`].
//!
//! While an action is being reduced the store works on a private copy of the
//! state: reads see it, writes apply to it directly, and the result becomes
//! the next state when the action completes. Nested writes made by a method
//! body are therefore part of the same action and are not dispatched again.
//!
//! # Example
//!
//! ```ignore
//! let (store, dispatcher) = Store::with_local_dispatcher(
//!     json!({"count": "Number"}),
//!     StoreOptions::default(),
//! )?;
//! store.root()?.set("count", 1)?;
//! assert_eq!(dispatcher.history()[0].action_type, "SET_COUNT");
//! ```

use crate::dispatcher::{Dispatcher, LocalDispatcher, Reducer};
use crate::naming::set_action_type;
use crate::record::{ReadMode, RecordSnapshot, RecordStack};
use crate::types::{Kind, TypeId, UnpackRequest};
use crate::{
    set_at_path, Action, ActionValue, CompiledSchema, Data, Instance, MethodDescriptor, MethodImpl,
    MethodResult, ModelError, ModelResult, Path, PendingValue, Schema, SetterFn, StoreOptions,
    Value,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct CacheEntry {
    type_id: TypeId,
    store_path: Path,
    instance: Instance,
}

/// Hydrated instances keyed by instance path, evicted least recently used.
struct InstanceCache {
    entries: HashMap<String, (u64, CacheEntry)>,
    /// Uses in order. A use is stale once its key has been used again.
    order: VecDeque<(u64, String)>,
    tick: u64,
    capacity: usize,
}

impl InstanceCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            tick: 0,
            capacity,
        }
    }

    fn stamp(&mut self, key: &str) -> u64 {
        self.tick += 1;
        self.order.push_back((self.tick, key.to_string()));
        self.tick
    }

    /// Drop stale uses once they outnumber live entries.
    fn compact(&mut self) {
        if self.order.len() <= 2 * self.entries.len().max(16) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(tick, key)| entries.get(key).is_some_and(|(live, _)| live == tick));
    }

    fn get(&mut self, key: &str, type_id: TypeId, store_path: &Path) -> Option<Instance> {
        let (_, entry) = self.entries.get(key)?;
        if entry.type_id != type_id || entry.store_path != *store_path {
            return None;
        }
        let instance = entry.instance.clone();
        let tick = self.stamp(key);
        if let Some(slot) = self.entries.get_mut(key) {
            slot.0 = tick;
        }
        self.compact();
        Some(instance)
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        if self.capacity == 0 {
            return;
        }
        let tick = self.stamp(&key);
        self.entries.insert(key, (tick, entry));
        while self.entries.len() > self.capacity {
            let Some((tick, oldest)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&oldest).is_some_and(|(live, _)| *live == tick) {
                trace!(instance_path = %oldest, "instance evicted");
                self.entries.remove(&oldest);
            }
        }
        self.compact();
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

pub(crate) struct StoreInner {
    schema: Arc<CompiledSchema>,
    options: StoreOptions,
    dispatcher: RwLock<Option<Arc<dyn Dispatcher>>>,
    /// Working state while an action is being reduced.
    internal_state: Mutex<Option<Data>>,
    /// Return value of the last reduced action.
    result: Mutex<Option<Value>>,
    /// Action type the next invoked method must resolve to.
    verify_action: Mutex<Option<String>>,
    cache: Mutex<InstanceCache>,
    records: Mutex<RecordStack>,
}

/// Clears the working state when a reduction ends, including by unwinding.
struct ReduceGuard<'a>(&'a StoreInner);

impl Drop for ReduceGuard<'_> {
    fn drop(&mut self) {
        self.0.internal_state.lock().take();
        self.0.verify_action.lock().take();
    }
}

/// Closes a record frame, discarding its reads, unless disarmed.
struct RecordFrameGuard<'a> {
    inner: &'a StoreInner,
    open: bool,
}

impl Drop for RecordFrameGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            self.inner.records.lock().pop(true);
        }
    }
}

/// Resumes recording when dropped.
struct SuspendGuard<'a>(&'a StoreInner);

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.0.records.lock().resume();
    }
}

/// A schema-typed view over dispatcher-held state.
///
/// Cloning is cheap; clones share the cache and the dispatcher connection.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Compile `schema` and create a store without a dispatcher.
    ///
    /// Connect one with [`connect`](Self::connect) before reading or writing,
    /// or use [`with_local_dispatcher`](Self::with_local_dispatcher).
    pub fn new(schema: impl Into<Schema>, options: StoreOptions) -> ModelResult<Self> {
        let compiled = schema.into().compile(options.type_options())?;
        Ok(Self::from_compiled(Arc::new(compiled), options))
    }

    /// Create a store over an already compiled schema.
    pub fn from_compiled(schema: Arc<CompiledSchema>, options: StoreOptions) -> Self {
        let cache = InstanceCache::new(options.max_cache);
        Self {
            inner: Arc::new(StoreInner {
                schema,
                options,
                dispatcher: RwLock::new(None),
                internal_state: Mutex::new(None),
                result: Mutex::new(None),
                verify_action: Mutex::new(None),
                cache: Mutex::new(cache),
                records: Mutex::new(RecordStack::default()),
            }),
        }
    }

    /// Create a store connected to a fresh [`LocalDispatcher`] that starts
    /// from the schema's default state.
    pub fn with_local_dispatcher(
        schema: impl Into<Schema>,
        options: StoreOptions,
    ) -> ModelResult<(Self, Arc<LocalDispatcher>)> {
        let store = Self::new(schema, options)?;
        let dispatcher = Arc::new(LocalDispatcher::new(store.reducer())?);
        store.connect(dispatcher.clone());
        Ok((store, dispatcher))
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    /// Attach the dispatcher that holds this store's state.
    pub fn connect(&self, dispatcher: Arc<dyn Dispatcher>) {
        *self.inner.dispatcher.write() = Some(dispatcher);
        self.inner.cache.lock().clear();
    }

    /// The connected dispatcher.
    pub fn dispatcher(&self) -> ModelResult<Arc<dyn Dispatcher>> {
        self.inner
            .dispatcher
            .read()
            .clone()
            .ok_or(ModelError::NoDispatcher)
    }

    #[inline]
    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.inner.schema
    }

    #[inline]
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Whether both handles refer to the same store.
    #[inline]
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A fresh entity id from the configured source.
    pub fn generate_id(&self) -> String {
        self.inner.options.id_source.next_id()
    }

    // ========================================================================
    // Reduction
    // ========================================================================

    /// The reducer a dispatcher runs for this store.
    ///
    /// It holds the store weakly and fails with
    /// [`ModelError::StoreDropped`] once every handle is gone.
    pub fn reducer(&self) -> Reducer {
        let store = self.downgrade();
        Arc::new(move |state, action| {
            let inner = store.upgrade().ok_or(ModelError::StoreDropped)?;
            Store::from_inner(inner).reduce(state, action)
        })
    }

    /// Reduce one action. `None` starts from the default state; passthrough
    /// actions return the state untouched.
    pub fn reduce(&self, state: Option<Data>, action: &Action) -> ModelResult<Data> {
        let state = state.unwrap_or_else(|| self.default_state());
        if action.is_passthrough() {
            return Ok(state);
        }
        {
            let mut slot = self.inner.internal_state.lock();
            if slot.is_some() {
                return Err(ModelError::invalid_operation(format!(
                    "Cannot reduce \"{}\" while another action is being reduced",
                    action.action_type
                )));
            }
            *slot = Some(state);
        }
        let guard = ReduceGuard(&self.inner);
        let result = self.execute_action(action);
        let next = self.inner.internal_state.lock().clone();
        drop(guard);
        let value = result?;
        *self.inner.result.lock() = Some(value);
        next.ok_or_else(|| ModelError::invalid_operation("Reduction lost its working state"))
    }

    /// Whether an action is being reduced right now.
    #[inline]
    pub fn is_reducing(&self) -> bool {
        self.inner.internal_state.lock().is_some()
    }

    /// The schema's initial state.
    pub fn default_state(&self) -> Data {
        let schema = self.schema();
        schema.arena().default_value(schema.root())
    }

    /// Dispatch an action and return what the reduced method returned.
    ///
    /// While reducing, the action is executed in place instead.
    pub fn dispatch(&self, action: Action) -> ModelResult<Value> {
        if self.is_reducing() {
            return self.execute_action(&action);
        }
        if self.inner.options.debug {
            debug!(
                action_type = %action.action_type,
                path = %action.path,
                kind = action.kind(),
                "dispatching action"
            );
        }
        let dispatcher = self.dispatcher()?;
        self.inner.result.lock().take();
        dispatcher.dispatch(action)?;
        Ok(self.inner.result.lock().take().unwrap_or_default())
    }

    /// Apply an action to the working state.
    ///
    /// A write whose type is the `SET_` action of its path stores the packed
    /// data directly. Anything else is routed to the instance named by the
    /// action path minus its last segment: arguments call the method named by
    /// that segment, a value assigns the property.
    pub fn execute_action(&self, action: &Action) -> ModelResult<Value> {
        if let (Some(ActionValue::Packed(data)), None) = (&action.value, &action.args) {
            if self.set_action_type(&action.path).ok().as_deref() == Some(action.action_type.as_str())
            {
                self.write(&action.path, data.clone())?;
                return Ok(Value::Undefined);
            }
        }

        let mut path = action.path.clone();
        let name = path.pop().ok_or_else(|| {
            ModelError::invalid_operation(format!(
                "Action \"{}\" has an empty path",
                action.action_type
            ))
        })?;
        let key = name.to_key();
        let target = if action.args.is_some() && key == "constructor" {
            self.construct_target(&path)?
        } else {
            self.traverse_path(&path)?
        };

        *self.inner.verify_action.lock() = Some(action.action_type.clone());
        let result = match (&action.args, &action.value) {
            (Some(args), _) => target.call(&key, args.clone()),
            (None, Some(ActionValue::Raw(value))) => target
                .set(name, value.clone())
                .map(|_| Value::Undefined),
            (None, Some(ActionValue::Packed(data))) => target
                .set(name, Value::from(data))
                .map(|_| Value::Undefined),
            (None, None) => Err(ModelError::invalid_operation(format!(
                "Action \"{}\" carries neither arguments nor a value",
                action.action_type
            ))),
        };
        self.inner.verify_action.lock().take();
        result
    }

    fn write(&self, path: &Path, data: Data) -> ModelResult<()> {
        let mut slot = self.inner.internal_state.lock();
        let state = slot
            .as_ref()
            .ok_or_else(|| ModelError::invalid_operation("Cannot write outside a reduction"))?;
        let next = set_at_path(state, path, data)?;
        *slot = Some(next);
        Ok(())
    }

    /// Hydrate the model a constructor action targets. `path` ends with the
    /// new id; everything before it names the collection.
    fn construct_target(&self, path: &Path) -> ModelResult<Instance> {
        let id = path
            .last()
            .cloned()
            .ok_or_else(|| ModelError::invalid_operation("Cannot construct a model at the root"))?;
        let collection_path = path.parent().unwrap_or_default();
        let collection = self.traverse_path(&collection_path)?;
        if self.peek(&collection.store_path())?.is_undefined() {
            debug!(path = %collection_path, "creating missing collection for constructor");
            self.put(&collection.store_path(), Data::empty_object())?;
        }
        let model = self
            .schema()
            .arena()
            .prop_type(collection.type_id(), &id)
            .ok_or_else(|| {
                ModelError::invalid_operation(format!(
                    "\"{}\" cannot hold a model at \"{}\"",
                    collection_path, id
                ))
            })?;
        self.unpack(
            model,
            collection.store_path().with_segment(id.clone()),
            collection.instance_path().with_segment(id),
            None,
            Some(&collection),
        )?
        .into_instance()
    }

    /// Walk the object graph from the root along an instance path.
    pub fn traverse_path(&self, path: &Path) -> ModelResult<Instance> {
        let mut current = self.root()?;
        for (depth, seg) in path.iter().enumerate() {
            current = match current.get(seg.clone())? {
                Value::Instance(next) => next,
                _ => {
                    return Err(ModelError::path_not_found(Path::from_segments(
                        path.segments()[..=depth].to_vec(),
                    )))
                }
            };
        }
        Ok(current)
    }

    fn set_action_type(&self, path: &Path) -> ModelResult<String> {
        let schema = self.schema();
        let moniker = schema
            .arena()
            .get_type_from_path(schema.root(), path.segments())?;
        Ok(set_action_type(&moniker))
    }

    // ========================================================================
    // State access
    // ========================================================================

    /// The current state: the working copy while reducing, otherwise the
    /// dispatcher's.
    pub fn state(&self) -> ModelResult<Data> {
        if let Some(state) = self.inner.internal_state.lock().as_ref() {
            return Ok(state.clone());
        }
        self.dispatcher()?.get_state()
    }

    /// Read the data at `path`, recording the read.
    pub fn get(&self, path: &Path) -> ModelResult<Data> {
        self.record_read(path);
        self.peek(path)
    }

    /// Read the data at `path` without recording it.
    pub fn peek(&self, path: &Path) -> ModelResult<Data> {
        Ok(self.state()?.get_path(path))
    }

    /// Write packed data at `path` as a `SET_` action.
    pub fn put(&self, path: &Path, data: Data) -> ModelResult<()> {
        self.check_record(path)?;
        if self.inner.options.skip_write_same && self.peek(path)?.same(&data) {
            return Ok(());
        }
        let action = Action::set(self.set_action_type(path)?, path.clone(), data);
        if self.is_reducing() {
            return self.execute_action(&action).map(|_| ());
        }
        self.dispatch(action).map(|_| ())
    }

    /// Replace the whole state after validating it against the root type.
    pub fn set_state(&self, data: Data) -> ModelResult<()> {
        let schema = self.schema();
        if let Some(message) = schema
            .arena()
            .validate_data_at(schema.root(), &data, &Path::root())
        {
            return Err(ModelError::validation(message));
        }
        self.put(&Path::root(), data)
    }

    /// Replace the whole state with a repaired copy of `data`.
    pub fn coerce_state(&self, data: &Data) -> ModelResult<()> {
        let schema = self.schema();
        let coerced = schema
            .arena()
            .coerce_data_at(schema.root(), data, &Path::root());
        self.put(&Path::root(), coerced)
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// The root value; an instance unless the root type is a scalar.
    pub fn instance(&self) -> ModelResult<Value> {
        let root = self.schema().root();
        self.unpack(root, Path::root(), Path::root(), None, None)
    }

    /// The root instance.
    pub fn root(&self) -> ModelResult<Instance> {
        self.instance()?.into_instance()
    }

    /// Pack `value` against the root type and store it as the whole state.
    pub fn set_instance(&self, value: impl Into<Value>) -> ModelResult<()> {
        let schema = self.schema();
        let data = schema.arena().pack(schema.root(), &value.into())?;
        self.put(&Path::root(), data)
    }

    /// Turn the data at a location into a value, reusing a cached instance
    /// bound to the same place. `current` is rebound instead of looked up.
    pub(crate) fn unpack(
        &self,
        type_id: TypeId,
        store_path: Path,
        instance_path: Path,
        current: Option<&Instance>,
        owner: Option<&Instance>,
    ) -> ModelResult<Value> {
        let schema = self.schema();
        let arena = schema.arena();
        let cacheable = !matches!(arena.get(type_id).kind(), Kind::Union | Kind::Reference);
        let key = instance_path.to_string();
        if cacheable && current.is_none() {
            let cached = self.inner.cache.lock().get(&key, type_id, &store_path);
            if let Some(instance) = cached {
                return Ok(Value::Instance(instance));
            }
        }
        let value = arena.unpack(
            type_id,
            UnpackRequest {
                store: self,
                store_path: store_path.clone(),
                instance_path,
                current,
                owner,
            },
        )?;
        if let (true, Value::Instance(instance)) = (cacheable, &value) {
            self.inner.cache.lock().insert(
                key,
                CacheEntry {
                    type_id,
                    store_path,
                    instance: instance.clone(),
                },
            );
        }
        Ok(value)
    }

    /// Run a method call: dispatched as an action unless reducing, then
    /// applied to the instance.
    pub(crate) fn invoke(
        &self,
        instance: &Instance,
        action_type: &str,
        path: Path,
        method: &MethodDescriptor,
        args: Vec<Value>,
    ) -> ModelResult<Value> {
        self.check_record(&instance.store_path())?;
        if method.auto_resolve && args.iter().any(Value::is_pending) {
            let instance = instance.clone();
            let name = method.name.clone();
            return Ok(Value::Pending(PendingValue::new(async move {
                let mut resolved = Vec::with_capacity(args.len());
                for arg in args {
                    resolved.push(match arg {
                        Value::Pending(pending) => pending.await?,
                        other => other,
                    });
                }
                instance.call(&name, resolved)
            })));
        }
        if !self.is_reducing() {
            return self.dispatch(Action::call(action_type, path, args));
        }
        if !self.verify(action_type) {
            return Ok(Value::Undefined);
        }
        self.apply_method(instance, method, &args)
    }

    /// Run a virtual setter: dispatched as an action unless reducing.
    pub(crate) fn set_virtual(
        &self,
        instance: &Instance,
        action_type: &str,
        path: Path,
        setter: Option<&SetterFn>,
        value: Value,
    ) -> ModelResult<()> {
        let setter = setter.ok_or_else(|| {
            ModelError::invalid_operation(format!("Cannot set read-only property \"{}\"", path))
        })?;
        self.check_record(&instance.store_path())?;
        if !self.is_reducing() {
            return self
                .dispatch(Action::assign(action_type, path, value))
                .map(|_| ());
        }
        if !self.verify(action_type) {
            return Ok(());
        }
        setter(instance, value)
    }

    /// Run a method body against an instance. Reducer bodies write their
    /// result back when it is a different tree.
    pub(crate) fn apply_method(
        &self,
        instance: &Instance,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> ModelResult<Value> {
        match &method.implementation {
            MethodImpl::Call(f) => f(instance, args),
            MethodImpl::Reducer(f) => {
                let store_path = instance.store_path();
                let current = self.get(&store_path)?;
                let mut result = MethodResult::default();
                let next = f(instance, &current, args, &mut result)?;
                if !next.same(&current) {
                    self.put(&store_path, next)?;
                }
                Ok(result.take())
            }
        }
    }

    /// Whether a method or setter resolving to `action_type` may run for the
    /// action being executed. A replayed action that now resolves elsewhere
    /// is ignored.
    fn verify(&self, action_type: &str) -> bool {
        let mut slot = self.inner.verify_action.lock();
        if let Some(expected) = slot.as_deref() {
            if expected != action_type {
                debug!(expected, action_type, "ignoring action resolved to another method");
                return false;
            }
        }
        *slot = None;
        true
    }

    // ========================================================================
    // Read recording
    // ========================================================================

    /// Open a record frame.
    pub fn start_record(&self) {
        let mut records = self.inner.records.lock();
        records.push();
        trace!(depth = records.depth(), "record frame opened");
    }

    /// Close the innermost record frame. A discarded frame is not folded
    /// into its parent.
    pub fn stop_record(&self, discard: bool) -> ModelResult<RecordSnapshot> {
        let root = self
            .inner
            .records
            .lock()
            .pop(discard)
            .ok_or_else(|| ModelError::invalid_operation("No record frame is open"))?;
        Ok(RecordSnapshot {
            root,
            state: self.state()?,
        })
    }

    /// Whether a record frame is open.
    pub fn is_recording(&self) -> bool {
        self.inner.records.lock().is_recording()
    }

    /// Run `f` inside a record frame and return its reads.
    ///
    /// If `f` panics the frame is discarded.
    pub fn trace<R>(&self, f: impl FnOnce() -> R) -> ModelResult<(R, RecordSnapshot)> {
        self.start_record();
        let mut guard = RecordFrameGuard {
            inner: &self.inner,
            open: true,
        };
        let result = f();
        guard.open = false;
        drop(guard);
        let snapshot = self.stop_record(false)?;
        Ok((result, snapshot))
    }

    /// Run `f` without recording its reads.
    pub fn suspend_trace<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.records.lock().suspend();
        let _guard = SuspendGuard(&self.inner);
        f()
    }

    /// Note that the whole value at `path` was read.
    pub fn record_read(&self, path: &Path) {
        self.inner.records.lock().record(path, ReadMode::Check);
    }

    /// Note that the key set at `path` was read.
    pub fn record_keys(&self, path: &Path) {
        self.inner.records.lock().record(path, ReadMode::Keys);
    }

    /// Fail when a write happens while reads are being recorded.
    pub fn check_record(&self, path: &Path) -> ModelResult<()> {
        if self.is_recording() {
            return Err(ModelError::reentrancy(path.clone()));
        }
        Ok(())
    }

    /// Whether every read in `snapshot` still sees the same data.
    pub fn same_recorded_state(&self, snapshot: &RecordSnapshot) -> ModelResult<bool> {
        let state = self.state()?;
        Ok(snapshot.root.unchanged(&snapshot.state, &state))
    }

    /// Whether every read in `snapshot` sees the same data in `state`.
    pub fn compare_recorded_state(&self, snapshot: &RecordSnapshot, state: &Data) -> bool {
        snapshot.root.unchanged(&snapshot.state, state)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", self.schema().root_descriptor())
            .field("connected", &self.inner.dispatcher.read().is_some())
            .field("reducing", &self.is_reducing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn counter_store() -> (Store, Arc<LocalDispatcher>) {
        Store::with_local_dispatcher(
            json!({"count": "Number", "label": "String"}),
            StoreOptions::default(),
        )
        .unwrap()
    }

    // ========================================================================
    // Cache
    // ========================================================================

    #[test]
    fn test_cache_evicts_oldest() {
        let (store, _) = counter_store();
        let root = store.root().unwrap();
        let mut cache = InstanceCache::new(2);
        for key in ["a", "b", "c"] {
            cache.insert(
                key.to_string(),
                CacheEntry {
                    type_id: root.type_id(),
                    store_path: Path::root(),
                    instance: root.clone(),
                },
            );
        }
        assert!(cache.get("a", root.type_id(), &Path::root()).is_none());
        assert!(cache.get("c", root.type_id(), &Path::root()).is_some());
        assert!(cache.get("c", root.type_id(), &path!("x")).is_none());
    }

    #[test]
    fn test_cache_hit_refreshes_recency() {
        let (store, _) = counter_store();
        let root = store.root().unwrap();
        let entry = || CacheEntry {
            type_id: root.type_id(),
            store_path: Path::root(),
            instance: root.clone(),
        };
        let mut cache = InstanceCache::new(2);
        cache.insert("a".to_string(), entry());
        cache.insert("b".to_string(), entry());
        for _ in 0..1000 {
            assert!(cache.get("a", root.type_id(), &Path::root()).is_some());
        }
        assert!(cache.order.len() <= 33);

        cache.insert("c".to_string(), entry());

        assert!(cache.get("a", root.type_id(), &Path::root()).is_some());
        assert!(cache.get("b", root.type_id(), &Path::root()).is_none());
        assert!(cache.get("c", root.type_id(), &Path::root()).is_some());
    }

    #[test]
    fn test_unpack_rebinds_current_instance() {
        let (store, _) = Store::with_local_dispatcher(
            json!({"a": {"x": "Number"}, "b": {"x": "Number"}}),
            StoreOptions::default(),
        )
        .unwrap();
        let root = store.root().unwrap();
        let a = root.child("a").unwrap();
        let ty = a.type_id();
        store.put(&path!("b", "x"), Data::from(7.0)).unwrap();
        let cached = store
            .unpack(ty, path!("b"), path!("b"), None, Some(&root))
            .unwrap()
            .into_instance()
            .unwrap();

        let rebound = store
            .unpack(ty, path!("b"), path!("b"), Some(&a), Some(&root))
            .unwrap()
            .into_instance()
            .unwrap();

        assert!(rebound.ptr_eq(&a));
        assert!(!rebound.ptr_eq(&cached));
        assert_eq!(a.store_path(), path!("b"));
        assert_eq!(a.get("x").unwrap(), Value::from(7));
        let again = store
            .unpack(ty, path!("b"), path!("b"), None, Some(&root))
            .unwrap()
            .into_instance()
            .unwrap();
        assert!(again.ptr_eq(&a));
    }

    #[test]
    fn test_root_instance_cached() {
        let (store, _) = counter_store();
        assert!(store.root().unwrap().ptr_eq(&store.root().unwrap()));
    }

    // ========================================================================
    // Dispatch and reduction
    // ========================================================================

    #[test]
    fn test_default_state() {
        let (store, dispatcher) = counter_store();
        assert_eq!(dispatcher.snapshot().to_json(), json!({"count": 0, "label": ""}));
        assert_eq!(store.state().unwrap().to_json(), json!({"count": 0, "label": ""}));
    }

    #[test]
    fn test_put_dispatches_set_action() {
        let (store, dispatcher) = counter_store();
        store.put(&path!("count"), Data::from(3.0)).unwrap();
        let history = dispatcher.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_type, "SET_COUNT");
        assert_eq!(store.peek(&path!("count")).unwrap(), Data::from(3.0));
        assert!(!store.is_reducing());
    }

    #[test]
    fn test_skip_write_same() {
        let (store, dispatcher) = Store::with_local_dispatcher(
            json!({"count": "Number"}),
            StoreOptions::default().with_skip_write_same(true),
        )
        .unwrap();
        store.put(&path!("count"), Data::from(0.0)).unwrap();
        assert_eq!(dispatcher.history_len(), 0);
    }

    #[test]
    fn test_passthrough_actions_keep_state() {
        let (store, _) = counter_store();
        let state = Data::from(json!({"count": 7, "label": "x"}));
        let next = store.reduce(Some(state.clone()), &Action::init()).unwrap();
        assert!(next.same(&state));
    }

    #[test]
    fn test_reduce_replays_set_action() {
        let (store, _) = counter_store();
        let action = Action::set("SET_LABEL", path!("label"), Data::from("hi"));
        let next = store.reduce(None, &action).unwrap();
        assert_eq!(next.to_json(), json!({"count": 0, "label": "hi"}));
    }

    #[test]
    fn test_no_dispatcher() {
        let store = Store::new(json!({"count": "Number"}), StoreOptions::default()).unwrap();
        assert!(matches!(store.state(), Err(ModelError::NoDispatcher)));
    }

    #[test]
    fn test_reducer_outlived_store() {
        let (store, dispatcher) = counter_store();
        drop(store);
        let err = dispatcher
            .dispatch(Action::set("SET_COUNT", path!("count"), Data::from(1.0)))
            .unwrap_err();
        assert_eq!(err, ModelError::StoreDropped);
    }

    // ========================================================================
    // Whole-state writes
    // ========================================================================

    #[test]
    fn test_set_state_validates() {
        let (store, _) = counter_store();
        let err = store
            .set_state(Data::from(json!({"count": "x", "label": ""})))
            .unwrap_err();
        assert!(err.is_type_error());
        store
            .set_state(Data::from(json!({"count": 2, "label": "ok"})))
            .unwrap();
        assert_eq!(store.peek(&path!("count")).unwrap(), Data::from(2.0));
    }

    #[test]
    fn test_coerce_state_repairs() {
        let (store, _) = counter_store();
        store
            .coerce_state(&Data::from(json!({"count": "x", "label": "ok"})))
            .unwrap();
        assert_eq!(store.state().unwrap().to_json(), json!({"count": 0, "label": "ok"}));
    }

    // ========================================================================
    // Recording
    // ========================================================================

    #[test]
    fn test_write_while_recording_fails() {
        let (store, _) = counter_store();
        let (result, snapshot) = store
            .trace(|| store.put(&path!("count"), Data::from(1.0)))
            .unwrap();
        assert!(matches!(result, Err(ModelError::Reentrancy { .. })));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_trace_discards_frame_on_panic() {
        let (store, _) = counter_store();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.trace(|| {
                let _ = store.get(&path!("count"));
                panic!("reading failed");
            })
        }));

        assert!(outcome.is_err());
        assert!(!store.is_recording());
        store.put(&path!("count"), Data::from(1.0)).unwrap();
        assert_eq!(store.peek(&path!("count")).unwrap(), Data::from(1.0));
    }

    #[test]
    fn test_stop_without_frame() {
        let (store, _) = counter_store();
        assert!(store.stop_record(false).is_err());
    }
}
