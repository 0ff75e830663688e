//! Shapes, lists and tuples.
//!
//! All three share one handler: a table of declared properties plus an
//! optional rest type, differing only in how keys are addressed.

use super::{TypeCx, TypeHandler, TypeId, UnpackRequest};
use crate::hydrate::Prototype;
use crate::{Data, Instance, ModelError, ModelResult, Path, Seg, Store, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How an object type addresses its members.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Form {
    Object,
    Array,
    Tuple(usize),
}

impl Form {
    fn is_array(self) -> bool {
        !matches!(self, Form::Object)
    }

    fn noun(self) -> &'static str {
        if self.is_array() {
            "array"
        } else {
            "object"
        }
    }
}

pub(crate) struct ObjectType {
    form: Form,
    properties: BTreeMap<String, TypeId>,
    rest: Option<TypeId>,
    prototype: Prototype,
    model_id_key: Option<String>,
}

/// A value being assigned: plain containers or a live instance.
enum Source<'a> {
    Map(&'a BTreeMap<String, Value>),
    List(&'a [Value]),
    Live(&'a Instance),
}

impl<'a> Source<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Source::Map(map)),
            Value::Array(items) => Some(Source::List(items)),
            Value::Instance(inst) => Some(Source::Live(inst)),
            _ => None,
        }
    }

    fn is_array(&self) -> ModelResult<bool> {
        match self {
            Source::Map(_) => Ok(false),
            Source::List(_) => Ok(true),
            Source::Live(inst) => Ok(inst.kind()?.is_array_like()),
        }
    }

    fn keys(&self) -> ModelResult<Vec<String>> {
        match self {
            Source::Map(map) => Ok(map.keys().cloned().collect()),
            Source::List(items) => Ok((0..items.len()).map(|i| i.to_string()).collect()),
            Source::Live(inst) => Ok(inst.keys()?.as_ref().clone()),
        }
    }

    fn get(&self, key: &str) -> ModelResult<Value> {
        match self {
            Source::Map(map) => Ok(map.get(key).cloned().unwrap_or_default()),
            Source::List(items) => Ok(Seg::key(key)
                .as_index()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or_default()),
            Source::Live(inst) => inst.get(key),
        }
    }
}

impl ObjectType {
    pub fn new(
        form: Form,
        properties: BTreeMap<String, TypeId>,
        rest: Option<TypeId>,
        prototype: Prototype,
        model_id_key: Option<String>,
    ) -> Self {
        Self {
            form,
            properties,
            rest,
            prototype,
            model_id_key,
        }
    }

    /// The type of the member at `seg`, if the type has one.
    fn lookup(&self, seg: &Seg) -> Option<TypeId> {
        match self.form {
            Form::Object => {
                let key = seg.to_key();
                self.properties.get(&key).copied().or(self.rest)
            }
            Form::Array => seg.as_index().and(self.rest),
            Form::Tuple(len) => seg
                .as_index()
                .filter(|i| *i < len)
                .and_then(|i| self.properties.get(&i.to_string()).copied()),
        }
    }

    fn declared(&self, key: &str) -> bool {
        match self.form {
            Form::Tuple(_) => false,
            _ => self.properties.contains_key(key),
        }
    }

    fn member_or_err(&self, cx: TypeCx<'_>, seg: &Seg, path: &Path) -> ModelResult<TypeId> {
        self.lookup(seg).ok_or_else(|| {
            if self.form.is_array() {
                ModelError::validation(format!(
                    "Cannot set \"{}\" property on {}",
                    path.with_segment(seg.to_key()),
                    cx.desc.kind
                ))
            } else {
                ModelError::validation(format!(
                    "Unknown property {}",
                    path.with_segment(seg.to_key())
                ))
            }
        })
    }

    fn check_shape(&self, value: &Data, path: &Path) -> Option<String> {
        let fits = match (self.form, value) {
            (Form::Object, Data::Object(_)) => true,
            (Form::Array, Data::Array(_)) => true,
            (Form::Tuple(len), Data::Array(items)) => {
                if items.len() != len {
                    return Some(format!(
                        "Tuple \"{}\" data must have {} items",
                        path, len
                    ));
                }
                true
            }
            _ => false,
        };
        if fits {
            None
        } else {
            Some(format!(
                "Type of \"{}\" data must be {}",
                path,
                self.form.noun()
            ))
        }
    }

    fn model_id_fix(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<(String, Data)> {
        let key = self.model_id_key.as_ref()?;
        let last = path.last()?;
        if path == cx.moniker() {
            return None;
        }
        let id = Data::string(last.to_key());
        match value.get(&Seg::key(key.as_str())) {
            Some(current) if current == &id => None,
            _ => Some((key.clone(), id)),
        }
    }
}

impl TypeHandler for ObjectType {
    fn validate_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        if let Some(message) = self.check_shape(value, path) {
            return Some(message);
        }
        match self.form {
            Form::Object => {
                for (name, id) in &self.properties {
                    let child = value.child(&Seg::key(name.as_str()));
                    if let Some(message) =
                        cx.arena.validate_data_at(*id, &child, &path.with_segment(name))
                    {
                        return Some(message);
                    }
                }
                let map = value.as_object()?;
                for (name, child) in map.iter() {
                    if self.properties.contains_key(name) {
                        continue;
                    }
                    let child_path = path.with_segment(name);
                    match self.rest {
                        Some(rest) => {
                            if let Some(message) = cx.arena.validate_data_at(rest, child, &child_path)
                            {
                                return Some(message);
                            }
                        }
                        None => {
                            return Some(format!("Unknown data property \"{}\"", child_path))
                        }
                    }
                }
                None
            }
            Form::Array | Form::Tuple(_) => {
                let items = value.as_array()?;
                items.iter().enumerate().find_map(|(i, item)| {
                    let id = self.lookup(&Seg::Index(i))?;
                    cx.arena.validate_data_at(id, item, &path.with_segment(i))
                })
            }
        }
    }

    fn coerce_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Data {
        let fix = self.model_id_fix(cx, value, path);
        if fix.is_none() && self.validate_data(cx, value, path).is_none() {
            return value.clone();
        }
        let mut out = match self.form {
            Form::Object => {
                let mut entries: BTreeMap<String, Data> = BTreeMap::new();
                for (name, id) in &self.properties {
                    let child = value.child(&Seg::key(name.as_str()));
                    entries.insert(
                        name.clone(),
                        cx.arena.coerce_data_at(*id, &child, &path.with_segment(name)),
                    );
                }
                if let (Some(rest), Some(map)) = (self.rest, value.as_object()) {
                    for (name, child) in map.iter() {
                        if self.properties.contains_key(name) {
                            continue;
                        }
                        entries.insert(
                            name.clone(),
                            cx.arena.coerce_data_at(rest, child, &path.with_segment(name)),
                        );
                    }
                }
                Data::object(entries)
            }
            Form::Array => {
                let items = match (value.as_array(), self.rest) {
                    (Some(items), Some(rest)) => items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| cx.arena.coerce_data_at(rest, item, &path.with_segment(i)))
                        .collect(),
                    _ => Vec::new(),
                };
                Data::array(items)
            }
            Form::Tuple(len) => {
                let items = (0..len)
                    .map(|i| {
                        let seg = Seg::Index(i);
                        let child = value.child(&seg);
                        match self.lookup(&seg) {
                            Some(id) => cx.arena.coerce_data_at(id, &child, &path.with_segment(i)),
                            None => child,
                        }
                    })
                    .collect();
                Data::array(items)
            }
        };
        if let (Some((key, id)), Data::Object(map)) = (fix, &mut out) {
            Arc::make_mut(map).insert(key, id);
        }
        out
    }

    fn validate_assign(&self, cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        if let Value::Instance(inst) = value {
            if inst.type_id() == cx.desc.id {
                return None;
            }
        }
        let mismatch = || Some(format!("Type of \"{}\" must be {}", path, self.form.noun()));
        let Some(source) = Source::of(value) else {
            return mismatch();
        };
        match source.is_array() {
            Ok(array) if array == self.form.is_array() => {}
            Ok(_) => return mismatch(),
            Err(e) => return Some(e.to_string()),
        }
        let keys = match source.keys() {
            Ok(keys) => keys,
            Err(e) => return Some(e.to_string()),
        };
        if let Form::Tuple(len) = self.form {
            if keys.len() != len {
                return Some(format!("Tuple \"{}\" must have {} items", path, len));
            }
        }
        let read = |key: &str| source.get(key).map_err(|e| e.to_string());
        if self.form == Form::Object {
            for (name, id) in &self.properties {
                let child = match read(name) {
                    Ok(child) => child,
                    Err(message) => return Some(message),
                };
                if let Some(message) =
                    cx.arena.validate_assign_at(*id, &child, &path.with_segment(name))
                {
                    return Some(message);
                }
            }
        }
        for key in &keys {
            if self.declared(key) {
                continue;
            }
            let child_path = path.with_segment(key);
            let Some(id) = self.lookup(&Seg::key(key.as_str())) else {
                return Some(format!("Unknown property \"{}\"", child_path));
            };
            let child = match read(key) {
                Ok(child) => child,
                Err(message) => return Some(message),
            };
            if child.is_undefined() && self.form == Form::Object {
                continue;
            }
            if let Some(message) = cx.arena.validate_assign_at(id, &child, &child_path) {
                return Some(message);
            }
        }
        None
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        if let Value::Instance(inst) = value {
            if inst.type_id() == cx.desc.id {
                return inst.state();
            }
        }
        let source = Source::of(value).ok_or_else(|| {
            ModelError::validation(format!(
                "Type of \"{}\" must be {}",
                cx.moniker(),
                self.form.noun()
            ))
        })?;
        let keys = source.keys()?;
        match self.form {
            Form::Object => {
                let mut entries = Vec::with_capacity(keys.len());
                for (name, id) in &self.properties {
                    entries.push((name.clone(), cx.arena.pack_unverified(*id, &source.get(name)?)?));
                }
                if let Some(rest) = self.rest {
                    for key in keys.iter().filter(|k| !self.properties.contains_key(*k)) {
                        let child = source.get(key)?;
                        if child.is_undefined() {
                            continue;
                        }
                        entries.push((key.clone(), cx.arena.pack_unverified(rest, &child)?));
                    }
                }
                Ok(Data::object(entries))
            }
            Form::Array | Form::Tuple(_) => {
                let mut items = Vec::with_capacity(keys.len());
                for key in &keys {
                    let id = self.member_or_err(cx, &Seg::key(key.as_str()), cx.moniker())?;
                    items.push(cx.arena.pack_unverified(id, &source.get(key)?)?);
                }
                Ok(Data::array(items))
            }
        }
    }

    fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        Ok(Value::Instance(Instance::hydrate(&req, cx.desc.id)))
    }

    fn default_value(&self, cx: TypeCx<'_>) -> Data {
        match self.form {
            Form::Object => Data::object(
                self.properties
                    .iter()
                    .map(|(name, id)| (name.clone(), cx.arena.default_value(*id))),
            ),
            Form::Array => Data::array(Vec::new()),
            Form::Tuple(len) => Data::array(
                (0..len)
                    .map(|i| {
                        self.lookup(&Seg::Index(i))
                            .map(|id| cx.arena.default_value(id))
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
        }
    }

    fn type_from_path(&self, cx: TypeCx<'_>, path: &[Seg]) -> ModelResult<Path> {
        let Some((first, tail)) = path.split_first() else {
            return Ok(cx.moniker().clone());
        };
        if let Some(id) = self.lookup(first) {
            return cx.arena.get_type_from_path(id, tail);
        }
        if tail.is_empty() {
            if let Some(name) = first.as_key() {
                if self.prototype.virtual_prop(name).is_some() {
                    return Ok(cx.moniker().with_segment(name));
                }
            }
        }
        Err(ModelError::path_not_found(cx.moniker().join(path)))
    }

    fn prototype(&self) -> Option<&Prototype> {
        Some(&self.prototype)
    }

    fn properties(&self) -> Option<&BTreeMap<String, TypeId>> {
        Some(&self.properties)
    }

    fn rest_type(&self) -> Option<TypeId> {
        self.rest
    }

    fn prop_type(&self, seg: &Seg) -> Option<TypeId> {
        self.lookup(seg)
    }

    fn tuple_len(&self) -> Option<usize> {
        match self.form {
            Form::Tuple(len) => Some(len),
            _ => None,
        }
    }

    fn get_prop(
        &self,
        cx: TypeCx<'_>,
        store: &Store,
        instance: &Instance,
        seg: Seg,
    ) -> ModelResult<Value> {
        let store_path = instance.store_path();
        let seg = if self.form.is_array() {
            let Some(index) = seg.as_index() else {
                return Ok(Value::Undefined);
            };
            if index >= instance.len()? {
                return Ok(Value::Undefined);
            }
            Seg::Index(index)
        } else {
            seg.for_object()
        };
        let key = seg.to_key();
        let id = match self.form {
            Form::Object if self.properties.contains_key(&key) => self.properties[&key],
            Form::Object => {
                let rest = self.rest.ok_or_else(|| {
                    ModelError::validation(format!(
                        "Unknown property {}",
                        cx.moniker().with_segment(key.as_str())
                    ))
                })?;
                let present = store.suspend_trace(|| {
                    instance.keys().map(|keys| keys.iter().any(|k| *k == key))
                })?;
                if !present {
                    return Ok(Value::Undefined);
                }
                rest
            }
            _ => match self.lookup(&seg) {
                Some(id) => id,
                None => return Ok(Value::Undefined),
            },
        };
        store.unpack(
            id,
            store_path.with_segment(seg.clone()),
            instance.instance_path().with_segment(seg),
            None,
            Some(instance),
        )
    }

    fn set_prop(
        &self,
        cx: TypeCx<'_>,
        store: &Store,
        instance: &Instance,
        seg: Seg,
        value: Value,
    ) -> ModelResult<()> {
        let store_path = instance.store_path();
        let instance_path = instance.instance_path();
        if self.form.is_array() {
            let index = seg.as_index().ok_or_else(|| {
                ModelError::validation(format!(
                    "Cannot set \"{}\" property on {}",
                    cx.moniker().with_segment(seg.to_key()),
                    cx.desc.kind
                ))
            })?;
            let id = self.member_or_err(cx, &Seg::Index(index), &instance_path)?;
            let packed = cx.arena.pack(id, &value)?;
            let current = store.get(&store_path)?;
            let len = current.as_array().map_or(0, |items| items.len());
            if index > len {
                let mut items = current.as_array().map(|a| a.as_ref().clone()).unwrap_or_default();
                while items.len() < index {
                    items.push(cx.arena.default_value(id));
                }
                items.push(packed);
                return store.put(&store_path, Data::array(items)).map(|_| ());
            }
            return store
                .put(&store_path.with_segment(index), packed)
                .map(|_| ());
        }
        let seg = seg.for_object();
        let id = self.member_or_err(cx, &seg, &instance_path)?;
        let rest_delete = value.is_undefined() && !self.properties.contains_key(&seg.to_key());
        let packed = if rest_delete {
            Data::Undefined
        } else {
            cx.arena.pack(id, &value)?
        };
        store.put(&store_path.with_segment(seg), packed).map(|_| ())
    }

    fn pack_prop(&self, cx: TypeCx<'_>, seg: &Seg, value: &Value) -> ModelResult<Data> {
        let id = self.member_or_err(cx, seg, cx.moniker())?;
        cx.arena.pack(id, value)
    }

    fn default_prop(&self, cx: TypeCx<'_>, seg: &Seg) -> Data {
        self.lookup(seg)
            .map(|id| cx.arena.default_value(id))
            .unwrap_or_default()
    }
}
