//! Untyped objects and arrays: any plain JSON-compatible container.

use super::{TypeCx, TypeHandler, TypeId, UnpackRequest};
use crate::hydrate::Prototype;
use crate::{Data, Instance, ModelError, ModelResult, Path, Seg, Store, Value};

pub(crate) struct AnyObjectType {
    array: bool,
    object_child: TypeId,
    array_child: TypeId,
    prototype: Prototype,
}

impl AnyObjectType {
    pub fn new(array: bool, object_child: TypeId, array_child: TypeId, prototype: Prototype) -> Self {
        Self {
            array,
            object_child,
            array_child,
            prototype,
        }
    }

    fn noun(&self) -> &'static str {
        if self.array {
            "array"
        } else {
            "object"
        }
    }

    fn fits(&self, value: &Data) -> bool {
        matches!(
            (self.array, value),
            (true, Data::Array(_)) | (false, Data::Object(_))
        )
    }

    /// Plain data for `value`, or `None` when it holds exotic values.
    fn plain(value: &Value) -> Option<Data> {
        fn is_plain(value: &Value) -> bool {
            match value {
                Value::Date(_) | Value::RegExp(_) | Value::Error(_) | Value::Pending(_) => false,
                Value::Array(items) => items.iter().all(is_plain),
                Value::Object(map) => map.values().all(is_plain),
                _ => true,
            }
        }
        if !is_plain(value) {
            return None;
        }
        value.to_data().ok()
    }

    fn index(&self, cx: TypeCx<'_>, seg: &Seg) -> ModelResult<usize> {
        seg.as_index().ok_or_else(|| {
            ModelError::validation(format!(
                "Cannot set \"{}\" property on array",
                cx.moniker().with_segment(seg.to_key())
            ))
        })
    }
}

impl TypeHandler for AnyObjectType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        if self.fits(value) {
            None
        } else {
            Some(format!("Type of \"{}\" data must be {}", path, self.noun()))
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        match Self::plain(value) {
            Some(data) if self.fits(&data) => None,
            _ => Some(format!("Type of \"{}\" data must be {}", path, self.noun())),
        }
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        match Self::plain(value) {
            Some(data) if self.fits(&data) => Ok(data),
            _ => Err(ModelError::validation(format!(
                "{} only accepts simple {}s",
                cx.moniker(),
                self.noun()
            ))),
        }
    }

    fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        Ok(Value::Instance(Instance::hydrate(&req, cx.desc.id)))
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        if self.array {
            Data::array(Vec::new())
        } else {
            Data::empty_object()
        }
    }

    fn type_from_path(&self, cx: TypeCx<'_>, path: &[Seg]) -> ModelResult<Path> {
        Ok(cx.moniker().join(path))
    }

    fn prototype(&self) -> Option<&Prototype> {
        Some(&self.prototype)
    }

    fn get_prop(
        &self,
        _cx: TypeCx<'_>,
        store: &Store,
        instance: &Instance,
        seg: Seg,
    ) -> ModelResult<Value> {
        let store_path = instance.store_path();
        let state = store.get(&store_path)?;
        let seg = if self.array {
            match seg.for_array() {
                Some(seg) => seg,
                None => return Ok(Value::Undefined),
            }
        } else {
            seg.for_object()
        };
        let child = state.child(&seg);
        let id = match child {
            Data::Object(_) => self.object_child,
            Data::Array(_) => self.array_child,
            scalar => return Ok(Value::from(scalar)),
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
        let packed = self.pack_prop(cx, &seg, &value)?;
        let store_path = instance.store_path();
        if !self.array {
            return store.put(&store_path.with_segment(seg.for_object()), packed);
        }
        let index = self.index(cx, &seg)?;
        let current = store.get(&store_path)?;
        let len = current.as_array().map_or(0, |items| items.len());
        if index > len {
            let mut items = current
                .as_array()
                .map(|items| items.as_ref().clone())
                .unwrap_or_default();
            items.resize(index, Data::Undefined);
            items.push(packed);
            return store.put(&store_path, Data::array(items));
        }
        store.put(&store_path.with_segment(index), packed)
    }

    fn pack_prop(&self, cx: TypeCx<'_>, seg: &Seg, value: &Value) -> ModelResult<Data> {
        Self::plain(value).ok_or_else(|| {
            ModelError::validation(format!(
                "{} only accepts simple types",
                cx.moniker().with_segment(seg.to_key())
            ))
        })
    }
}
