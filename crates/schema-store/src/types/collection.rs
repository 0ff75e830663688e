//! Collections of models keyed by id, and sets of collections.

use super::Role;
use crate::naming::{method_action_type, type_snake};
use crate::{
    Action, Instance, MethodDescriptor, ModelDef, ModelError, ModelResult, Schema, Shape, Value,
    VirtualDescriptor,
};
use std::collections::BTreeMap;

/// Members of a collection; the parser adds the model as the rest type.
pub(crate) fn collection_shape(def: &ModelDef) -> Shape {
    let model_name = def.name.clone();
    Shape::new()
        .method(MethodDescriptor::new("remove", remove))
        .virtual_prop(
            "all",
            VirtualDescriptor::getter(|inst| {
                let mut items = Vec::new();
                for key in inst.keys()?.iter() {
                    items.push(inst.get(key.as_str())?);
                }
                Ok(Value::Array(items))
            }),
        )
        .virtual_prop(
            "model",
            VirtualDescriptor::getter(move |_| Ok(Value::from(model_name.as_str()))),
        )
}

/// One collection property per model, plus a `models` virtual mapping model
/// names to collection keys.
pub(crate) fn collections_shape(defs: &[ModelDef]) -> (Shape, BTreeMap<String, String>) {
    let by_model: BTreeMap<String, String> = defs
        .iter()
        .map(|def| (def.name.clone(), def.collection_key()))
        .collect();
    let mut shape = Shape::new();
    for def in defs {
        shape = shape.prop(def.collection_key(), Schema::Collection(def.clone()));
    }
    let models = by_model.clone();
    let shape = shape.virtual_prop(
        "models",
        VirtualDescriptor::getter(move |_| {
            Ok(Value::Object(
                models
                    .iter()
                    .map(|(name, key)| (name.clone(), Value::from(key.as_str())))
                    .collect(),
            ))
        }),
    );
    (shape, by_model)
}

fn collection_model(inst: &Instance) -> ModelResult<(super::TypeId, String)> {
    inst.type_descriptor(|desc| match desc.role() {
        Role::Collection(info) => Some((info.model, info.model_name.clone())),
        _ => None,
    })?
    .ok_or_else(|| ModelError::invalid_operation("Not a collection"))
}

fn remove(inst: &Instance, args: &[Value]) -> ModelResult<Value> {
    let (model, model_name) = collection_model(inst)?;
    let id = match args.first() {
        Some(Value::Instance(target)) => {
            let store = inst.store()?;
            let id_key = store
                .schema()
                .arena()
                .get(model)
                .model_info()
                .map(|info| info.id_key.clone())
                .unwrap_or_else(|| "id".to_string());
            target.get(id_key.as_str())?.to_string()
        }
        Some(id) => id.to_string(),
        None => {
            return Err(ModelError::invalid_operation(format!(
                "Could not remove {}: no id given",
                model_name
            )))
        }
    };
    if inst.get(id.as_str())?.is_undefined() {
        return Err(ModelError::invalid_operation(format!(
            "Could not remove {}[{}]: object not found",
            model_name, id
        )));
    }
    inst.set(id.as_str(), Value::Undefined)?;
    Ok(Value::Undefined)
}

impl Instance {
    /// Create a model in this collection.
    ///
    /// The id is generated here, before dispatch, so the constructor action
    /// replays to the same record.
    pub fn create(&self, values: impl Into<Value>) -> ModelResult<Instance> {
        let (model, _) = collection_model(self)?;
        let store = self.store()?;
        let id = store.generate_id();
        let action_type = {
            let desc = store.schema().arena().get(model);
            desc.prototype()
                .and_then(|p| p.method_action_type("constructor"))
                .map(str::to_string)
                .unwrap_or_else(|| method_action_type(&type_snake(desc.moniker()), "constructor"))
        };
        let path = self.instance_path().key(id.as_str()).key("constructor");
        store.dispatch(Action::call(action_type, path, vec![values.into()]))?;
        self.child(id)
    }

    /// Remove a model by id or by instance. Fails when it does not exist.
    pub fn remove(&self, target: impl Into<Value>) -> ModelResult<()> {
        self.call("remove", vec![target.into()]).map(|_| ())
    }

    /// Every model in this collection.
    pub fn all(&self) -> ModelResult<Vec<Instance>> {
        match self.get("all")? {
            Value::Array(items) => items.into_iter().map(Value::into_instance).collect(),
            other => Err(ModelError::invalid_operation(format!(
                "Expected a list of models, got {}",
                other.type_name()
            ))),
        }
    }
}
