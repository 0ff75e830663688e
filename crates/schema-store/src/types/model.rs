//! Models: object shapes with an id property and a constructor.

use crate::schema::{resolve_literal, MethodImpl, ShapeEntry};
use crate::{
    Data, Instance, MethodDescriptor, MethodResult, ModelDef, ModelError, ModelResult, Schema,
    Seg, Shape, Value,
};

fn is_object_id(schema: &Schema) -> bool {
    match schema {
        Schema::ObjectId => true,
        Schema::Spec { ty, .. } => is_object_id(ty),
        Schema::Validate(base, _) | Schema::Coerce(base, _) => is_object_id(base),
        Schema::Literal(literal) => resolve_literal(literal).is_ok_and(|s| is_object_id(&s)),
        _ => false,
    }
}

fn definition_shape(def: &ModelDef) -> ModelResult<Shape> {
    let resolved = match def.definition.as_ref() {
        Schema::Literal(literal) => resolve_literal(literal)?,
        other => other.clone(),
    };
    match resolved {
        Schema::Shape(shape) => Ok(shape),
        Schema::Object => Ok(Shape::new()),
        _ => Err(ModelError::schema("model definitions must be objects")),
    }
}

/// The shape a model compiles to, and the name of its id property.
///
/// A missing id property is added as `id: ObjectId`. The constructor stores
/// the default record with its id taken from the store path, then runs the
/// declared constructor, or assigns each property of the first argument.
pub(crate) fn model_shape(def: &ModelDef) -> ModelResult<(Shape, String)> {
    let mut shape = definition_shape(def)?;

    let ids: Vec<String> = shape
        .entries
        .iter()
        .filter(|(_, entry)| matches!(entry, ShapeEntry::Prop(schema) if is_object_id(schema)))
        .map(|(name, _)| name.clone())
        .collect();
    let id_key = match ids.as_slice() {
        [] => {
            if shape.prop_schema("id").is_some() {
                return Err(ModelError::schema(format!(
                    "The \"id\" property of \"{}\" must be an ObjectId",
                    def.name
                )));
            }
            shape = shape.prop("id", Schema::ObjectId);
            "id".to_string()
        }
        [single] => single.clone(),
        _ => {
            return Err(ModelError::schema(format!(
                "Model \"{}\" declares more than one ObjectId property",
                def.name
            )))
        }
    };

    let user = shape.entries.iter().find_map(|(name, entry)| match entry {
        ShapeEntry::Method(method) if name == "constructor" => Some(method.implementation.clone()),
        _ => None,
    });
    let key = id_key.clone();
    let constructor = MethodDescriptor::new("constructor", move |inst, args| {
        initialize(inst, &key)?;
        match &user {
            Some(body) => run_user_constructor(body, inst, args)?,
            None => assign_values(inst, args.first())?,
        }
        Ok(Value::Instance(inst.clone()))
    });
    Ok((shape.method(constructor), id_key))
}

/// Store the default record with its id set from the store path, then
/// rebind `inst` to it so it becomes the cached handle for that location.
fn initialize(inst: &Instance, id_key: &str) -> ModelResult<()> {
    let store = inst.store()?;
    let store_path = inst.store_path();
    let id = store_path
        .last()
        .map(Seg::to_key)
        .ok_or_else(|| ModelError::invalid_operation("Cannot construct a model at the root"))?;
    let mut record = store.schema().arena().default_value(inst.type_id());
    if let Data::Object(map) = &mut record {
        std::sync::Arc::make_mut(map).insert(id_key.to_string(), Data::string(id));
    }
    store.put(&store_path, record)?;
    let owner = inst.owner();
    store.unpack(
        inst.type_id(),
        store_path,
        inst.instance_path(),
        Some(inst),
        owner.as_ref(),
    )?;
    Ok(())
}

fn run_user_constructor(body: &MethodImpl, inst: &Instance, args: &[Value]) -> ModelResult<()> {
    match body {
        MethodImpl::Call(f) => f(inst, args).map(|_| ()),
        MethodImpl::Reducer(f) => {
            let state = inst.state()?;
            let mut result = MethodResult::default();
            let next = f(inst, &state, args, &mut result)?;
            if !next.same(&state) {
                inst.set_state(next)?;
            }
            Ok(())
        }
    }
}

fn assign_values(inst: &Instance, values: Option<&Value>) -> ModelResult<()> {
    match values {
        None | Some(Value::Undefined) | Some(Value::Null) => Ok(()),
        Some(Value::Object(map)) => {
            for (key, value) in map {
                inst.set(key.as_str(), value.clone())?;
            }
            Ok(())
        }
        Some(Value::Instance(source)) => {
            for key in source.keys()?.iter() {
                inst.set(key.as_str(), source.get(key.as_str())?)?;
            }
            Ok(())
        }
        Some(other) => Err(ModelError::validation(format!(
            "Cannot construct a model from {}",
            other
        ))),
    }
}
