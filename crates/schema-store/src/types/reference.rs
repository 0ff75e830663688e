//! References to models held in an enclosing set of collections.
//!
//! The stored data is the target's id. Reading walks up the owner chain to
//! the nearest collections object that holds the target model and looks the
//! id up there.

use super::{Role, TypeCx, TypeHandler, UnpackRequest};
use crate::{Data, Instance, ModelError, ModelResult, Path, Value};

const UNKNOWN_ID: &str = "<unknown>";

pub(crate) struct ReferenceType {
    target: String,
}

impl ReferenceType {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// The target collection under the nearest collections ancestor.
    fn find_collection(&self, owner: Option<&Instance>) -> ModelResult<Option<Instance>> {
        let mut ancestor = owner.cloned();
        while let Some(current) = ancestor {
            let key = current.type_descriptor(|desc| match desc.role() {
                Role::Collections(info) => info
                    .by_model
                    .get(&self.target)
                    .cloned()
                    .or_else(|| {
                        info.by_model
                            .values()
                            .find(|key| **key == self.target)
                            .cloned()
                    }),
                _ => None,
            })?;
            if let Some(key) = key {
                if let Value::Instance(collection) = current.get(key.as_str())? {
                    return Ok(Some(collection));
                }
            }
            ancestor = current.owner();
        }
        Ok(None)
    }
}

impl TypeHandler for ReferenceType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        match value.as_str() {
            Some("") => Some("Reference cannot be empty".to_string()),
            Some(_) => None,
            None => Some(format!("Reference data for \"{}\" must be a string", path)),
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        let is_model = value
            .as_instance()
            .and_then(|inst| inst.type_descriptor(|desc| desc.model_info().is_some()).ok())
            .unwrap_or(false);
        if is_model {
            None
        } else {
            Some(format!(
                "Reference for \"{}\" must be an object of type \"{}\"",
                path, self.target
            ))
        }
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        let not_a_model = || {
            ModelError::validation(format!(
                "Reference for \"{}\" must be an object of type \"{}\"",
                cx.moniker(),
                self.target
            ))
        };
        let inst = value.as_instance().ok_or_else(not_a_model)?;
        let id_key = inst
            .type_descriptor(|desc| desc.model_info().map(|info| info.id_key.clone()))?
            .ok_or_else(not_a_model)?;
        inst.get(id_key.as_str())?.to_data()
    }

    fn unpack(&self, _cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        let id = req.store.get(&req.store_path)?;
        let id = match id.as_str() {
            Some(id) if !id.is_empty() && id != UNKNOWN_ID => id.to_string(),
            _ => {
                return Err(ModelError::reference(format!(
                    "Cannot dereference: No \"{}\" id present",
                    self.target
                )))
            }
        };
        let collection = self.find_collection(req.owner)?.ok_or_else(|| {
            ModelError::missing_collection(format!(
                "Cannot find collection of type \"{}\"",
                self.target
            ))
        })?;
        match collection.get(id.as_str())? {
            Value::Undefined => Err(ModelError::reference(format!(
                "Cannot dereference: No \"{}\" with id \"{}\" exists",
                self.target, id
            ))),
            found => Ok(found),
        }
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        Data::string(UNKNOWN_ID)
    }
}
