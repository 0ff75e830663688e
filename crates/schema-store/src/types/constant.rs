//! Constant types: a single number, string or boolean.

use super::{BasicKind, TypeCx, TypeHandler, UnpackRequest};
use crate::{Data, ModelResult, Path, Value};

pub(crate) struct ConstantType {
    value: Data,
    base: BasicKind,
}

impl ConstantType {
    pub fn new(value: Data, base: BasicKind) -> Self {
        Self { value, base }
    }

    fn display(&self) -> String {
        Value::from(&self.value).to_string()
    }
}

impl TypeHandler for ConstantType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        if value == &self.value {
            None
        } else {
            Some(format!(
                "Data for \"{}\" must be \"{}\"",
                path,
                self.display()
            ))
        }
    }

    fn coerce_data(&self, _cx: TypeCx<'_>, _value: &Data, _path: &Path) -> Data {
        self.value.clone()
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        if !self.base.matches_value(value) {
            return Some(format!("Type of \"{}\" must be {}", path, self.base.kind()));
        }
        if value.to_data().ok().as_ref() == Some(&self.value) {
            None
        } else {
            Some(format!(
                "Value of \"{}\" must be \"{}\"",
                path,
                self.display()
            ))
        }
    }

    fn pack(&self, _cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        value.to_data()
    }

    fn unpack(&self, _cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        Ok(Value::from(&req.store.get(&req.store_path)?))
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        self.value.clone()
    }
}
