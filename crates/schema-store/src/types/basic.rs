//! Scalar types: string, number, boolean, null and undefined.

use super::{Kind, TypeCx, TypeHandler, UnpackRequest};
use crate::{Data, ModelError, ModelResult, Path, StorageKind, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BasicKind {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
}

impl BasicKind {
    pub fn kind(self) -> Kind {
        match self {
            BasicKind::String => Kind::String,
            BasicKind::Number => Kind::Number,
            BasicKind::Boolean => Kind::Boolean,
            BasicKind::Null => Kind::Null,
            BasicKind::Undefined => Kind::Undefined,
        }
    }

    pub fn storage_kind(self) -> StorageKind {
        match self {
            BasicKind::String => StorageKind::String,
            BasicKind::Number => StorageKind::Number,
            BasicKind::Boolean => StorageKind::Boolean,
            BasicKind::Null => StorageKind::Null,
            BasicKind::Undefined => StorageKind::Undefined,
        }
    }

    pub fn of_json(value: &serde_json::Value) -> Option<BasicKind> {
        match value {
            serde_json::Value::String(_) => Some(BasicKind::String),
            serde_json::Value::Number(_) => Some(BasicKind::Number),
            serde_json::Value::Bool(_) => Some(BasicKind::Boolean),
            _ => None,
        }
    }

    pub fn matches_value(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (BasicKind::String, Value::String(_))
                | (BasicKind::Number, Value::Number(_))
                | (BasicKind::Boolean, Value::Bool(_))
                | (BasicKind::Null, Value::Null)
                | (BasicKind::Undefined, Value::Undefined)
        )
    }

    pub fn default_data(self) -> Data {
        match self {
            BasicKind::String => Data::string(""),
            BasicKind::Number => Data::Number(0.0),
            BasicKind::Boolean => Data::Bool(false),
            BasicKind::Null => Data::Null,
            BasicKind::Undefined => Data::Undefined,
        }
    }
}

pub(crate) struct BasicType {
    kind: BasicKind,
}

impl BasicType {
    pub fn new(kind: BasicKind) -> Self {
        Self { kind }
    }
}

impl TypeHandler for BasicType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        if value.storage_kind() == self.kind.storage_kind() {
            None
        } else {
            Some(format!(
                "Type of \"{}\" data must be {}",
                path,
                self.kind.kind()
            ))
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        if self.kind.matches_value(value) {
            None
        } else {
            Some(format!("Type of \"{}\" must be {}", path, self.kind.kind()))
        }
    }

    fn pack(&self, _cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        value.to_data()
    }

    fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        if req.current.is_some() {
            return Err(ModelError::invalid_operation(format!(
                "{} types cannot modify a data instance",
                cx.desc.kind
            )));
        }
        Ok(Value::from(&req.store.get(&req.store_path)?))
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        self.kind.default_data()
    }
}
