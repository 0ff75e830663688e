//! Error objects, stored as `{name, message, stack?}` with the stack split
//! into lines.

use super::{TypeCx, TypeHandler, UnpackRequest};
use crate::{Data, ErrorValue, ModelResult, Path, Value};

pub(crate) struct ErrorType;

fn from_data(value: &Data) -> Option<ErrorValue> {
    let map = value.as_object()?;
    let name = map.get("name")?.as_str()?.to_string();
    let message = map.get("message")?.as_str()?.to_string();
    let stack = match map.get("stack") {
        None => None,
        Some(Data::Array(lines)) => Some(
            lines
                .iter()
                .map(|line| line.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?
                .join("\n"),
        ),
        Some(_) => return None,
    };
    Some(ErrorValue {
        name,
        message,
        stack,
    })
}

fn to_data(value: &ErrorValue) -> Data {
    let mut entries = vec![
        ("name".to_string(), Data::string(&value.name)),
        ("message".to_string(), Data::string(&value.message)),
    ];
    if let Some(stack) = &value.stack {
        entries.push((
            "stack".to_string(),
            Data::array(stack.lines().map(Data::from).collect()),
        ));
    }
    Data::object(entries)
}

impl TypeHandler for ErrorType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        match from_data(value) {
            Some(_) => None,
            None => Some(format!("Type of \"{}\" data must be an error record", path)),
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        match value {
            Value::Error(_) => None,
            _ => Some(format!("Type of \"{}\" must be Error", path)),
        }
    }

    fn pack(&self, _cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        match value {
            Value::Error(err) => Ok(to_data(err)),
            other => Ok(to_data(&ErrorValue::new("Error", other.to_string()))),
        }
    }

    fn unpack(&self, _cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        let data = req.store.get(&req.store_path)?;
        Ok(from_data(&data).map(Value::Error).unwrap_or_default())
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        to_data(&ErrorValue::new("Error", ""))
    }
}
