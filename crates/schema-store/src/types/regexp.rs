//! Regular expressions, stored as `{pattern, flags, lastIndex?}`.

use super::{TypeCx, TypeHandler, UnpackRequest};
use crate::{Data, ModelResult, Path, RegExpValue, Value};

pub(crate) struct RegExpType;

fn from_data(value: &Data) -> Option<RegExpValue> {
    let map = value.as_object()?;
    if map
        .keys()
        .any(|k| !matches!(k.as_str(), "pattern" | "flags" | "lastIndex"))
    {
        return None;
    }
    let source = map.get("pattern")?.as_str()?;
    let flags = map.get("flags")?.as_str()?;
    let last_index = match map.get("lastIndex") {
        None => 0,
        Some(Data::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => *n as usize,
        Some(_) => return None,
    };
    let value = RegExpValue {
        source: source.to_string(),
        flags: flags.to_string(),
        last_index,
    };
    value.compile().ok()?;
    Some(value)
}

fn to_data(value: &RegExpValue) -> Data {
    let mut entries = vec![
        ("pattern".to_string(), Data::string(&value.source)),
        ("flags".to_string(), Data::string(&value.flags)),
    ];
    if value.last_index > 0 {
        entries.push(("lastIndex".to_string(), Data::Number(value.last_index as f64)));
    }
    Data::object(entries)
}

impl TypeHandler for RegExpType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        match from_data(value) {
            Some(_) => None,
            None => Some(format!(
                "Type of \"{}\" data must be a regular expression record",
                path
            )),
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        match value {
            Value::RegExp(_) => None,
            _ => Some(format!("Type of \"{}\" must be RegExp", path)),
        }
    }

    fn pack(&self, _cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        match value {
            Value::RegExp(re) => Ok(to_data(re)),
            other => Ok(Data::object(vec![
                ("pattern".to_string(), Data::string(other.to_string())),
                ("flags".to_string(), Data::string("")),
            ])),
        }
    }

    fn unpack(&self, _cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        let data = req.store.get(&req.store_path)?;
        Ok(from_data(&data).map(Value::RegExp).unwrap_or_default())
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        to_data(&RegExpValue {
            source: "(?:)".to_string(),
            flags: String::new(),
            last_index: 0,
        })
    }
}
