//! Dates, stored as canonical ISO 8601 strings.
//!
//! The empty string stands for an invalid date.

use super::{TypeCx, TypeHandler, UnpackRequest};
use crate::value::format_date;
use crate::{Data, ModelResult, Path, Value};
use chrono::{DateTime, Utc};

pub(crate) struct DateType;

fn parse(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

impl TypeHandler for DateType {
    fn validate_data(&self, _cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        let valid = match value.as_str() {
            Some("") => true,
            Some(text) => parse(text).is_some_and(|date| format_date(date) == text),
            None => false,
        };
        if valid {
            None
        } else {
            Some(format!(
                "Type of \"{}\" data must be a canonical date string",
                path
            ))
        }
    }

    fn coerce_data(&self, _cx: TypeCx<'_>, value: &Data, _path: &Path) -> Data {
        match value {
            Data::String(text) => parse(text)
                .map(|date| Data::string(format_date(date)))
                .unwrap_or_else(|| Data::string("")),
            Data::Number(millis) => DateTime::from_timestamp_millis(*millis as i64)
                .map(|date| Data::string(format_date(date)))
                .unwrap_or_else(|| Data::string("")),
            _ => Data::string(""),
        }
    }

    fn validate_assign(&self, _cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        match value {
            Value::Date(_) => None,
            _ => Some(format!("Type of \"{}\" must be Date", path)),
        }
    }

    fn pack(&self, _cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        Ok(match value {
            Value::Date(Some(date)) => Data::string(format_date(*date)),
            _ => Data::string(""),
        })
    }

    fn unpack(&self, _cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        let data = req.store.get(&req.store_path)?;
        Ok(Value::Date(data.as_str().and_then(parse)))
    }

    fn default_value(&self, _cx: TypeCx<'_>) -> Data {
        Data::string("")
    }
}
