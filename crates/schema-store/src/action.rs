//! Actions: serializable descriptions of a single state change.
//!
//! Every write a store performs, whether a property assignment, a method call
//! or a virtual setter, reaches the dispatcher as one [`Action`]. Replaying the
//! same actions against the same initial state yields the same states.

use crate::{Data, Path, Value};
use serde::Serialize;

/// Prefix of action types that a store's reducer passes through untouched.
pub const PASSTHROUGH_PREFIX: &str = "@@";

/// The payload of a property write.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionValue {
    /// Already-packed data written at the action path.
    Packed(Data),
    /// An external value handed to a virtual setter.
    Raw(Value),
}

/// A single dispatched state change.
///
/// # Examples
///
/// ```
/// use schema_store::{path, Action, Value};
///
/// let action = Action::call("TODO_TOGGLE", path!("todos", "abc", "toggle"), vec![]);
/// assert_eq!(action.action_type, "TODO_TOGGLE");
/// assert!(action.args.is_some());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    /// Action type, e.g. `SET_TODO_TEXT` or `ITEMS_PUSH`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Instance path of the target property or method.
    pub path: Path,
    /// Method arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// Written value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ActionValue>,
}

impl Action {
    /// Create a property write carrying packed data.
    #[inline]
    pub fn set(action_type: impl Into<String>, path: Path, value: Data) -> Self {
        Self {
            action_type: action_type.into(),
            path,
            args: None,
            value: Some(ActionValue::Packed(value)),
        }
    }

    /// Create a method invocation.
    #[inline]
    pub fn call(action_type: impl Into<String>, path: Path, args: Vec<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            path,
            args: Some(args),
            value: None,
        }
    }

    /// Create a virtual-setter invocation.
    #[inline]
    pub fn assign(action_type: impl Into<String>, path: Path, value: Value) -> Self {
        Self {
            action_type: action_type.into(),
            path,
            args: None,
            value: Some(ActionValue::Raw(value)),
        }
    }

    /// The initialization action sent when a dispatcher starts.
    #[inline]
    pub fn init() -> Self {
        Self {
            action_type: format!("{}INIT", PASSTHROUGH_PREFIX),
            path: Path::root(),
            args: None,
            value: None,
        }
    }

    /// Whether reducers should return the state unchanged.
    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.action_type.starts_with(PASSTHROUGH_PREFIX)
    }

    /// Operation kind name, for logging.
    pub fn kind(&self) -> &'static str {
        match (&self.args, &self.value) {
            (Some(_), _) => "call",
            (None, Some(ActionValue::Packed(_))) => "set",
            (None, Some(ActionValue::Raw(_))) => "assign",
            (None, None) => "init",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_action_serde_shape() {
        let action = Action::set("SET_TODO_TEXT", path!("todos", "abc", "text"), Data::from("hi"));
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "SET_TODO_TEXT", "path": ["todos", "abc", "text"], "value": "hi"})
        );

        let action = Action::call("ITEMS_PUSH", path!("items", "push"), vec![Value::from(6)]);
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "ITEMS_PUSH", "path": ["items", "push"], "args": [6]})
        );
    }

    #[test]
    fn test_action_kinds() {
        assert_eq!(Action::init().kind(), "init");
        assert!(Action::init().is_passthrough());
        assert_eq!(Action::assign("SET_X", path!("x"), Value::Null).kind(), "assign");
        assert!(!Action::call("X", path!("x"), vec![]).is_passthrough());
    }
}
