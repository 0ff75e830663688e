//! Action type names derived from type monikers.

use crate::{Path, Seg};

/// Convert a camelCase identifier to SCREAMING_SNAKE_CASE.
///
/// ```
/// use schema_store::naming::snake_case;
///
/// assert_eq!(snake_case("copyWithin"), "COPY_WITHIN");
/// assert_eq!(snake_case("Todo"), "TODO");
/// assert_eq!(snake_case("todoList"), "TODO_LIST");
/// ```
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_uppercase() && !out.is_empty() {
            out.push('_');
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            out.extend(c.to_uppercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out
}

fn segment_name(seg: &Seg) -> String {
    match seg {
        Seg::Key(k) if k == "*" => "ITEM".to_string(),
        Seg::Key(k) => snake_case(k),
        Seg::Index(i) => i.to_string(),
    }
}

/// The snake-cased name of a type moniker; empty for the root.
pub fn type_snake(moniker: &Path) -> String {
    moniker
        .iter()
        .map(segment_name)
        .collect::<Vec<_>>()
        .join("_")
}

fn prefixed(type_snake: &str, suffix: &str) -> String {
    if type_snake.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{}", type_snake, suffix)
    }
}

/// `SET_<TYPE>` for a property write resolved to `moniker`.
pub fn set_action_type(moniker: &Path) -> String {
    let snake = type_snake(moniker);
    if snake.is_empty() {
        "SET_ROOT".to_string()
    } else {
        format!("SET_{}", snake)
    }
}

/// `<TYPE>_<METHOD>` for a method call.
pub fn method_action_type(type_snake: &str, method: &str) -> String {
    prefixed(type_snake, &snake_case(method))
}

/// `<TYPE>_SET_<VIRTUAL>` for a virtual setter.
pub fn virtual_action_type(type_snake: &str, name: &str) -> String {
    prefixed(type_snake, &format!("SET_{}", snake_case(name)))
}
