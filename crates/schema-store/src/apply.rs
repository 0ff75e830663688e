//! Structural-sharing writes into the state tree.
//!
//! [`set_at_path`] is a pure function: it never mutates its input, and every
//! subtree not on the written path is shared with the previous state.

use crate::{Data, ModelError, ModelResult, Path, Seg};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Write `value` at `path` inside `state` and return the new root.
///
/// Intermediate objects are created as needed. Writing `Undefined` under an
/// object key removes the key. Writing an array index equal to the length
/// appends; writing past the end pads the gap with `Undefined`. When the value
/// at `path` is already [`same`](Data::same) as `value`, the original root is
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use schema_store::{set_at_path, path, Data};
/// use serde_json::json;
///
/// let state = Data::from(json!({"a": {"x": 1}, "b": {"y": 2}}));
/// let next = set_at_path(&state, &path!("a", "x"), Data::from(5.0)).unwrap();
///
/// assert_eq!(next.get_path(&path!("a", "x")), Data::from(5.0));
/// // Untouched siblings are shared.
/// assert!(next.get_path(&path!("b")).same(&state.get_path(&path!("b"))));
/// ```
pub fn set_at_path(state: &Data, path: &Path, value: Data) -> ModelResult<Data> {
    update(state, path.segments(), value, path)
}

fn update(current: &Data, segments: &[Seg], value: Data, full_path: &Path) -> ModelResult<Data> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(value);
    };

    let prop = current.child(seg);
    let updated = update(&prop, rest, value, full_path)?;
    if updated.same(&prop) {
        return Ok(current.clone());
    }

    match current {
        Data::Array(items) => {
            if seg.as_key() == Some("length") {
                let len = updated
                    .as_f64()
                    .filter(|n| n.fract() == 0.0 && *n >= 0.0)
                    .ok_or_else(|| {
                        ModelError::invalid_operation(format!(
                            "invalid array length at \"{}\"",
                            full_path
                        ))
                    })? as usize;
                let mut next = items.as_ref().clone();
                next.resize(len, Data::Undefined);
                return Ok(Data::Array(Arc::new(next)));
            }
            let index = seg.as_index().ok_or_else(|| {
                ModelError::invalid_operation(format!(
                    "Property put does not support extra properties on Arrays (\"{}\")",
                    full_path
                ))
            })?;
            let mut next = items.as_ref().clone();
            if index >= next.len() {
                next.resize(index, Data::Undefined);
                next.push(updated);
            } else {
                next[index] = updated;
            }
            Ok(Data::Array(Arc::new(next)))
        }
        _ => {
            let mut next = match current {
                Data::Object(map) => map.as_ref().clone(),
                _ => BTreeMap::new(),
            };
            let key = seg.to_key();
            if updated.is_undefined() {
                next.remove(&key);
            } else {
                next.insert(key, updated);
            }
            Ok(Data::Object(Arc::new(next)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_set_root() {
        let state = Data::from(json!({"a": 1}));
        let next = set_at_path(&state, &Path::root(), Data::from(2.0)).unwrap();
        assert_eq!(next, Data::from(2.0));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let state = Data::empty_object();
        let next = set_at_path(&state, &path!("a", "b", "c"), Data::from(1.0)).unwrap();
        assert_eq!(next.to_json(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_unchanged_write_preserves_identity() {
        let state = Data::from(json!({"a": {"x": 1}}));
        let next = set_at_path(&state, &path!("a", "x"), Data::from(1.0)).unwrap();
        assert!(next.same(&state));
    }

    #[test]
    fn test_siblings_stay_shared() {
        let state = Data::from(json!({"a": {"x": 1}, "b": {"y": [1, 2]}}));
        let next = set_at_path(&state, &path!("a", "x"), Data::from(2.0)).unwrap();
        assert!(!next.same(&state));
        assert!(!next.get_path(&path!("a")).same(&state.get_path(&path!("a"))));
        assert!(next.get_path(&path!("b")).same(&state.get_path(&path!("b"))));
    }

    #[test]
    fn test_undefined_removes_key() {
        let state = Data::from(json!({"a": 1, "b": 2}));
        let next = set_at_path(&state, &path!("a"), Data::Undefined).unwrap();
        assert_eq!(next.to_json(), json!({"b": 2}));
    }

    #[test]
    fn test_array_append_and_pad() {
        let state = Data::from(json!({"list": [1, 2]}));
        let next = set_at_path(&state, &path!("list", 2), Data::from(3.0)).unwrap();
        assert_eq!(next.to_json(), json!({"list": [1, 2, 3]}));

        let padded = set_at_path(&state, &path!("list", 4), Data::from(5.0)).unwrap();
        assert_eq!(padded.to_json(), json!({"list": [1, 2, null, null, 5]}));
    }

    #[test]
    fn test_array_length_write() {
        let state = Data::from(json!([1, 2, 3]));
        let next = set_at_path(&state, &path!("length"), Data::from(1.0)).unwrap();
        assert_eq!(next.to_json(), json!([1]));
    }

    #[test]
    fn test_array_rejects_named_property() {
        let state = Data::from(json!([1, 2, 3]));
        let err = set_at_path(&state, &path!("name"), Data::from("x")).unwrap_err();
        assert!(matches!(err, ModelError::InvalidOperation { .. }));
    }
}
