//! Integration tests for stores over plain shapes, arrays, tuples and unions.
//!
//! These tests drive the public API the way an application would: compile a
//! schema, connect a local dispatcher, then read and write through instances
//! while checking the dispatched actions and the resulting state.

use schema_store::{
    path, set_at_path, shape, tuple, union, Data, Dispatcher, Instance, LocalDispatcher,
    MethodDescriptor, ModelError, Schema, Store, StoreOptions, Value, VirtualDescriptor,
};
use serde_json::json;
use std::sync::Arc;

fn store_for(schema: impl Into<Schema>) -> (Store, Arc<LocalDispatcher>) {
    Store::with_local_dispatcher(schema, StoreOptions::default()).unwrap()
}

fn numbers(values: &[i64]) -> Value {
    Value::Array(values.iter().map(|n| Value::from(*n)).collect())
}

// ============================================================================
// Property writes
// ============================================================================

#[test]
fn test_property_write_dispatches_set_action() {
    let (store, dispatcher) = store_for(json!({"title": "String", "count": "Number"}));
    let root = store.root().unwrap();

    root.set("title", "groceries").unwrap();

    let history = dispatcher.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action_type, "SET_TITLE");
    assert_eq!(history[0].path, path!("title"));
    assert_eq!(root.get("title").unwrap(), Value::from("groceries"));
    assert_eq!(
        store.state().unwrap().to_json(),
        json!({"title": "groceries", "count": 0})
    );
}

#[test]
fn test_invalid_write_rejected_without_action() {
    let (store, dispatcher) = store_for(json!({"count": "Number"}));
    let root = store.root().unwrap();

    let err = root.set("count", "seven").unwrap_err();
    assert!(matches!(err, ModelError::Validation { .. }));
    assert_eq!(dispatcher.history_len(), 0);

    let err = root.set("missing", 1).unwrap_err();
    assert!(err.is_type_error());
}

#[test]
fn test_nested_write_names_action_after_type() {
    let (store, dispatcher) = store_for(json!({"user": {"profile": {"bio": "String"}}}));
    let profile = store
        .root()
        .unwrap()
        .child("user")
        .unwrap()
        .child("profile")
        .unwrap();

    profile.set("bio", "hello").unwrap();

    assert_eq!(dispatcher.history()[0].action_type, "SET_USER_PROFILE_BIO");
    assert_eq!(profile.store_path(), path!("user", "profile"));
}

#[test]
fn test_sibling_instances_keep_identity() {
    let (store, _) = store_for(json!({"a": {"x": "Number"}, "b": {"x": "Number"}}));
    let root = store.root().unwrap();
    let a = root.child("a").unwrap();
    let b = root.child("b").unwrap();

    assert!(a.ptr_eq(&root.child("a").unwrap()));
    assert!(!a.ptr_eq(&b));

    root.set("b", Value::from(json!({"x": 1}))).unwrap();
    assert!(a.ptr_eq(&root.child("a").unwrap()));
    // Untouched subtrees are shared between states.
    assert_eq!(b.get("x").unwrap(), Value::from(1));
}

#[test]
fn test_assign_instance_copies_state() {
    let (store, _) = store_for(json!({"a": {"x": "Number"}, "b": {"x": "Number"}}));
    let root = store.root().unwrap();
    root.child("a").unwrap().set("x", 4).unwrap();

    let a = root.get("a").unwrap();
    root.set("b", a).unwrap();

    assert_eq!(store.peek(&path!("b", "x")).unwrap(), Data::from(4.0));
}

// ============================================================================
// Arrays
// ============================================================================

#[test]
fn test_array_reads_do_not_dispatch() {
    let (store, dispatcher) = store_for(json!({"items": ["Number"]}));
    let root = store.root().unwrap();
    root.set("items", numbers(&[1, 2, 3, 4, 5])).unwrap();
    let items = root.child("items").unwrap();

    let doubled = items
        .map(|value, _| Ok(value.as_f64().unwrap_or(0.0) * 2.0))
        .unwrap();

    assert_eq!(doubled, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
    assert_eq!(items.len().unwrap(), 5);
    assert_eq!(items.join("-").unwrap(), "1-2-3-4-5");
    assert_eq!(items.index_of(&Value::from(3)).unwrap(), Some(2));
    assert_eq!(dispatcher.history_len(), 1);
}

#[test]
fn test_array_push_is_one_action() {
    let (store, dispatcher) = store_for(json!({"items": ["Number"]}));
    let root = store.root().unwrap();
    root.set("items", numbers(&[1, 2, 3, 4, 5])).unwrap();
    let items = root.child("items").unwrap();

    let len = items.push(vec![Value::from(6)]).unwrap();

    assert_eq!(len, 6);
    let history = dispatcher.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action_type, "ITEMS_PUSH");
    assert_eq!(history[1].path, path!("items", "push"));
    assert_eq!(history[1].args, Some(vec![Value::from(6)]));
    assert_eq!(
        store.peek(&path!("items")).unwrap().to_json(),
        json!([1, 2, 3, 4, 5, 6])
    );
}

#[test]
fn test_untyped_array_splice() {
    let (store, dispatcher) = store_for(json!({"items": []}));
    let root = store.root().unwrap();
    root.set("items", numbers(&[1, 2, 3, 4, 5])).unwrap();
    let items = root.child("items").unwrap();

    let removed = items
        .splice(
            1,
            Some(2),
            vec![Value::from("a"), Value::from("b"), Value::from("c")],
        )
        .unwrap();

    assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
    assert_eq!(
        items.to_json().unwrap(),
        json!([1, "a", "b", "c", 4, 5])
    );
    assert_eq!(dispatcher.history()[1].action_type, "ITEMS_SPLICE");
}

#[test]
fn test_typed_array_rejects_wrong_items() {
    let (store, dispatcher) = store_for(json!({"items": ["Number"]}));
    let items = store.root().unwrap().child("items").unwrap();

    assert!(items.push(vec![Value::from("x")]).is_err());
    assert!(items.push(vec![Value::from(1)]).is_ok());
    assert_eq!(store.peek(&path!("items")).unwrap().to_json(), json!([1]));
    assert_eq!(dispatcher.history_len(), 1);
}

#[test]
fn test_sort_by_dispatches_permutation() {
    let (store, dispatcher) = store_for(json!({"items": ["Number"]}));
    let root = store.root().unwrap();
    root.set("items", numbers(&[3, 1, 2])).unwrap();
    let items = root.child("items").unwrap();

    items
        .sort_by(|a, b| {
            a.as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap();

    assert_eq!(items.to_json().unwrap(), json!([1, 2, 3]));
    let history = dispatcher.history();
    assert_eq!(history[1].action_type, "ITEMS_SORT");
    assert_eq!(history[1].args, Some(vec![numbers(&[1, 2, 0])]));
}

#[test]
fn test_length_virtual() {
    let (store, _) = store_for(json!({"items": ["Number"]}));
    let root = store.root().unwrap();
    root.set("items", numbers(&[1, 2, 3])).unwrap();
    let items = root.child("items").unwrap();

    assert_eq!(items.get("length").unwrap(), Value::from(3));
    items.set_len(1).unwrap();
    assert_eq!(items.to_json().unwrap(), json!([1]));
}

// ============================================================================
// Tuples
// ============================================================================

#[test]
fn test_tuple_arity_is_fixed() {
    let (store, dispatcher) =
        store_for(shape().prop("pair", tuple(vec![Schema::Number, Schema::String])));
    let root = store.root().unwrap();
    assert_eq!(store.peek(&path!("pair")).unwrap().to_json(), json!([0, ""]));

    let err = root
        .set("pair", Value::from(json!([1, "a", 2])))
        .unwrap_err();
    assert!(err.to_string().contains("must have 2 items"));

    let pair = root.child("pair").unwrap();
    assert!(pair.push(vec![Value::from(1)]).is_err());
    assert!(pair.splice(0, Some(1), vec![]).is_err());
    assert_eq!(dispatcher.history_len(), 0);
    assert_eq!(pair.to_json().unwrap(), json!([0, ""]));

    pair.set(1, "b").unwrap();
    assert_eq!(pair.to_json().unwrap(), json!([0, "b"]));
}

// ============================================================================
// Unions
// ============================================================================

#[test]
fn test_simple_union_stores_plain_data() {
    let (store, _) = store_for(
        shape().prop("value", union(vec![Schema::Number, Schema::String])),
    );
    let root = store.root().unwrap();

    root.set("value", "text").unwrap();
    assert_eq!(store.peek(&path!("value")).unwrap(), Data::from("text"));
    root.set("value", 3).unwrap();
    assert_eq!(root.get("value").unwrap(), Value::from(3));
    assert!(root.set("value", true).is_err());
}

#[test]
fn test_complex_union_stores_discriminant() {
    let (store, _) = store_for(shape().prop(
        "shape",
        union(vec![
            shape().prop("a", Schema::Number).into(),
            shape().prop("b", Schema::String).into(),
        ]),
    ));
    let root = store.root().unwrap();
    assert_eq!(
        store.peek(&path!("shape")).unwrap().to_json(),
        json!({"object1": {"a": 0}})
    );

    root.set("shape", Value::from(json!({"b": "x"}))).unwrap();

    assert_eq!(
        store.peek(&path!("shape")).unwrap().to_json(),
        json!({"object2": {"b": "x"}})
    );
    let member = root.child("shape").unwrap();
    assert_eq!(member.store_path(), path!("shape", "object2"));
    assert_eq!(member.instance_path(), path!("shape"));
    assert_eq!(member.get("b").unwrap(), Value::from("x"));
}

// ============================================================================
// Methods and virtual properties
// ============================================================================

fn person() -> Schema {
    shape()
        .prop("first", Schema::String)
        .prop("last", Schema::String)
        .virtual_prop(
            "full",
            VirtualDescriptor::getter(|inst| {
                Ok(Value::from(format!(
                    "{} {}",
                    inst.get("first")?,
                    inst.get("last")?
                )))
            })
            .with_setter(|inst, value| {
                let text = value.to_string();
                let mut parts = text.splitn(2, ' ');
                inst.set("first", parts.next().unwrap_or(""))?;
                inst.set("last", parts.next().unwrap_or(""))?;
                Ok(())
            }),
        )
        .into()
}

#[test]
fn test_virtual_setter_is_one_action() {
    let (store, dispatcher) = store_for(person());
    let root = store.root().unwrap();

    root.set("full", "Ada Lovelace").unwrap();

    let history = dispatcher.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action_type, "SET_FULL");
    assert_eq!(history[0].kind(), "assign");
    assert_eq!(root.get("last").unwrap(), Value::from("Lovelace"));
    assert_eq!(root.get("full").unwrap(), Value::from("Ada Lovelace"));
}

#[test]
fn test_reducer_method_returns_result() {
    let counter = shape()
        .prop("count", Schema::Number)
        .method(MethodDescriptor::reducer(
            "increment",
            |_inst, state, args, result| {
                let by = args.first().and_then(Value::as_f64).unwrap_or(1.0);
                let count = state.get_path(&path!("count")).as_f64().unwrap_or(0.0) + by;
                result.set(count);
                set_at_path(state, &path!("count"), Data::from(count))
            },
        ));
    let (store, dispatcher) = store_for(counter);
    let root = store.root().unwrap();

    assert_eq!(root.call("increment", vec![Value::from(2)]).unwrap(), Value::from(2));
    assert_eq!(root.call("increment", vec![]).unwrap(), Value::from(3));

    let history = dispatcher.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action_type, "INCREMENT");
    assert!(root.call("decrement", vec![]).is_err());
}

#[test]
fn test_method_writes_fold_into_one_action() {
    let pair = shape()
        .prop("a", Schema::Number)
        .prop("b", Schema::Number)
        .method(MethodDescriptor::new("swap", |inst: &Instance, _args: &[Value]| {
            let a = inst.get("a")?;
            let b = inst.get("b")?;
            inst.set("a", b)?;
            inst.set("b", a)?;
            Ok(Value::Undefined)
        }));
    let (store, dispatcher) = store_for(pair);
    let root = store.root().unwrap();
    root.set("a", 1).unwrap();

    root.call("swap", vec![]).unwrap();

    assert_eq!(dispatcher.history_len(), 2);
    assert_eq!(store.state().unwrap().to_json(), json!({"a": 0, "b": 1}));
}

// ============================================================================
// Recording
// ============================================================================

#[test]
fn test_trace_detects_relevant_changes() {
    let (store, _) = store_for(json!({"a": "Number", "b": "Number"}));
    let root = store.root().unwrap();

    let (value, snapshot) = store.trace(|| root.get("a")).unwrap();
    assert_eq!(value.unwrap(), Value::from(0));
    assert!(snapshot.reads().children()["a"].is_check());

    root.set("b", 2).unwrap();
    assert!(store.same_recorded_state(&snapshot).unwrap());

    root.set("a", 5).unwrap();
    assert!(!store.same_recorded_state(&snapshot).unwrap());
}

#[test]
fn test_writes_fail_while_tracing() {
    let (store, dispatcher) = store_for(json!({"a": "Number"}));
    let root = store.root().unwrap();

    let (result, _) = store.trace(|| root.set("a", 1)).unwrap();

    assert!(matches!(result, Err(ModelError::Reentrancy { .. })));
    assert_eq!(dispatcher.history_len(), 0);
    root.set("a", 1).unwrap();
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_rebuilds_each_state() {
    let (store, dispatcher) = store_for(json!({"items": ["Number"]}));
    let items = store.root().unwrap().child("items").unwrap();
    items.push(vec![Value::from(1)]).unwrap();
    items.push(vec![Value::from(2)]).unwrap();
    items.reverse().unwrap();

    assert_eq!(dispatcher.replay_to(0).unwrap().to_json(), json!({"items": [1]}));
    assert_eq!(
        dispatcher.replay_to(2).unwrap().to_json(),
        json!({"items": [2, 1]})
    );
}

#[test]
fn test_history_replays_on_fresh_store() {
    let schema = Schema::from(json!({"title": "String", "tags": ["String"]}));
    let (store, dispatcher) = store_for(schema.clone());
    let root = store.root().unwrap();
    root.set("title", "notes").unwrap();
    root.child("tags")
        .unwrap()
        .push(vec![Value::from("a"), Value::from("b")])
        .unwrap();

    let (replica, replica_dispatcher) = store_for(schema);
    for action in dispatcher.history() {
        replica_dispatcher.dispatch(action).unwrap();
    }

    assert_eq!(replica.state().unwrap(), store.state().unwrap());
}

#[test]
fn test_to_object_expands_instances() {
    let (store, _) = store_for(json!({"user": {"name": "String", "tags": ["String"]}}));
    let root = store.root().unwrap();
    root.set("user", Value::from(json!({"name": "a", "tags": ["x"]})))
        .unwrap();

    let object = root.to_object().unwrap();
    assert_eq!(object.to_json(), json!({"user": {"name": "a", "tags": ["x"]}}));
    assert!(root.inspect().contains("\"name\": \"a\""));
}
