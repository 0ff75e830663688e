//! Integration tests for models, collections and references.

use schema_store::{
    collections, model, optional, path, reference, shape, Data, Dispatcher, IdSource, Instance,
    LocalDispatcher, MethodDescriptor, ModelDef, ModelError, PendingValue, Schema, Store,
    StoreOptions, Value,
};
use serde_json::json;
use std::sync::Arc;

fn todo_model() -> ModelDef {
    model(
        "Todo",
        shape()
            .prop("text", Schema::String)
            .prop("completed", Schema::Boolean)
            .method(MethodDescriptor::new("toggle", |inst: &Instance, _args: &[Value]| {
                let completed = inst.get("completed")?.as_bool().unwrap_or(false);
                inst.set("completed", !completed)?;
                Ok(Value::Undefined)
            })),
    )
}

fn open(schema: impl Into<Schema>, prefix: &str) -> (Store, Arc<LocalDispatcher>) {
    let options = StoreOptions::default().with_id_source(IdSource::sequential(prefix));
    Store::with_local_dispatcher(schema, options).unwrap()
}

fn todo_store() -> (Store, Arc<LocalDispatcher>, Instance) {
    let (store, dispatcher) = open(collections(vec![todo_model()]), "t");
    let todos = store.root().unwrap().child("todo").unwrap();
    (store, dispatcher, todos)
}

// ============================================================================
// Collections
// ============================================================================

#[test]
fn test_create_is_one_constructor_action() {
    let (store, dispatcher, todos) = todo_store();

    let todo = todos.create(json!({"text": "x"})).unwrap();

    assert_eq!(todo.get("completed").unwrap(), Value::from(false));
    assert_eq!(todo.get("text").unwrap(), Value::from("x"));
    assert_eq!(todos.all().unwrap().len(), 1);
    assert_eq!(
        store.peek(&path!("todo", "t0")).unwrap().to_json(),
        json!({"id": "t0", "text": "x", "completed": false})
    );

    let history = dispatcher.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action_type, "TODO_CONSTRUCTOR");
    assert_eq!(history[0].path, path!("todo", "t0", "constructor"));
}

#[test]
fn test_created_model_is_cached_child() {
    let (_, _, todos) = todo_store();

    let todo = todos.create(json!({"text": "x"})).unwrap();

    assert!(todo.ptr_eq(&todos.child("t0").unwrap()));
    assert_eq!(todo.type_name().unwrap(), "Todo");
    assert_eq!(todo.store_path(), path!("todo", "t0"));
}

#[test]
fn test_model_method_targets_record() {
    let (_, dispatcher, todos) = todo_store();
    let todo = todos.create(json!({"text": "x"})).unwrap();

    todo.call("toggle", vec![]).unwrap();

    assert_eq!(todo.get("completed").unwrap(), Value::from(true));
    let history = dispatcher.history();
    assert_eq!(history[1].action_type, "TODO_TOGGLE");
    assert_eq!(history[1].path, path!("todo", "t0", "toggle"));
}

#[test]
fn test_remove_by_id_and_instance() {
    let (_, dispatcher, todos) = todo_store();
    let first = todos.create(json!({"text": "a"})).unwrap();
    todos.create(json!({"text": "b"})).unwrap();

    todos.remove("t1").unwrap();
    assert_eq!(todos.keys().unwrap().as_slice(), ["t0".to_string()]);

    todos.remove(first).unwrap();
    assert!(todos.all().unwrap().is_empty());
    assert_eq!(dispatcher.history()[3].action_type, "TODO_REMOVE");

    let err = todos.remove("t0").unwrap_err();
    assert!(err.to_string().contains("object not found"));
}

#[test]
fn test_collection_virtuals_are_read_only() {
    let (_, _, todos) = todo_store();

    assert_eq!(todos.get("model").unwrap(), Value::from("Todo"));
    let err = todos.set("model", "Other").unwrap_err();
    assert!(matches!(err, ModelError::InvalidOperation { .. }));
}

#[test]
fn test_user_constructor_runs_after_defaults() {
    let note = model(
        "Note",
        shape()
            .prop("title", Schema::String)
            .prop("slug", Schema::String)
            .constructor(|inst, args| {
                let title = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                inst.set("slug", title.to_lowercase().replace(' ', "-"))?;
                inst.set("title", title)?;
                Ok(Value::Undefined)
            }),
    );
    let (store, dispatcher) = open(collections(vec![note]), "n");
    let notes = store.root().unwrap().child("note").unwrap();

    let created = notes.create("Hello World").unwrap();

    assert_eq!(created.get("slug").unwrap(), Value::from("hello-world"));
    assert_eq!(created.get("id").unwrap(), Value::from("n0"));
    assert_eq!(dispatcher.history_len(), 1);
}

#[test]
fn test_replay_reproduces_generated_ids() {
    let schema = collections(vec![todo_model()]);
    let (store, dispatcher) = open(schema.clone(), "t");
    let todos = store.root().unwrap().child("todo").unwrap();
    todos.create(json!({"text": "a"})).unwrap().call("toggle", vec![]).unwrap();
    todos.create(json!({"text": "b"})).unwrap();

    let (replica, replica_dispatcher) = open(schema, "other");
    for action in dispatcher.history() {
        replica_dispatcher.dispatch(action).unwrap();
    }

    assert_eq!(replica.state().unwrap(), store.state().unwrap());
    assert_eq!(
        dispatcher.replay_to(0).unwrap().get_path(&path!("todo")).keys(),
        vec!["t0".to_string()]
    );
}

#[test]
fn test_keys_read_ignores_record_content() {
    let (store, _, todos) = todo_store();
    let todo = todos.create(json!({"text": "a"})).unwrap();

    let (count, snapshot) = store.trace(|| todos.all().map(|all| all.len())).unwrap();
    assert_eq!(count.unwrap(), 1);

    todo.set("text", "changed").unwrap();
    assert!(store.same_recorded_state(&snapshot).unwrap());

    todos.create(json!({"text": "b"})).unwrap();
    assert!(!store.same_recorded_state(&snapshot).unwrap());
}

// ============================================================================
// Model ids
// ============================================================================

#[test]
fn test_coerce_repairs_model_id() {
    let (store, _, _) = todo_store();

    store
        .coerce_state(&Data::from(json!({
            "todo": {"abc": {"id": "zzz", "text": "x", "completed": false}}
        })))
        .unwrap();

    assert_eq!(
        store.peek(&path!("todo", "abc", "id")).unwrap(),
        Data::from("abc")
    );
}

#[test]
fn test_id_property_must_be_object_id() {
    let bad = model("Bad", json!({"id": "Number"}));
    let err = Store::new(collections(vec![bad]), StoreOptions::default()).unwrap_err();
    assert!(matches!(err, ModelError::Schema { .. }));
}

#[test]
fn test_duplicate_models_rejected() {
    let err = Store::new(
        collections(vec![todo_model(), todo_model()]),
        StoreOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("declared more than once"));
}

// ============================================================================
// References
// ============================================================================

fn blog() -> Schema {
    collections(vec![
        model("User", json!({"name": "String"})),
        model(
            "Post",
            shape()
                .prop("title", Schema::String)
                .prop("author", reference("User")),
        ),
    ])
}

#[test]
fn test_reference_resolves_through_collections() {
    let (store, _) = open(blog(), "id");
    let root = store.root().unwrap();
    let users = root.child("user").unwrap();
    let posts = root.child("post").unwrap();
    let alice = users.create(json!({"name": "Alice"})).unwrap();
    let post = posts.create(json!({"title": "Hi"})).unwrap();

    let err = post.get("author").unwrap_err();
    assert!(err.is_reference_error());

    post.set("author", alice.clone()).unwrap();

    assert_eq!(
        store.peek(&path!("post", "id1", "author")).unwrap(),
        Data::from("id0")
    );
    let author = post.child("author").unwrap();
    assert!(author.ptr_eq(&alice));
    assert_eq!(author.get("name").unwrap(), Value::from("Alice"));
}

#[test]
fn test_dangling_reference_fails() {
    let (store, _) = open(blog(), "id");
    let root = store.root().unwrap();
    let users = root.child("user").unwrap();
    let alice = users.create(json!({"name": "Alice"})).unwrap();
    let post = root
        .child("post")
        .unwrap()
        .create(json!({"title": "Hi"}))
        .unwrap();
    post.set("author", alice.clone()).unwrap();

    users.remove(alice).unwrap();

    let err = post.get("author").unwrap_err();
    assert!(matches!(err, ModelError::Reference { .. }));
    assert!(err.to_string().contains("with id \"id0\""));
}

#[test]
fn test_reference_rejects_non_models() {
    let (store, _) = open(blog(), "id");
    let post = store
        .root()
        .unwrap()
        .child("post")
        .unwrap()
        .create(json!({"title": "Hi"}))
        .unwrap();

    assert!(post.set("author", "id0").is_err());
}

#[test]
fn test_optional_reference_starts_absent() {
    let schema = collections(vec![
        model("User", json!({"name": "String"})),
        model(
            "Task",
            shape()
                .prop("title", Schema::String)
                .prop("owner", optional(reference("User"))),
        ),
    ]);
    let (store, _) = open(schema, "id");
    let root = store.root().unwrap();
    let task = root.child("task").unwrap().create(Value::Undefined).unwrap();

    assert_eq!(
        store.peek(&path!("task", "id0")).unwrap().to_json(),
        json!({"id": "id0", "title": ""})
    );
    assert_eq!(task.get("owner").unwrap(), Value::Undefined);
    assert_eq!(task.to_json().unwrap(), json!({"id": "id0", "title": ""}));

    let bob = root.child("user").unwrap().create(json!({"name": "Bob"})).unwrap();
    task.set("owner", bob.clone()).unwrap();
    assert!(task.child("owner").unwrap().ptr_eq(&bob));

    task.set("owner", Value::Undefined).unwrap();
    assert_eq!(task.get("owner").unwrap(), Value::Undefined);
    assert!(store.peek(&path!("task", "id0", "owner")).unwrap().is_undefined());
}

#[test]
fn test_reference_without_collection() {
    let schema = shape().prop(
        "post",
        model("Post", shape().prop("author", reference("User"))),
    );
    let (store, _) = open(schema, "id");
    store
        .put(&path!("post", "author"), Data::from("someone"))
        .unwrap();

    let err = store.root().unwrap().child("post").unwrap().get("author").unwrap_err();
    assert!(matches!(err, ModelError::MissingCollection { .. }));
    assert!(err.is_type_error());
}

// ============================================================================
// Auto-resolve
// ============================================================================

#[tokio::test]
async fn test_auto_resolve_waits_for_arguments() {
    let counter = shape().prop("count", Schema::Number).method(
        MethodDescriptor::new("add", |inst: &Instance, args: &[Value]| {
            let by = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            let count = inst.get("count")?.as_f64().unwrap_or(0.0);
            inst.set("count", count + by)?;
            Ok(Value::Undefined)
        })
        .auto_resolve(),
    );
    let (store, dispatcher) = open(counter, "c");
    let root = store.root().unwrap();

    let amount = PendingValue::new(async { Ok::<_, ModelError>(Value::from(5)) });
    let result = root.call("add", vec![Value::Pending(amount)]).unwrap();

    let Value::Pending(pending) = result else {
        panic!("expected a pending result");
    };
    assert_eq!(dispatcher.history_len(), 0);

    pending.await.unwrap();

    assert_eq!(root.get("count").unwrap(), Value::from(5));
    let history = dispatcher.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].args, Some(vec![Value::from(5)]));
}

#[tokio::test]
async fn test_failed_argument_skips_call() {
    let counter = shape().prop("count", Schema::Number).method(
        MethodDescriptor::new("add", |_inst: &Instance, _args: &[Value]| Ok(Value::Undefined))
            .auto_resolve(),
    );
    let (store, dispatcher) = open(counter, "c");

    let failing = PendingValue::ready(Err(ModelError::invalid_operation("offline")));
    let result = store
        .root()
        .unwrap()
        .call("add", vec![Value::Pending(failing)])
        .unwrap();
    let Value::Pending(pending) = result else {
        panic!("expected a pending result");
    };

    assert!(pending.await.is_err());
    assert_eq!(dispatcher.history_len(), 0);
}
