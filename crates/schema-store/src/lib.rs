//! Schema-driven live object graph over an immutable, action-dispatched state tree.
//!
//! `schema-store` compiles a [`Schema`] into typed descriptors and exposes the
//! state it describes as live [`Instance`]s. Instances never hold data: reads
//! go to the store's current state, and every write, whether a property
//! assignment, an array operation, a model constructor or a user method,
//! becomes a serializable [`Action`] reduced by a pure reducer.
//!
//! # Core Concepts
//!
//! - **Schema**: the type definition language, with JSON shorthand
//! - **CompiledSchema**: a flat arena of type descriptors addressed by [`TypeId`]
//! - **Data**: the canonical, structurally shared state tree
//! - **Store**: hydrates instances and turns writes into actions
//! - **Dispatcher**: holds the authoritative state and runs the reducer
//! - **RecordSnapshot**: which parts of the state a computation read
//!
//! # Deterministic State Transitions
//!
//! ```text
//! State' = reduce(State, Action)
//! ```
//!
//! - Replaying the same actions from the same initial state yields the same states
//! - A method call is one action, however many writes its body makes
//! - Unchanged subtrees are shared between consecutive states
//!
//! # Quick Start
//!
//! ```
//! use schema_store::{Store, StoreOptions, Value};
//! use serde_json::json;
//!
//! let (store, dispatcher) = Store::with_local_dispatcher(
//!     json!({"title": "String", "items": ["Number"]}),
//!     StoreOptions::default(),
//! )
//! .unwrap();
//!
//! let root = store.root().unwrap();
//! root.set("title", "groceries").unwrap();
//! let items = root.child("items").unwrap();
//! items.push(vec![Value::from(1), Value::from(2)]).unwrap();
//!
//! assert_eq!(root.to_json().unwrap(), json!({"title": "groceries", "items": [1, 2]}));
//! assert_eq!(dispatcher.history()[1].action_type, "ITEMS_PUSH");
//! ```
//!
//! # Models and Collections
//!
//! ```ignore
//! use schema_store::{collections, model, shape, Schema, Store, StoreOptions};
//!
//! let todo = model("Todo", shape().prop("text", Schema::String).prop("completed", Schema::Boolean));
//! let (store, _) = Store::with_local_dispatcher(collections(vec![todo]), StoreOptions::default())?;
//!
//! let todos = store.root()?.child("todo")?;
//! let first = todos.create(json!({"text": "write docs"}))?;
//! assert_eq!(todos.all()?.len(), 1);
//! ```

mod action;
mod apply;
mod array;
mod data;
mod dispatcher;
mod error;
mod hydrate;
pub mod naming;
mod options;
mod parse;
mod path;
mod record;
mod schema;
mod store;
mod types;
mod value;

// Core types
pub use apply::set_at_path;
pub use data::{Data, StorageKind};
pub use error::{ModelError, ModelResult};
pub use path::{Path, Seg};
pub use value::{ErrorValue, PendingValue, RegExpValue, Value};

// Schema definition
pub use schema::{
    coerce, collection, collections, constant, list, model, optional, reference, shape, tuple,
    union, validate, CheckFn, CoerceFn, Coercion, GetterFn, MethodDescriptor, MethodFn,
    MethodImpl, MethodResult, ModelDef, ReducerFn, Schema, SetterFn, Shape, Validator,
    VirtualDescriptor,
};
pub use types::{
    CollectionInfo, CollectionsInfo, CompiledSchema, Kind, ModelInfo, Role, TypeArena,
    TypeDescriptor, TypeId,
};

// Store types
pub use action::{Action, ActionValue, PASSTHROUGH_PREFIX};
pub use dispatcher::{Dispatcher, LocalDispatcher, Reducer};
pub use hydrate::{Instance, Prototype};
pub use options::{IdSource, StoreOptions, TypeOptions, DEFAULT_MAX_CACHE, ID_LENGTH};
pub use record::{RecordNode, RecordSnapshot};
pub use store::Store;
