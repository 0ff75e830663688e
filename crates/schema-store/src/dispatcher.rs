//! Dispatchers own the authoritative state and route actions to a reducer.
//!
//! A store never mutates state itself. It describes each change as an
//! [`Action`] and hands it to its [`Dispatcher`], which runs the store's
//! [`Reducer`] and keeps the resulting state. [`LocalDispatcher`] is the
//! in-process implementation; it also keeps the action log so any prefix of
//! history can be replayed.

use crate::{Action, Data, ModelError, ModelResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// A pure state transition: `(previous state, action) -> next state`.
///
/// `None` asks for the initial state.
pub type Reducer = Arc<dyn Fn(Option<Data>, &Action) -> ModelResult<Data> + Send + Sync>;

/// The seam between a store and whatever holds its state.
pub trait Dispatcher: Send + Sync {
    /// Reduce an action into the held state.
    fn dispatch(&self, action: Action) -> ModelResult<()>;

    /// The current state.
    fn get_state(&self) -> ModelResult<Data>;
}

/// In-process dispatcher with action history and replay.
///
/// # Example
///
/// ```ignore
/// let (store, dispatcher) = Store::with_local_dispatcher(schema, StoreOptions::default())?;
/// store.root()?.set("count", 1)?;
/// assert_eq!(dispatcher.history_len(), 1);
///
/// // Replay to a specific point
/// let first = dispatcher.replay_to(0)?;
/// ```
pub struct LocalDispatcher {
    reducer: Reducer,
    initial: RwLock<Data>,
    state: RwLock<Data>,
    history: RwLock<Vec<Action>>,
}

impl LocalDispatcher {
    /// Create a dispatcher whose initial state comes from the reducer.
    pub fn new(reducer: Reducer) -> ModelResult<Self> {
        let initial = reducer(None, &Action::init())?;
        Ok(Self::with_state(reducer, initial))
    }

    /// Create a dispatcher starting from an explicit state.
    pub fn with_state(reducer: Reducer, initial: Data) -> Self {
        Self {
            reducer,
            initial: RwLock::new(initial.clone()),
            state: RwLock::new(initial),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Get a snapshot of the current state.
    pub fn snapshot(&self) -> Data {
        self.state.read().clone()
    }

    /// Replay state from the beginning up to (and including) the specified index.
    pub fn replay_to(&self, index: usize) -> ModelResult<Data> {
        let history = self.history.read().clone();
        if index >= history.len() {
            return Err(ModelError::invalid_operation(format!(
                "Invalid replay index: {}, history length: {}",
                index,
                history.len()
            )));
        }

        let mut state = self.initial.read().clone();
        for action in history.iter().take(index + 1) {
            state = (self.reducer)(Some(state), action)?;
        }
        Ok(state)
    }

    /// Get the full action history.
    pub fn history(&self) -> Vec<Action> {
        self.history.read().clone()
    }

    /// Get the number of actions in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Clear history (keeps current state).
    pub fn clear_history(&self) {
        let mut history = self.history.write();
        history.clear();
        *self.initial.write() = self.state.read().clone();
    }

    /// Prune history, keeping only the last `keep_last` actions.
    ///
    /// The initial state moves forward so that `replay_to` keeps working on
    /// the remaining actions. Returns the number of actions removed.
    pub fn prune_history(&self, keep_last: usize) -> ModelResult<usize> {
        let history = self.history.read().clone();
        let len = history.len();
        if len <= keep_last {
            return Ok(0);
        }

        let to_remove = len - keep_last;
        let mut new_initial = self.initial.read().clone();
        for action in history.iter().take(to_remove) {
            new_initial = (self.reducer)(Some(new_initial), action)?;
        }

        *self.initial.write() = new_initial;
        self.history.write().drain(0..to_remove);
        Ok(to_remove)
    }

    /// Get a snapshot of the initial state.
    pub fn initial(&self) -> Data {
        self.initial.read().clone()
    }
}

impl Dispatcher for LocalDispatcher {
    fn dispatch(&self, action: Action) -> ModelResult<()> {
        // The reducer may read state through the store; no lock is held here.
        let current = self.state.read().clone();
        let next = (self.reducer)(Some(current), &action)?;
        debug!(action_type = %action.action_type, path = %action.path, "action reduced");
        *self.state.write() = next;
        self.history.write().push(action);
        Ok(())
    }

    fn get_state(&self) -> ModelResult<Data> {
        Ok(self.snapshot())
    }
}

impl std::fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDispatcher")
            .field("state", &*self.state.read())
            .field("history_len", &self.history_len())
            .finish()
    }
}
