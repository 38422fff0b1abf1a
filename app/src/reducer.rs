//! Reducer logic for the todo list.
//!
//! Every mutation updates [`TodoState`] synchronously and returns the
//! persistence effects that mirror it into storage. Unknown ids and empty
//! text are logged and ignored; nothing here fails.

use crate::persistence::{Persistence, WriteKind};
use crate::types::{Todo, TodoAction, TodoId, TodoState};
use localtodo_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use std::sync::Arc;

type Effects = SmallVec<[Effect<TodoAction>; 4]>;

/// Environment dependencies for the todo reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Where mutations are mirrored
    pub persistence: Persistence,
}

impl TodoEnvironment {
    /// Creates a new `TodoEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, persistence: Persistence) -> Self {
        Self { clock, persistence }
    }
}

/// Reducer for the todo list
#[derive(Clone, Debug)]
pub struct TodoReducer;

impl TodoReducer {
    /// Creates a new `TodoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Wraps a persistence effect, or drops it when storage is unavailable
    fn mirror(state: &TodoState, build: impl FnOnce() -> Effect<TodoAction>) -> Effects {
        if !state.persistence_available {
            tracing::info!("Persistence unavailable, change kept in memory only");
            return SmallVec::new();
        }

        let effect = build();
        if effect.is_noop() {
            SmallVec::new()
        } else {
            smallvec![effect]
        }
    }

    fn persist_record(state: &TodoState, id: TodoId, kind: WriteKind, env: &TodoEnvironment) -> Effects {
        Self::mirror(state, || {
            state.get(id).map_or(Effect::None, |todo| {
                env.persistence.record_written(todo, kind, &state.todos)
            })
        })
    }
}

impl Default for TodoReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TodoAction::SetPersistenceAvailability { available } => {
                state.persistence_available = available;
                if available {
                    tracing::debug!("Persistence available");
                } else {
                    tracing::info!("Persistence disabled, running in memory only");
                }
                SmallVec::new()
            },

            TodoAction::AddTodo { text } => {
                if text.trim().is_empty() {
                    tracing::warn!("Refusing to add a todo with empty text");
                    return SmallVec::new();
                }

                let Some(id) = state.next_id else {
                    tracing::error!("Refusing to add a todo: no ids left");
                    return SmallVec::new();
                };
                state.todos.push(Todo::new(id, text, env.clock.now()));
                state.next_id = id.next();
                tracing::debug!(id = %id, "Added todo");

                Self::persist_record(state, id, WriteKind::Created, env)
            },

            TodoAction::UpdateTodoText { id, new_text } => {
                let Some(todo) = state.get_mut(id) else {
                    tracing::error!(id = %id, "Cannot update text of unknown todo");
                    return SmallVec::new();
                };
                todo.edit_text(new_text, env.clock.now());
                tracing::debug!(id = %id, "Updated todo text");

                Self::persist_record(state, id, WriteKind::Updated, env)
            },

            TodoAction::SetCompletion { id, completed } => {
                let Some(todo) = state.get_mut(id) else {
                    tracing::error!(id = %id, "Cannot set completion of unknown todo");
                    return SmallVec::new();
                };
                todo.set_completion(completed, env.clock.now());
                tracing::debug!(id = %id, completed, "Set todo completion");

                Self::persist_record(state, id, WriteKind::Updated, env)
            },

            TodoAction::DeleteTodo { id } => {
                let before = state.todos.len();
                state.todos.retain(|todo| todo.id != id);
                if state.todos.len() == before {
                    // A record skipped at load time can still be in storage.
                    tracing::debug!(id = %id, "Deleting todo that is not in memory");
                } else {
                    tracing::debug!(id = %id, "Deleted todo");
                }

                Self::mirror(state, || env.persistence.records_removed(&[id], &state.todos))
            },

            TodoAction::CompleteAll => {
                let now = env.clock.now();
                let mut changed = Vec::new();
                for todo in state.todos.iter_mut().filter(|todo| !todo.is_completed) {
                    todo.set_completion(true, now);
                    changed.push(todo.id);
                }
                tracing::debug!(count = changed.len(), "Completed all todos");

                Self::mirror(state, || {
                    let written: Vec<&Todo> = state
                        .todos
                        .iter()
                        .filter(|todo| changed.contains(&todo.id))
                        .collect();
                    env.persistence.records_written(&written, &state.todos)
                })
            },

            TodoAction::ClearCompleted => {
                let (removed, kept): (Vec<Todo>, Vec<Todo>) = std::mem::take(&mut state.todos)
                    .into_iter()
                    .partition(|todo| todo.is_completed);
                state.todos = kept;
                let ids: Vec<TodoId> = removed.iter().map(|todo| todo.id).collect();
                tracing::debug!(count = ids.len(), "Cleared completed todos");

                Self::mirror(state, || env.persistence.records_removed(&ids, &state.todos))
            },

            TodoAction::LoadFromPersistence { records } => {
                state.replace_all(records);
                tracing::info!(
                    count = state.count(),
                    next_id = ?state.next_id,
                    "Loaded todos from persistence"
                );
                SmallVec::new()
            },
        }
    }
}
