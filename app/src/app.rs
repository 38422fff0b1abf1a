//! Application root.
//!
//! [`TodoApp`] owns the store, the persistence mirror and the view state.
//! It is built once and started once; the interactive shell and the tests
//! drive it through its async methods.

use crate::config::{AppConfig, StorageBackend};
use crate::persistence::Persistence;
use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::storage::{FileStorage, MemoryStorage, StorageAdapter, UnavailableStorage};
use crate::types::{Todo, TodoAction, TodoId, TodoState};
use crate::validation::{self, TextValidationError};
use crate::view::{self, Dialog, TodoCounts, ViewState};
use localtodo_core::environment::{Clock, Storage, SystemClock};
use localtodo_runtime::{Store, StoreConfig, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shown once when storage cannot be used
pub const STORAGE_UNAVAILABLE_NOTICE: &str =
    "Storage is unavailable. Your todos will be kept in memory only and lost when you quit.";

/// The concrete store type driving the todo list
pub type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

/// Errors surfaced to the shell
#[derive(Error, Debug)]
pub enum AppError {
    /// [`TodoApp::start`] was called a second time
    #[error("the application has already been started")]
    AlreadyStarted,

    /// Todo text failed validation
    #[error(transparent)]
    Validation(#[from] TextValidationError),

    /// No todo with this id
    #[error("no todo with id {0}")]
    UnknownTodo(TodoId),

    /// A save was requested while nothing is being edited
    #[error("no todo is being edited")]
    NotEditing,

    /// The store rejected the action
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of [`TodoApp::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Whether changes will be mirrored into storage
    pub persistence_available: bool,
    /// Number of records loaded
    pub loaded: usize,
    /// Records skipped because they failed validation
    pub corrupted_keys: Vec<String>,
    /// Whether the default seed collection was used
    pub seeded: bool,
}

/// The todo application
pub struct TodoApp {
    store: TodoStore,
    view: ViewState,
    initialized: bool,
    notice: Option<&'static str>,
    corrupted_keys: Vec<String>,
}

impl TodoApp {
    /// Creates an app around `environment`; nothing is loaded until [`TodoApp::start`]
    #[must_use]
    pub fn new(environment: TodoEnvironment, shutdown_timeout: Duration) -> Self {
        Self {
            store: Store::with_config(
                TodoState::new(),
                TodoReducer::new(),
                environment,
                StoreConfig::default().with_shutdown_timeout(shutdown_timeout),
            ),
            view: ViewState::default(),
            initialized: false,
            notice: None,
            corrupted_keys: Vec::new(),
        }
    }

    /// Builds the app described by `config`
    ///
    /// A storage file that cannot be opened does not fail construction; the
    /// app starts in memory-only mode instead.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let backend: Arc<dyn Storage> = match &config.storage {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::File(path) => match FileStorage::open(path) {
                Ok(storage) => Arc::new(storage),
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Could not open storage file");
                    Arc::new(UnavailableStorage::new(error.to_string()))
                },
            },
        };

        let persistence = Persistence::new(
            StorageAdapter::new(backend, config.key_prefix.clone()),
            config.layout.clone(),
            config.write_delay,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self::new(
            TodoEnvironment::new(clock, persistence),
            config.shutdown_timeout,
        )
    }

    fn persistence(&self) -> &Persistence {
        &self.store.environment().persistence
    }

    /// Probes storage, loads persisted records and marks the app started
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] on a second call.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<StartupReport, AppError> {
        if self.initialized {
            return Err(AppError::AlreadyStarted);
        }
        self.initialized = true;

        let mut report = StartupReport {
            persistence_available: self.persistence().adapter().probe(),
            loaded: 0,
            corrupted_keys: Vec::new(),
            seeded: false,
        };

        if report.persistence_available {
            match self.persistence().load() {
                Ok(loaded) => {
                    report.loaded = loaded.records.len();
                    report.seeded = loaded.seeded;
                    report.corrupted_keys.clone_from(&loaded.corrupted_keys);
                    self.corrupted_keys = loaded.corrupted_keys;

                    if !loaded.records.is_empty() {
                        self.store
                            .send(TodoAction::LoadFromPersistence {
                                records: loaded.records,
                            })
                            .await?;
                    }
                },
                Err(error) => {
                    tracing::warn!(error = %error, "Could not read storage, continuing in memory only");
                    report.persistence_available = false;
                },
            }
        }

        self.store
            .send(TodoAction::SetPersistenceAvailability {
                available: report.persistence_available,
            })
            .await?;

        if !report.persistence_available {
            self.notice = Some(STORAGE_UNAVAILABLE_NOTICE);
        }
        if !report.corrupted_keys.is_empty() {
            tracing::warn!(
                count = report.corrupted_keys.len(),
                "Some stored todos were unreadable and have been skipped"
            );
        }

        tracing::info!(
            loaded = report.loaded,
            persistence_available = report.persistence_available,
            "Started"
        );
        Ok(report)
    }

    /// Whether [`TodoApp::start`] has run
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.initialized
    }

    /// The storage-unavailable notice; returned once, then `None`
    pub fn take_notice(&mut self) -> Option<&'static str> {
        self.notice.take()
    }

    /// Keys of corrupted records found at startup and not yet discarded
    #[must_use]
    pub fn corrupted_keys(&self) -> &[String] {
        &self.corrupted_keys
    }

    /// Read-only view state
    #[must_use]
    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    /// Mutable view state (filter and sort)
    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// Validates `raw` and adds it as a new todo
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for blank or overlong text.
    pub async fn add(&self, raw: &str) -> Result<(), AppError> {
        let text = validation::validate_todo_text(raw)?;
        self.store.send(TodoAction::AddTodo { text }).await?;
        Ok(())
    }

    /// Validates `raw` and replaces the text of `id`
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for blank or overlong text.
    pub async fn update_text(&self, id: TodoId, raw: &str) -> Result<(), AppError> {
        let new_text = validation::validate_todo_text(raw)?;
        self.store
            .send(TodoAction::UpdateTodoText { id, new_text })
            .await?;
        Ok(())
    }

    /// Starts editing `id`, returning its current state
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownTodo`] if there is no such todo.
    pub async fn begin_edit(&mut self, id: TodoId) -> Result<Todo, AppError> {
        let todo = self.todo(id).await.ok_or(AppError::UnknownTodo(id))?;
        self.view.begin_edit(id);
        Ok(todo)
    }

    /// Saves the edit in progress
    ///
    /// Invalid text keeps the edit open.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotEditing`] or [`AppError::Validation`].
    pub async fn save_edit(&mut self, raw: &str) -> Result<TodoId, AppError> {
        let id = self.view.editing().ok_or(AppError::NotEditing)?;
        self.update_text(id, raw).await?;
        self.view.end_edit();
        Ok(id)
    }

    /// Abandons the edit in progress
    pub fn cancel_edit(&mut self) -> Option<TodoId> {
        self.view.end_edit()
    }

    /// Marks `id` completed or not
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] after shutdown.
    pub async fn set_completion(&self, id: TodoId, completed: bool) -> Result<(), AppError> {
        self.store
            .send(TodoAction::SetCompletion { id, completed })
            .await?;
        Ok(())
    }

    /// Flips the completion of `id`, returning the new status
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownTodo`] if there is no such todo.
    pub async fn toggle(&self, id: TodoId) -> Result<bool, AppError> {
        let current = self
            .store
            .state(|state| state.get(id).map(|todo| todo.is_completed))
            .await
            .ok_or(AppError::UnknownTodo(id))?;
        self.set_completion(id, !current).await?;
        Ok(!current)
    }

    /// Deletes `id`, along with any stored record under its key
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] after shutdown.
    pub async fn delete(&mut self, id: TodoId) -> Result<(), AppError> {
        if self.view.editing() == Some(id) {
            self.view.end_edit();
        }
        self.store.send(TodoAction::DeleteTodo { id }).await?;
        Ok(())
    }

    /// Completes every incomplete todo
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] after shutdown.
    pub async fn complete_all(&self) -> Result<(), AppError> {
        self.store.send(TodoAction::CompleteAll).await?;
        Ok(())
    }

    /// Deletes every completed todo
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] after shutdown.
    pub async fn clear_completed(&self) -> Result<(), AppError> {
        self.store.send(TodoAction::ClearCompleted).await?;
        Ok(())
    }

    /// Opens a confirmation dialog for a bulk operation
    pub fn request(&mut self, dialog: Dialog) {
        self.view.open_dialog(dialog);
    }

    /// Runs the bulk operation behind the open dialog and closes it
    ///
    /// Returns the dialog that was confirmed, `None` if none was open.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] after shutdown.
    pub async fn confirm(&mut self) -> Result<Option<Dialog>, AppError> {
        let Some(dialog) = self.view.close_dialog() else {
            return Ok(None);
        };
        match dialog {
            Dialog::CompleteAll => self.complete_all().await?,
            Dialog::ClearCompleted => self.clear_completed().await?,
        }
        Ok(Some(dialog))
    }

    /// Closes the open dialog without acting
    pub fn dismiss(&mut self) -> Option<Dialog> {
        self.view.close_dialog()
    }

    /// Deletes the corrupted records reported at startup
    ///
    /// Returns how many were discarded.
    pub async fn discard_corrupted(&mut self) -> usize {
        if self.corrupted_keys.is_empty() {
            return 0;
        }

        let current = self.todos().await;
        let discarded = self
            .persistence()
            .discard_corrupted(&self.corrupted_keys, &current);
        if discarded == self.corrupted_keys.len() {
            self.corrupted_keys.clear();
        }
        tracing::info!(discarded, "Discarded corrupted records");
        discarded
    }

    /// Every todo, in insertion order
    pub async fn todos(&self) -> Vec<Todo> {
        self.store.state(|state| state.todos.clone()).await
    }

    /// One todo by id
    pub async fn todo(&self, id: TodoId) -> Option<Todo> {
        self.store.state(|state| state.get(id).cloned()).await
    }

    /// Todos to render under the current filter and sort
    pub async fn visible(&self) -> Vec<Todo> {
        let (filter, sort) = (self.view.filter, self.view.sort);
        self.store
            .state(|state| {
                view::visible_todos(&state.todos, filter, sort)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Counts per filter
    pub async fn counts(&self) -> TodoCounts {
        self.store.state(|state| TodoCounts::of(&state.todos)).await
    }

    /// Whether changes are currently mirrored into storage
    pub async fn persistence_available(&self) -> bool {
        self.store.state(|state| state.persistence_available).await
    }

    /// Waits until every deferred write has gone out
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] (wrapped) if writes are still pending
    /// after `timeout`.
    pub async fn settle(&self, timeout: Duration) -> Result<(), AppError> {
        self.store.settle(timeout).await?;
        Ok(())
    }

    /// Stops accepting changes and waits for pending writes
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if writes are still pending after the
    /// configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.store
            .shutdown(self.store.config().shutdown_timeout)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for TodoApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoApp")
            .field("view", &self.view)
            .field("initialized", &self.initialized)
            .field("corrupted_keys", &self.corrupted_keys)
            .finish_non_exhaustive()
    }
}
