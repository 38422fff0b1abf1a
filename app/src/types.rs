//! Domain types for the todo list.
//!
//! A todo list is an ordered collection of [`Todo`] records plus the counter
//! that hands out ids. Every change goes through a [`TodoAction`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a todo item
///
/// Ids are assigned from [`TodoState::next_id`] and are never handed out
/// twice. Persisted records are not range-checked, so a loaded id may be zero
/// or negative; new ids are always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(i64);

impl TodoId {
    /// The id handed to the first todo of an empty list
    pub const FIRST: Self = Self(1);

    /// Creates a `TodoId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The id that follows this one, `None` past `i64::MAX`
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TodoId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// An ISO-8601 timestamp exactly as it is stored
///
/// Kept as text so that a persisted record with an odd date string still
/// loads; use [`Timestamp::parse`] when an actual instant is needed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Formats an instant the way every new record stores it
    /// (`2026-01-01T10:00:00.000Z`)
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Wraps raw timestamp text without checking it
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The stored text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the stored text, `None` if it is not RFC 3339
    #[must_use]
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single todo item
///
/// Serializes to the six camelCase fields of the persisted record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier
    pub id: TodoId,
    /// What needs to be done
    pub text: String,
    /// Whether the todo is completed
    pub is_completed: bool,
    /// When the todo was created; always set for todos created in this
    /// process, possibly null for a record loaded from storage
    pub created_at: Option<Timestamp>,
    /// When the text was last edited
    pub last_updated_at: Option<Timestamp>,
    /// When the todo was last marked completed
    pub completed_at: Option<Timestamp>,
}

impl Todo {
    /// Creates a new, incomplete todo
    #[must_use]
    pub fn new(id: TodoId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            is_completed: false,
            created_at: Some(Timestamp::from_datetime(created_at)),
            last_updated_at: None,
            completed_at: None,
        }
    }

    /// Replaces the text and stamps `last_updated_at`
    pub fn edit_text(&mut self, text: String, at: DateTime<Utc>) {
        self.text = text;
        self.last_updated_at = Some(Timestamp::from_datetime(at));
    }

    /// Sets the completion flag; `completed_at` follows the new status
    pub fn set_completion(&mut self, completed: bool, at: DateTime<Utc>) {
        self.is_completed = completed;
        self.completed_at = completed.then(|| Timestamp::from_datetime(at));
    }
}

/// State of the todo list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoState {
    /// Todos in insertion order
    pub todos: Vec<Todo>,
    /// Id the next created todo receives; `None` once ids are exhausted
    pub next_id: Option<TodoId>,
    /// Whether mutations are mirrored into storage
    pub persistence_available: bool,
}

impl Default for TodoState {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoState {
    /// Creates a new empty todo state
    #[must_use]
    pub const fn new() -> Self {
        Self {
            todos: Vec::new(),
            next_id: Some(TodoId::FIRST),
            persistence_available: true,
        }
    }

    /// Builds a state from already-loaded records, the id counter placed past the highest id
    #[must_use]
    pub fn with_todos(todos: Vec<Todo>) -> Self {
        let mut state = Self::new();
        state.replace_all(todos);
        state
    }

    /// Replaces the collection and reinitializes the id counter
    ///
    /// The counter lands past the highest loaded id and never below
    /// [`TodoId::FIRST`].
    pub fn replace_all(&mut self, todos: Vec<Todo>) {
        self.next_id = match todos.iter().map(|todo| todo.id).max() {
            Some(highest) => highest.next().map(|next| next.max(TodoId::FIRST)),
            None => Some(TodoId::FIRST),
        };
        self.todos = todos;
    }

    /// Returns the number of todos
    #[must_use]
    pub fn count(&self) -> usize {
        self.todos.len()
    }

    /// Returns the number of completed todos
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.todos.iter().filter(|t| t.is_completed).count()
    }

    /// Returns a todo by ID
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    /// Returns a mutable todo by ID
    pub fn get_mut(&mut self, id: TodoId) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| t.id == id)
    }

    /// Checks if a todo exists
    #[must_use]
    pub fn exists(&self, id: TodoId) -> bool {
        self.get(id).is_some()
    }
}

/// Every operation the view layer can request from the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TodoAction {
    /// Record whether storage is usable; when false no persistence effects are produced
    SetPersistenceAvailability {
        /// Result of the storage probe
        available: bool,
    },

    /// Append a new todo
    AddTodo {
        /// Text, already validated at the input boundary
        text: String,
    },

    /// Replace a todo's text
    UpdateTodoText {
        /// Todo to edit
        id: TodoId,
        /// Replacement text
        new_text: String,
    },

    /// Mark a todo completed or not completed
    SetCompletion {
        /// Todo to update
        id: TodoId,
        /// New completion status
        completed: bool,
    },

    /// Remove a todo
    DeleteTodo {
        /// Todo to remove
        id: TodoId,
    },

    /// Complete every incomplete todo
    CompleteAll,

    /// Remove every completed todo
    ClearCompleted,

    /// Replace the collection with records read from storage at startup
    LoadFromPersistence {
        /// Validated records
        records: Vec<Todo>,
    },
}

impl TodoAction {
    /// Short name used in log lines
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetPersistenceAvailability { .. } => "set_persistence_availability",
            Self::AddTodo { .. } => "add_todo",
            Self::UpdateTodoText { .. } => "update_todo_text",
            Self::SetCompletion { .. } => "set_completion",
            Self::DeleteTodo { .. } => "delete_todo",
            Self::CompleteAll => "complete_all",
            Self::ClearCompleted => "clear_completed",
            Self::LoadFromPersistence { .. } => "load_from_persistence",
        }
    }
}
