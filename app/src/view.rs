//! Read-side derivations and ephemeral UI state.
//!
//! Nothing here is persisted. Display order and filtering are recomputed
//! from the store's insertion-ordered collection on every render.

use crate::types::{Todo, TodoId};
use crate::validation::{self, TextValidationError};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a filter or sort name is not recognised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} `{value}` (expected one of: {expected})")]
pub struct UnknownOption {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Which todos are listed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    /// Every todo
    #[default]
    All,
    /// Only todos not yet done
    Incomplete,
    /// Only done todos
    Completed,
}

impl Filter {
    /// Every filter, in display order
    pub const ALL: [Self; 3] = [Self::All, Self::Incomplete, Self::Completed];

    /// Whether `todo` passes this filter
    #[must_use]
    pub const fn matches(self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Incomplete => !todo.is_completed,
            Self::Completed => todo.is_completed,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Incomplete => "incomplete",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|filter| filter.name() == s.trim())
            .ok_or_else(|| UnknownOption {
                kind: "filter",
                value: s.to_string(),
                expected: "all, incomplete, completed",
            })
    }
}

/// Display order of the list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Incomplete first, then newest first
    #[default]
    Default,
    /// Newest first
    DateCreatedDesc,
    /// Oldest first
    DateCreatedAsc,
    /// Alphabetical, ignoring case
    TitleAsc,
}

impl SortOrder {
    /// Every sort order, in display order
    pub const ALL: [Self; 4] = [
        Self::Default,
        Self::DateCreatedDesc,
        Self::DateCreatedAsc,
        Self::TitleAsc,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::DateCreatedDesc => "date-created-desc",
            Self::DateCreatedAsc => "date-created-asc",
            Self::TitleAsc => "title-asc",
        }
    }

    fn compare(self, a: &Todo, b: &Todo) -> Ordering {
        match self {
            Self::Default => a
                .is_completed
                .cmp(&b.is_completed)
                .then_with(|| newest_first(a, b)),
            Self::DateCreatedDesc => newest_first(a, b),
            Self::DateCreatedAsc => {
                // Undated records go last in both directions
                let key = |todo: &Todo| (created(todo).is_none(), created(todo), todo.id);
                key(a).cmp(&key(b))
            },
            Self::TitleAsc => a
                .text
                .to_lowercase()
                .cmp(&b.text.to_lowercase())
                .then(a.id.cmp(&b.id)),
        }
    }
}

fn created(todo: &Todo) -> Option<DateTime<Utc>> {
    todo.created_at.as_ref().and_then(crate::types::Timestamp::parse)
}

fn newest_first(a: &Todo, b: &Todo) -> Ordering {
    let key = |todo: &Todo| (created(todo).is_none(), Reverse(created(todo)), Reverse(todo.id));
    key(a).cmp(&key(b))
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortOrder {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|order| order.name() == s.trim())
            .ok_or_else(|| UnknownOption {
                kind: "sort order",
                value: s.to_string(),
                expected: "default, date-created-desc, date-created-asc, title-asc",
            })
    }
}

/// The todos to render, filtered then sorted
#[must_use]
pub fn visible_todos(todos: &[Todo], filter: Filter, sort: SortOrder) -> Vec<&Todo> {
    let mut visible: Vec<&Todo> = todos.iter().filter(|todo| filter.matches(todo)).collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
}

/// Counts shown next to the filter options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TodoCounts {
    /// Every todo
    pub total: usize,
    /// Not yet done
    pub incomplete: usize,
    /// Done
    pub completed: usize,
}

impl TodoCounts {
    /// Counts `todos`
    #[must_use]
    pub fn of(todos: &[Todo]) -> Self {
        let completed = todos.iter().filter(|todo| todo.is_completed).count();
        Self {
            total: todos.len(),
            incomplete: todos.len() - completed,
            completed,
        }
    }

    /// Count for one filter
    #[must_use]
    pub const fn for_filter(&self, filter: Filter) -> usize {
        match filter {
            Filter::All => self.total,
            Filter::Incomplete => self.incomplete,
            Filter::Completed => self.completed,
        }
    }
}

/// Bulk operations that ask for confirmation first
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialog {
    /// "Mark every todo completed?"
    CompleteAll,
    /// "Delete every completed todo?"
    ClearCompleted,
}

impl Dialog {
    /// Question shown while the dialog is open
    #[must_use]
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::CompleteAll => "Mark all todos as completed?",
            Self::ClearCompleted => "Delete all completed todos? This cannot be undone.",
        }
    }
}

/// Ephemeral view state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Active filter
    pub filter: Filter,
    /// Active sort order
    pub sort: SortOrder,
    editing: Option<TodoId>,
    dialog: Option<Dialog>,
}

impl ViewState {
    /// Item currently being edited
    #[must_use]
    pub const fn editing(&self) -> Option<TodoId> {
        self.editing
    }

    /// Starts editing `id`; only one item is edited at a time
    pub fn begin_edit(&mut self, id: TodoId) {
        self.editing = Some(id);
    }

    /// Stops editing, returning the item that was being edited
    pub fn end_edit(&mut self) -> Option<TodoId> {
        self.editing.take()
    }

    /// Confirmation dialog currently open
    #[must_use]
    pub const fn dialog(&self) -> Option<Dialog> {
        self.dialog
    }

    /// Opens `dialog`, replacing any open one
    pub fn open_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
    }

    /// Closes the open dialog, returning it
    pub fn close_dialog(&mut self) -> Option<Dialog> {
        self.dialog.take()
    }
}

/// The add-form's text field
///
/// Owned by whoever renders the form and passed around explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputHandle {
    draft: String,
    focused: bool,
    error: Option<TextValidationError>,
}

impl Default for InputHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandle {
    /// An empty, focused field
    #[must_use]
    pub const fn new() -> Self {
        Self {
            draft: String::new(),
            focused: true,
            error: None,
        }
    }

    /// Current draft text
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Whether the field has focus
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.focused
    }

    /// Inline validation error, if any
    #[must_use]
    pub const fn error(&self) -> Option<TextValidationError> {
        self.error
    }

    /// Replaces the draft and validates it live
    ///
    /// An empty draft shows no error; one that is too long does.
    pub fn input(&mut self, text: impl Into<String>) {
        self.draft = text.into();
        self.focused = true;
        self.error = match validation::validate_todo_text(&self.draft) {
            Err(error @ TextValidationError::TooLong { .. }) => Some(error),
            _ => None,
        };
    }

    /// Validates the draft for submission
    ///
    /// On success the field is cleared and refocused.
    ///
    /// # Errors
    ///
    /// Returns the [`TextValidationError`] and keeps the draft when the text
    /// is blank or too long.
    pub fn submit(&mut self) -> Result<String, TextValidationError> {
        match validation::validate_todo_text(&self.draft) {
            Ok(text) => {
                self.draft.clear();
                self.error = None;
                self.focused = true;
                Ok(text)
            },
            Err(error) => {
                self.error = Some(error);
                Err(error)
            },
        }
    }

    /// Moves focus away; a whitespace-only draft is discarded
    pub fn blur(&mut self) {
        self.focused = false;
        if self.draft.trim().is_empty() {
            self.draft.clear();
            self.error = None;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use crate::types::Timestamp;

    fn todo(id: i64, text: &str, created_at: Option<&str>, done: bool) -> Todo {
        Todo {
            id: TodoId::new(id),
            text: text.to_string(),
            is_completed: done,
            created_at: created_at.map(Timestamp::from_raw),
            last_updated_at: None,
            completed_at: done.then(|| Timestamp::from_raw("2026-01-05T00:00:00.000Z")),
        }
    }

    fn sample() -> Vec<Todo> {
        vec![
            todo(1, "banana", Some("2026-01-01T10:00:00.000Z"), false),
            todo(2, "Apple", Some("2026-01-03T10:00:00.000Z"), true),
            todo(3, "cherry", Some("2026-01-02T10:00:00.000Z"), false),
            todo(4, "date", None, false),
        ]
    }

    fn ids(todos: &[&Todo]) -> Vec<i64> {
        todos.iter().map(|t| t.id.get()).collect()
    }

    #[test]
    fn option_names_round_trip() {
        for filter in Filter::ALL {
            assert_eq!(filter.to_string().parse::<Filter>().unwrap(), filter);
        }
        for order in SortOrder::ALL {
            assert_eq!(order.to_string().parse::<SortOrder>().unwrap(), order);
        }
        assert!("newest".parse::<SortOrder>().is_err());
        assert!("done".parse::<Filter>().is_err());
    }

    #[test]
    fn default_sort_is_incomplete_then_newest() {
        let todos = sample();
        let visible = visible_todos(&todos, Filter::All, SortOrder::Default);
        assert_eq!(ids(&visible), vec![3, 1, 4, 2]);
    }

    #[test]
    fn date_sorts_put_undated_last() {
        let todos = sample();
        assert_eq!(
            ids(&visible_todos(&todos, Filter::All, SortOrder::DateCreatedDesc)),
            vec![2, 3, 1, 4]
        );
        assert_eq!(
            ids(&visible_todos(&todos, Filter::All, SortOrder::DateCreatedAsc)),
            vec![1, 3, 2, 4]
        );
    }

    #[test]
    fn title_sort_ignores_case() {
        let todos = sample();
        assert_eq!(
            ids(&visible_todos(&todos, Filter::All, SortOrder::TitleAsc)),
            vec![2, 1, 3, 4]
        );
    }

    #[test]
    fn filters_select_by_status() {
        let todos = sample();
        assert_eq!(
            ids(&visible_todos(&todos, Filter::Completed, SortOrder::Default)),
            vec![2]
        );
        assert_eq!(
            visible_todos(&todos, Filter::Incomplete, SortOrder::Default).len(),
            3
        );
    }

    #[test]
    fn counts_add_up() {
        let counts = TodoCounts::of(&sample());
        assert_eq!(
            counts,
            TodoCounts {
                total: 4,
                incomplete: 3,
                completed: 1
            }
        );
        assert_eq!(counts.for_filter(Filter::Completed), 1);
    }

    #[test]
    fn view_state_tracks_edit_and_dialog() {
        let mut view = ViewState::default();
        assert_eq!(view.filter, Filter::All);

        view.begin_edit(TodoId::new(2));
        assert_eq!(view.editing(), Some(TodoId::new(2)));
        assert_eq!(view.end_edit(), Some(TodoId::new(2)));
        assert_eq!(view.editing(), None);

        view.open_dialog(Dialog::ClearCompleted);
        assert_eq!(view.dialog(), Some(Dialog::ClearCompleted));
        assert_eq!(view.close_dialog(), Some(Dialog::ClearCompleted));
        assert_eq!(view.close_dialog(), None);
    }

    #[test]
    fn input_handle_live_validation() {
        let mut input = InputHandle::new();
        input.input("a".repeat(502));
        assert_eq!(
            input.error(),
            Some(TextValidationError::TooLong { over_by: 2 })
        );

        input.input("");
        assert_eq!(input.error(), None);
    }

    #[test]
    fn input_handle_submit_resets_and_refocuses() {
        let mut input = InputHandle::new();
        input.input("  Buy milk ");
        input.blur();
        assert_eq!(input.draft(), "  Buy milk ");

        input.focused = false;
        assert_eq!(input.submit().unwrap(), "Buy milk");
        assert_eq!(input.draft(), "");
        assert!(input.is_focused());
    }

    #[test]
    fn input_handle_rejects_blank_submit() {
        let mut input = InputHandle::new();
        input.input("   ");
        assert_eq!(input.submit(), Err(TextValidationError::Empty));
        assert_eq!(input.error(), Some(TextValidationError::Empty));

        input.blur();
        assert_eq!(input.draft(), "");
        assert_eq!(input.error(), None);
        assert!(!input.is_focused());
    }
}
