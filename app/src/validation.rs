//! Input validation for todo text.
//!
//! Text is checked here, at the input boundary, before any action reaches
//! the store.

use thiserror::Error;

/// Longest accepted todo text, in characters
pub const MAX_TODO_TEXT_LENGTH: usize = 500;

/// Why a piece of todo text was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextValidationError {
    /// Nothing left after trimming
    #[error("A todo title should be at least 1, and at most 500 characters long.")]
    Empty,

    /// Longer than [`MAX_TODO_TEXT_LENGTH`]
    #[error("A todo title should be at least 1, and at most 500 characters long.")]
    TooLong {
        /// Characters beyond the limit
        over_by: usize,
    },
}

/// Trims `raw` and checks its length
///
/// Length is counted in characters, not bytes.
///
/// # Errors
///
/// Returns [`TextValidationError::Empty`] for blank input and
/// [`TextValidationError::TooLong`] past [`MAX_TODO_TEXT_LENGTH`].
pub fn validate_todo_text(raw: &str) -> Result<String, TextValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(TextValidationError::Empty);
    }

    let length = text.chars().count();
    if length > MAX_TODO_TEXT_LENGTH {
        return Err(TextValidationError::TooLong {
            over_by: length - MAX_TODO_TEXT_LENGTH,
        });
    }

    Ok(text.to_string())
}
