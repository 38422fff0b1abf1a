//! Line-oriented front end.
//!
//! Each input line parses into a [`Command`], runs against a [`TodoApp`] and
//! produces text for the terminal. The binary only shuttles lines between
//! stdin, [`execute`] and stdout.

use crate::app::{AppError, TodoApp};
use crate::types::{Todo, TodoId};
use crate::view::{Dialog, Filter, SortOrder, TodoCounts, UnknownOption, ViewState};
use std::fmt::Write as _;
use thiserror::Error;

/// Shown by `help`
pub const HELP: &str = "\
Commands:
  add <text>          add a todo
  edit <id> [text]    change a todo's text (without text: start editing)
  save <text>         save the todo being edited
  cancel              stop editing or close the open dialog
  done <id>           mark completed
  undo <id>           mark not completed
  toggle <id>         flip completion
  rm <id>             delete a todo
  complete-all        mark every todo completed (asks first)
  clear-completed     delete completed todos (asks first)
  yes | no            answer the open question
  filter <name>       all | incomplete | completed
  sort <name>         default | date-created-desc | date-created-asc | title-asc
  list                show todos
  purge-corrupted     delete unreadable stored todos
  help                show this help
  quit                save and exit";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `add <text>`
    Add(String),
    /// `edit <id> [text]`
    Edit {
        /// Todo to edit
        id: TodoId,
        /// Replacement text; `None` starts an edit
        text: Option<String>,
    },
    /// `save <text>`
    Save(String),
    /// `cancel`
    Cancel,
    /// `done <id>`
    Done(TodoId),
    /// `undo <id>`
    Undo(TodoId),
    /// `toggle <id>`
    Toggle(TodoId),
    /// `rm <id>`
    Remove(TodoId),
    /// `complete-all`
    CompleteAll,
    /// `clear-completed`
    ClearCompleted,
    /// `yes`
    Yes,
    /// `no`
    No,
    /// `filter <name>`
    Filter(Filter),
    /// `sort <name>`
    Sort(SortOrder),
    /// `list`
    List,
    /// `purge-corrupted`
    PurgeCorrupted,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Why an input line was not understood
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    #[error("type a command, or `help`")]
    Empty,

    /// First word is not a command
    #[error("unknown command `{0}`, try `help`")]
    UnknownCommand(String),

    /// A required argument is missing
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        /// Command name
        command: &'static str,
        /// What was expected
        argument: &'static str,
    },

    /// An id argument is not a number
    #[error("`{0}` is not a todo id")]
    BadId(String),

    /// Unknown filter or sort name
    #[error(transparent)]
    UnknownOption(#[from] UnknownOption),
}

fn parse_id(command: &'static str, raw: Option<&str>) -> Result<TodoId, ParseError> {
    let raw = raw.ok_or(ParseError::MissingArgument {
        command,
        argument: "an id",
    })?;
    raw.parse().map_err(|_| ParseError::BadId(raw.to_string()))
}

impl std::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(name, rest)| (name, rest.trim()));
        let arg = Some(rest).filter(|rest| !rest.is_empty());

        let command = match name {
            "" => return Err(ParseError::Empty),
            // Text is validated by the app, so an empty `add` still reaches it
            "add" => Self::Add(rest.to_string()),
            "edit" => {
                let (id, text) = rest
                    .split_once(char::is_whitespace)
                    .map_or((arg, None), |(id, text)| (Some(id), Some(text.to_string())));
                Self::Edit {
                    id: parse_id("edit", id)?,
                    text,
                }
            },
            "save" => Self::Save(rest.to_string()),
            "cancel" => Self::Cancel,
            "done" => Self::Done(parse_id("done", arg)?),
            "undo" => Self::Undo(parse_id("undo", arg)?),
            "toggle" => Self::Toggle(parse_id("toggle", arg)?),
            "rm" => Self::Remove(parse_id("rm", arg)?),
            "complete-all" => Self::CompleteAll,
            "clear-completed" => Self::ClearCompleted,
            "yes" | "y" => Self::Yes,
            "no" | "n" => Self::No,
            "filter" => Self::Filter(
                arg.ok_or(ParseError::MissingArgument {
                    command: "filter",
                    argument: "a filter name",
                })?
                .parse()?,
            ),
            "sort" => Self::Sort(
                arg.ok_or(ParseError::MissingArgument {
                    command: "sort",
                    argument: "a sort order",
                })?
                .parse()?,
            ),
            "list" | "ls" => Self::List,
            "purge-corrupted" => Self::PurgeCorrupted,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Print the text and read the next line
    Continue(String),
    /// Leave the loop
    Quit,
}

/// Runs one command against `app`
///
/// # Errors
///
/// Returns the [`AppError`] for rejected input or a stopped store; the shell
/// prints it and carries on.
pub async fn execute(app: &mut TodoApp, command: Command) -> Result<Flow, AppError> {
    let output = match command {
        Command::Add(text) => {
            app.add(&text).await?;
            render(app).await
        },
        Command::Edit { id, text: Some(text) } => {
            if app.todo(id).await.is_none() {
                return Err(AppError::UnknownTodo(id));
            }
            app.update_text(id, &text).await?;
            render(app).await
        },
        Command::Edit { id, text: None } => {
            let todo = app.begin_edit(id).await?;
            format!("Editing {id}: {}\nType `save <text>` or `cancel`.", todo.text)
        },
        Command::Save(text) => {
            app.save_edit(&text).await?;
            render(app).await
        },
        Command::Cancel => match (app.cancel_edit(), app.dismiss()) {
            (None, None) => "Nothing to cancel.".to_string(),
            _ => "Cancelled.".to_string(),
        },
        Command::Done(id) => complete(app, id, true).await?,
        Command::Undo(id) => complete(app, id, false).await?,
        Command::Toggle(id) => {
            app.toggle(id).await?;
            render(app).await
        },
        Command::Remove(id) => {
            app.delete(id).await?;
            render(app).await
        },
        Command::CompleteAll => ask(app, Dialog::CompleteAll),
        Command::ClearCompleted => ask(app, Dialog::ClearCompleted),
        Command::Yes => match app.confirm().await? {
            Some(_) => render(app).await,
            None => "There is no open question.".to_string(),
        },
        Command::No => match app.dismiss() {
            Some(_) => "Cancelled.".to_string(),
            None => "There is no open question.".to_string(),
        },
        Command::Filter(filter) => {
            app.view_mut().filter = filter;
            render(app).await
        },
        Command::Sort(sort) => {
            app.view_mut().sort = sort;
            render(app).await
        },
        Command::List => render(app).await,
        Command::PurgeCorrupted => {
            let discarded = app.discard_corrupted().await;
            format!("Discarded {discarded} unreadable record(s).")
        },
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Flow::Quit),
    };
    Ok(Flow::Continue(output))
}

async fn complete(app: &TodoApp, id: TodoId, completed: bool) -> Result<String, AppError> {
    if app.todo(id).await.is_none() {
        return Err(AppError::UnknownTodo(id));
    }
    app.set_completion(id, completed).await?;
    Ok(render(app).await)
}

fn ask(app: &mut TodoApp, dialog: Dialog) -> String {
    app.request(dialog);
    format!("{} (yes/no)", dialog.prompt())
}

async fn render(app: &TodoApp) -> String {
    render_list(&app.visible().await, app.counts().await, app.view())
}

/// Renders the todo list with its filter and sort header
#[must_use]
pub fn render_list(visible: &[Todo], counts: TodoCounts, view: &ViewState) -> String {
    let mut out = String::new();

    let filters: Vec<String> = Filter::ALL
        .iter()
        .map(|filter| {
            let marker = if *filter == view.filter { "*" } else { "" };
            format!("{marker}{filter} ({})", counts.for_filter(*filter))
        })
        .collect();
    let _ = writeln!(out, "Filter: {}   Sort: {}", filters.join(" | "), view.sort);

    if counts.total == 0 {
        out.push_str("Nothing to do. Add a todo with `add <text>`.");
        return out;
    }
    if visible.is_empty() {
        out.push_str("No todos match this filter.");
        return out;
    }

    let lines: Vec<String> = visible
        .iter()
        .map(|todo| {
            let check = if todo.is_completed { "x" } else { " " };
            let editing = if view.editing() == Some(todo.id) { " (editing)" } else { "" };
            format!("[{check}] {:>3}  {}{editing}", todo.id.get(), todo.text)
        })
        .collect();
    out.push_str(&lines.join("\n"));
    out
}
