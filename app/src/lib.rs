//! A single-user todo list backed by local key-value storage.
//!
//! The list lives in a reducer-driven store. Every mutation is mirrored,
//! best effort, into a [`Storage`](localtodo_core::environment::Storage)
//! backend; when storage fails the app keeps working in memory and says so
//! once.
//!
//! - [`types`]: `Todo`, `TodoState` and the closed `TodoAction` enum
//! - [`codec`]: validating JSON codec for persisted records
//! - [`storage`]: backends and the prefix-namespacing adapter
//! - [`persistence`]: storage layouts, deferred writes and startup loading
//! - [`reducer`]: the state machine
//! - [`validation`]: todo text rules applied at the input boundary
//! - [`view`]: filtering, sorting, counts and ephemeral UI state
//! - [`app`]: the application root
//! - [`shell`]: the line-oriented front end used by the binary
//!
//! # Quick Start
//!
//! ```no_run
//! use localtodo::{AppConfig, TodoApp};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut app = TodoApp::from_config(&AppConfig::from_env()?);
//! let report = app.start().await?;
//! println!("Loaded {} todos", report.loaded);
//!
//! app.add("Buy milk").await?;
//! println!("{:?}", app.counts().await);
//!
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod codec;
pub mod config;
pub mod persistence;
pub mod reducer;
pub mod shell;
pub mod storage;
pub mod types;
pub mod validation;
pub mod view;

// Re-export commonly used types
pub use app::{AppError, StartupReport, TodoApp};
pub use config::{AppConfig, ConfigError};
pub use persistence::{LoadReport, Persistence, PersistenceLayout};
pub use reducer::{TodoEnvironment, TodoReducer};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use types::{Timestamp, Todo, TodoAction, TodoId, TodoState};
pub use validation::{TextValidationError, validate_todo_text};
pub use view::{Filter, SortOrder, TodoCounts, ViewState};
