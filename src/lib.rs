//! # tasktrack
//!
//! A personal task tracker: tasks with priority, tags, due dates, one level
//! of subtasks and recurrence, persisted as a single JSON document.
//!
//! The layers, bottom up:
//!
//! - [`storage`]: key-value backends and the [`storage::Gateway`] that owns
//!   the persisted blob (migration, capacity recovery, import/export, backups)
//! - [`store`]: the [`store::TaskStore`] CRUD, subtask and recurrence operations
//! - [`query`]: pure filter/sort/group functions and the view [`query::Session`]
//! - [`stats`]: dashboard counts and productivity metrics
//!
//! The `tt` binary wires these to a clap CLI.

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod fields;
pub mod query;
pub mod stats;
pub mod storage;
pub mod store;
pub mod task;
pub mod util;

pub use error::{Error, Result};
