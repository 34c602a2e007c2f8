//! Task data structure and related functionality.
//!
//! This module defines the persisted `Task` record, its recurrence rule,
//! the input shapes used to create and patch tasks, and the small
//! application `Settings` record stored next to the tasks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fields::*;

/// A single to-do item, optionally a subtask of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub recurring: Option<Recurrence>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Apply a status change, keeping `completed_at` in step with `status`.
    ///
    /// Completing keeps an existing completion time; reactivating clears it.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        self.status = status;
        match status {
            Status::Completed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            Status::Active => self.completed_at = None,
        }
    }
}

/// Rule describing how a completed task spawns its next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
}

impl Recurrence {
    pub fn new(frequency: Frequency, interval: u32) -> Result<Self> {
        let rule = Recurrence { frequency, interval };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval < 1 {
            return Err(Error::Validation("recurrence interval must be at least 1".into()));
        }
        Ok(())
    }
}

/// Input for creating a task. Raw text fields are validated by the store.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    /// Free-form priority; anything unrecognised becomes medium.
    pub priority: Option<String>,
    pub tags: Vec<String>,
    /// `YYYY-MM-DD`; anything else fails the create.
    pub due_date: Option<String>,
    pub recurring: Option<Recurrence>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update. `None` leaves a field untouched; for the clearable
/// fields `Some(None)` removes the value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Must name a valid priority.
    pub priority: Option<String>,
    pub status: Option<Status>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<Option<String>>,
    pub recurring: Option<Option<Recurrence>>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Persisted list preferences, overwritten wholesale on every save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub last_filter: StatusFilter,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
}
