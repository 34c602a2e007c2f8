//! Task store: create, update, delete, subtasks and recurrence.
//!
//! The store keeps no state of its own. Every operation runs inside one
//! [`Gateway::update`] cycle, so it sees the freshly loaded collection and
//! either persists the whole result or nothing at all.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fields::*;
use crate::storage::{AppState, Gateway};
use crate::task::{NewTask, Settings, Task, TaskPatch};
use crate::util::{clean_title, generate_id, normalise_tags, parse_date, percentage, sanitize};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Progress rollup of a parent's subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubtaskStats {
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
}

/// Result of toggling a task that may recur.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub updated_task: Task,
    pub next_task: Option<Task>,
}

/// CRUD and aggregation over the persisted task collection.
pub struct TaskStore {
    gateway: Gateway,
    clock: Clock,
}

impl TaskStore {
    pub fn new(gateway: Gateway) -> Self {
        TaskStore {
            gateway,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the time source, mainly for deterministic tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// All tasks in persisted order.
    pub fn list(&self) -> Result<Vec<Task>> {
        Ok(self.gateway.load()?.tasks)
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.gateway
            .load()?
            .tasks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn create(&self, data: NewTask) -> Result<Task> {
        let now = self.now();
        let task = self.gateway.update(|state| create_in(state, data, None, now))?;
        debug!(id = %task.id, "task created");
        Ok(task)
    }

    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let now = self.now();
        self.gateway.update(|state| update_in(state, id, patch, now))
    }

    /// Remove one task. The id is dropped from its parent's `subtasks` and any
    /// children are detached so no reference dangles.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let now = self.now();
        self.gateway.update(|state| {
            let idx = position(state, id)?;
            let removed = state.tasks.remove(idx);
            for t in state.tasks.iter_mut() {
                if removed.parent_id.as_deref() == Some(t.id.as_str()) {
                    t.subtasks.retain(|s| s != id);
                    t.updated_at = now;
                }
                if t.parent_id.as_deref() == Some(id) {
                    t.parent_id = None;
                }
            }
            debug!(id, "task deleted");
            Ok(true)
        })
    }

    /// Flip active and completed. Recurrence and parent rollup are left to the caller.
    pub fn toggle_status(&self, id: &str) -> Result<Task> {
        let now = self.now();
        self.gateway.update(|state| {
            let flipped = state.tasks[position(state, id)?].status.flipped();
            update_in(state, id, TaskPatch::status(flipped), now)
        })
    }

    /// Create a child of `parent_id` and register it on the parent in one write.
    pub fn create_subtask(&self, parent_id: &str, data: NewTask) -> Result<Task> {
        let now = self.now();
        self.gateway.update(|state| {
            let parent_idx = position(state, parent_id)?;
            let child = create_in(state, data, Some(parent_id.to_string()), now)?;
            let parent = &mut state.tasks[parent_idx];
            parent.subtasks.push(child.id.clone());
            parent.updated_at = now;
            Ok(child)
        })
    }

    pub fn get_subtasks(&self, parent_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .gateway
            .load()?
            .tasks
            .into_iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .collect())
    }

    /// Roll subtask completion up into the parent's status.
    ///
    /// All subtasks completed forces the parent completed; a partial set
    /// reopens a completed parent; none completed leaves it alone.
    /// Returns the parent as stored afterwards.
    pub fn update_parent_task_progress(&self, parent_id: &str) -> Result<Task> {
        let now = self.now();
        self.gateway.update(|state| {
            let idx = position(state, parent_id)?;
            let (total, completed) = count_subtasks(&state.tasks, parent_id);
            let parent = &mut state.tasks[idx];
            if total == 0 {
                return Ok(parent.clone());
            }
            let target = if completed == total {
                Some(Status::Completed)
            } else if completed > 0 && parent.is_completed() {
                Some(Status::Active)
            } else {
                None
            };
            if let Some(status) = target.filter(|s| *s != parent.status) {
                parent.set_status(status, now);
                parent.updated_at = now;
                debug!(id = parent_id, ?status, "parent status rolled up");
            }
            Ok(parent.clone())
        })
    }

    pub fn get_subtask_stats(&self, parent_id: &str) -> Result<SubtaskStats> {
        let tasks = self.list()?;
        let (total, completed) = count_subtasks(&tasks, parent_id);
        Ok(SubtaskStats {
            total,
            completed,
            percentage: percentage(completed, total),
        })
    }

    /// Persist the next occurrence of a recurring task, if it has one.
    pub fn create_next_recurrence(&self, task: &Task) -> Result<Option<Task>> {
        let now = self.now();
        self.gateway.update(|state| Ok(push_next_recurrence(state, task, now)))
    }

    /// Toggle, and when a recurring top-level task becomes completed also
    /// create its next occurrence. Subtasks never recur.
    pub fn toggle_status_with_recurrence(&self, id: &str) -> Result<ToggleOutcome> {
        let now = self.now();
        self.gateway.update(|state| {
            let flipped = state.tasks[position(state, id)?].status.flipped();
            let updated_task = update_in(state, id, TaskPatch::status(flipped), now)?;
            let next_task = if updated_task.is_completed() && !updated_task.is_subtask() {
                push_next_recurrence(state, &updated_task, now)
            } else {
                None
            };
            Ok(ToggleOutcome { updated_task, next_task })
        })
    }

    /// Apply `patch` to each id in turn. Failures are logged and skipped.
    pub fn bulk_update(&self, ids: &[String], patch: &TaskPatch) -> usize {
        ids.iter()
            .filter(|id| match self.update(id, patch.clone()) {
                Ok(_) => true,
                Err(e) => {
                    warn!(id = %id, error = %e, "bulk update skipped task");
                    false
                }
            })
            .count()
    }

    /// Delete each id in turn. Failures are logged and skipped.
    pub fn bulk_delete(&self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| match self.delete(id) {
                Ok(_) => true,
                Err(e) => {
                    warn!(id = %id, error = %e, "bulk delete skipped task");
                    false
                }
            })
            .count()
    }

    /// Move a task to `new_index` in the persisted order (clamped to the end).
    pub fn reorder(&self, id: &str, new_index: usize) -> Result<()> {
        self.gateway.update(|state| {
            let idx = position(state, id)?;
            let task = state.tasks.remove(idx);
            let target = new_index.min(state.tasks.len());
            state.tasks.insert(target, task);
            Ok(())
        })
    }

    /// Remove every completed task, returning how many went.
    pub fn clear_completed(&self) -> Result<usize> {
        let ids: Vec<String> = self
            .list()?
            .into_iter()
            .filter(Task::is_completed)
            .map(|t| t.id)
            .collect();
        Ok(self.bulk_delete(&ids))
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self.gateway.load()?.settings)
    }

    pub fn save_settings(&self, settings: Settings) -> Result<()> {
        self.gateway.update(|state| {
            state.settings = settings;
            Ok(())
        })
    }
}

/// Next due date of a recurring task, counted from its current due date.
///
/// Monthly steps use calendar-month arithmetic that clamps to the last day
/// of a shorter month (2024-01-31 + 1 month = 2024-02-29).
pub fn calculate_next_occurrence(task: &Task) -> Option<NaiveDate> {
    let rule = task.recurring?;
    let due = task.due_date?;
    match rule.frequency {
        Frequency::Daily => due.checked_add_signed(Duration::days(i64::from(rule.interval))),
        Frequency::Weekly => due.checked_add_signed(Duration::weeks(i64::from(rule.interval))),
        Frequency::Monthly => due.checked_add_months(Months::new(rule.interval)),
    }
}

fn position(state: &AppState, id: &str) -> Result<usize> {
    state
        .tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

fn count_subtasks(tasks: &[Task], parent_id: &str) -> (usize, usize) {
    tasks
        .iter()
        .filter(|t| t.parent_id.as_deref() == Some(parent_id))
        .fold((0, 0), |(total, done), t| (total + 1, done + usize::from(t.is_completed())))
}

fn create_in(
    state: &mut AppState,
    data: NewTask,
    parent_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Task> {
    let title = clean_title(&data.title)?;
    let due_date = data.due_date.as_deref().map(parse_date).transpose()?;
    if let Some(rule) = &data.recurring {
        rule.validate()?;
    }
    let priority = data
        .priority
        .as_deref()
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or_default();

    let task = Task {
        id: generate_id(),
        title,
        description: data.description.as_deref().map(sanitize).unwrap_or_default(),
        priority,
        status: Status::Active,
        tags: normalise_tags(&data.tags),
        due_date,
        parent_id,
        subtasks: Vec::new(),
        recurring: data.recurring,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };
    state.tasks.push(task.clone());
    Ok(task)
}

fn update_in(state: &mut AppState, id: &str, patch: TaskPatch, now: DateTime<Utc>) -> Result<Task> {
    let idx = position(state, id)?;

    // Validate everything before touching the record.
    let title = patch.title.as_deref().map(clean_title).transpose()?;
    let priority = patch.priority.as_deref().map(str::parse::<Priority>).transpose()?;
    let due_date = match patch.due_date {
        Some(Some(ref raw)) => Some(Some(parse_date(raw)?)),
        Some(None) => Some(None),
        None => None,
    };
    if let Some(Some(rule)) = &patch.recurring {
        rule.validate()?;
    }

    let task = &mut state.tasks[idx];
    if let Some(title) = title {
        task.title = title;
    }
    if let Some(desc) = patch.description {
        task.description = sanitize(&desc);
    }
    if let Some(priority) = priority {
        task.priority = priority;
    }
    if let Some(tags) = patch.tags {
        task.tags = normalise_tags(&tags);
    }
    if let Some(due) = due_date {
        task.due_date = due;
    }
    if let Some(rule) = patch.recurring {
        task.recurring = rule;
    }
    if let Some(status) = patch.status {
        task.set_status(status, now);
    }
    task.updated_at = now;
    Ok(task.clone())
}

fn next_recurrence(task: &Task, now: DateTime<Utc>) -> Option<Task> {
    let due_date = calculate_next_occurrence(task)?;
    Some(Task {
        id: generate_id(),
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority,
        status: Status::Active,
        tags: task.tags.clone(),
        due_date: Some(due_date),
        parent_id: None,
        subtasks: Vec::new(),
        recurring: task.recurring,
        created_at: now,
        updated_at: now,
        completed_at: None,
    })
}

fn push_next_recurrence(state: &mut AppState, task: &Task, now: DateTime<Utc>) -> Option<Task> {
    let next = next_recurrence(task, now)?;
    debug!(from = %task.id, id = %next.id, due = %next.due_date.map(|d| d.to_string()).unwrap_or_default(), "next occurrence created");
    state.tasks.push(next.clone());
    Some(next)
}
