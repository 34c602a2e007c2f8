//! Filtering, sorting and grouping of task lists.
//!
//! Everything here is a pure function of its inputs: nothing touches
//! storage and the input slice is never mutated. The current selections of
//! a list view live in an explicit [`Session`] rather than in global state.

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::fields::*;
use crate::task::{Settings, Task};
use crate::util::is_overdue;

/// Independent criteria, all of which must hold for a task to be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub status: StatusFilter,
    pub priority: PriorityFilter,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    /// Inclusive lower bound on the due date.
    pub due_from: Option<NaiveDate>,
    /// Inclusive upper bound on the due date.
    pub due_to: Option<NaiveDate>,
    pub overdue_only: bool,
    /// Every listed tag must be present.
    pub tags: Vec<String>,
}

impl FilterCriteria {
    pub fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        if !self.status.matches(task.status) || !self.priority.matches(task.priority) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty()) {
            if !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.due_from.is_some() || self.due_to.is_some() {
            let Some(due) = task.due_date else {
                return false;
            };
            if self.due_from.is_some_and(|from| due < from) || self.due_to.is_some_and(|to| due > to) {
                return false;
            }
        }
        if self.overdue_only && !is_overdue(task.due_date, task.status, today) {
            return false;
        }
        self.tags.iter().all(|tag| task.tags.contains(tag))
    }
}

/// Tasks matching every criterion, in input order.
pub fn filter(tasks: &[Task], criteria: &FilterCriteria, today: NaiveDate) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| criteria.matches(t, today))
        .cloned()
        .collect()
}

/// Sort a copy of `tasks`.
///
/// Tasks without a due date always come last under the due-date key, in
/// either direction. For every other comparison the descending order is the
/// whole ascending comparison negated, ties included.
pub fn sort(tasks: &[Task], key: SortKey, order: SortOrder) -> Vec<Task> {
    let mut out = tasks.to_vec();
    if key == SortKey::Manual {
        if order == SortOrder::Desc {
            out.reverse();
        }
        return out;
    }
    out.sort_by(|a, b| {
        if key == SortKey::Due {
            match (a.due_date, b.due_date) {
                (None, None) => {}
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(_), Some(_)) => {}
            }
        }
        let ord = compare(a, b, key)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id));
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    out
}

fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Manual => Ordering::Equal,
        SortKey::Due => a.due_date.cmp(&b.due_date),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortKey::Created => a.created_at.cmp(&b.created_at),
        SortKey::Updated => a.updated_at.cmp(&b.updated_at),
        SortKey::Title => a
            .title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.title.cmp(&b.title)),
    }
}

/// A labelled bucket of tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub tasks: Vec<Task>,
}

/// Which due bucket `due` falls into relative to `today`.
pub fn due_bucket(due: Option<NaiveDate>, today: NaiveDate) -> DueBucket {
    let Some(due) = due else {
        return DueBucket::NoDueDate;
    };
    match (due - today).num_days() {
        n if n < 0 => DueBucket::Overdue,
        0 => DueBucket::Today,
        1 => DueBucket::Tomorrow,
        n if n <= 7 => DueBucket::ThisWeek,
        _ => DueBucket::Later,
    }
}

/// Bucket tasks by `by`; only non-empty buckets are returned, in canonical order.
pub fn group(tasks: &[Task], by: GroupBy, today: NaiveDate) -> Vec<Group> {
    let buckets: Vec<(String, Vec<Task>)> = match by {
        GroupBy::Priority => Priority::ALL
            .iter()
            .map(|p| {
                let members: Vec<Task> = tasks.iter().filter(|t| t.priority == *p).cloned().collect();
                (format_priority(*p).to_string(), members)
            })
            .collect(),
        GroupBy::Status => [Status::Active, Status::Completed]
            .iter()
            .map(|s| {
                let members: Vec<Task> = tasks.iter().filter(|t| t.status == *s).cloned().collect();
                (format_status(*s).to_string(), members)
            })
            .collect(),
        GroupBy::Due => DueBucket::ALL
            .iter()
            .map(|b| {
                let members: Vec<Task> = tasks
                    .iter()
                    .filter(|t| due_bucket(t.due_date, today) == *b)
                    .cloned()
                    .collect();
                (b.to_string(), members)
            })
            .collect(),
    };
    buckets
        .into_iter()
        .filter(|(_, members)| !members.is_empty())
        .map(|(label, tasks)| Group { label, tasks })
        .collect()
}

/// Filter and sort selections of one list view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub criteria: FilterCriteria,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl Session {
    /// Restore a session from persisted settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Session {
            criteria: FilterCriteria {
                status: settings.last_filter,
                ..Default::default()
            },
            sort_by: settings.sort_by,
            sort_order: settings.sort_order,
        }
    }

    /// The persistable part of this session.
    pub fn to_settings(&self) -> Settings {
        Settings {
            last_filter: self.criteria.status,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }

    /// Filter then sort.
    pub fn apply(&self, tasks: &[Task], today: NaiveDate) -> Vec<Task> {
        sort(&filter(tasks, &self.criteria, today), self.sort_by, self.sort_order)
    }
}
