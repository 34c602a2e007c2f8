//! Aggregate statistics over a task collection.
//!
//! All date logic works on calendar days: due dates are already plain
//! dates, and timestamps are converted into the caller's timezone before
//! being compared with "today".

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use serde::Serialize;

use crate::fields::{DueBucket, Priority, Status};
use crate::query::{due_bucket, Group};
use crate::task::Task;
use crate::util::{is_overdue, percentage};

/// Dashboard counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    /// Percentage of tasks completed, rounded.
    pub completion_rate: u8,
    pub overdue: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
    pub due_today: usize,
    pub due_this_week: usize,
    pub due_soon: usize,
    pub no_due_date: usize,
}

/// Counts for the primary dashboard. Due-date counts consider active tasks only.
pub fn calculate_statistics(tasks: &[Task], today: NaiveDate) -> Statistics {
    let mut stats = Statistics {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match task.status {
            Status::Active => stats.active += 1,
            Status::Completed => stats.completed += 1,
        }
        match task.priority {
            Priority::High => stats.high_priority += 1,
            Priority::Medium => stats.medium_priority += 1,
            Priority::Low => stats.low_priority += 1,
        }
        let Some(due) = task.due_date else {
            stats.no_due_date += 1;
            continue;
        };
        if is_overdue(task.due_date, task.status, today) {
            stats.overdue += 1;
        }
        if task.status == Status::Active {
            let days = (due - today).num_days();
            if days == 0 {
                stats.due_today += 1;
            }
            if (0..=7).contains(&days) {
                stats.due_this_week += 1;
            }
            if (0..=3).contains(&days) {
                stats.due_soon += 1;
            }
        }
    }
    stats.completion_rate = percentage(stats.completed, stats.total);
    stats
}

/// Created/completed counts over a trailing window of calendar days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub created: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductivityMetrics {
    pub today: WindowCounts,
    pub last_7_days: WindowCounts,
    pub last_30_days: WindowCounts,
    /// Mean hours from creation to completion; `None` when nothing is completed.
    pub average_completion_hours: Option<f64>,
}

/// Activity in trailing 1/7/30-day windows ending today (in `now`'s timezone).
pub fn productivity_metrics<Tz: TimeZone>(tasks: &[Task], now: &DateTime<Tz>) -> ProductivityMetrics {
    let tz = now.timezone();
    let today = now.date_naive();
    let local_day = |ts: &DateTime<chrono::Utc>| ts.with_timezone(&tz).date_naive();
    let window = |days: i64| {
        let start = today - Duration::days(days - 1);
        WindowCounts {
            created: tasks
                .iter()
                .filter(|t| local_day(&t.created_at) >= start)
                .count(),
            completed: tasks
                .iter()
                .filter_map(|t| t.completed_at.as_ref())
                .filter(|c| local_day(c) >= start)
                .count(),
        }
    };

    let durations: Vec<f64> = tasks
        .iter()
        .filter_map(|t| t.completed_at.map(|c| (c - t.created_at).num_seconds() as f64 / 3600.0))
        .collect();
    let average_completion_hours = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    ProductivityMetrics {
        today: window(1),
        last_7_days: window(7),
        last_30_days: window(30),
        average_completion_hours,
    }
}

/// Active overdue tasks by how long they have been overdue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverdueAges {
    pub less_than_week: usize,
    pub one_to_two_weeks: usize,
    pub more_than_two_weeks: usize,
}

pub fn overdue_age_buckets(tasks: &[Task], today: NaiveDate) -> OverdueAges {
    let mut ages = OverdueAges::default();
    for task in tasks.iter().filter(|t| is_overdue(t.due_date, t.status, today)) {
        let Some(due) = task.due_date else { continue };
        match (today - due).num_days() {
            d if d < 7 => ages.less_than_week += 1,
            d if d <= 14 => ages.one_to_two_weeks += 1,
            _ => ages.more_than_two_weeks += 1,
        }
    }
    ages
}

/// Active tasks due from today on, grouped into today, tomorrow, this week and later.
pub fn upcoming_tasks(tasks: &[Task], today: NaiveDate) -> Vec<Group> {
    let mut buckets: BTreeMap<DueBucket, Vec<Task>> = BTreeMap::new();
    for task in tasks.iter().filter(|t| t.status == Status::Active) {
        let bucket = due_bucket(task.due_date, today);
        if matches!(bucket, DueBucket::Overdue | DueBucket::NoDueDate) {
            continue;
        }
        buckets.entry(bucket).or_default().push(task.clone());
    }
    buckets
        .into_iter()
        .map(|(bucket, tasks)| Group {
            label: bucket.to_string(),
            tasks,
        })
        .collect()
}

/// Distinct tags and how many tasks carry each, alphabetically.
pub fn tag_counts(tasks: &[Task]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for tag in tasks.iter().flat_map(|t| t.tags.iter()) {
        *counts.entry(tag.clone()).or_insert(0) += 1;
    }
    counts
}
