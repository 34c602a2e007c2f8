//! Command implementations for the CLI interface.
//!
//! Each handler turns one user intent into Task Store calls and prints a
//! plain-text result. Errors are returned to `main`, which reports them.

use std::fs;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::query::{group, FilterCriteria, Session};
use crate::stats::{calculate_statistics, overdue_age_buckets, productivity_metrics, tag_counts};
use crate::storage::export_tasks;
use crate::store::TaskStore;
use crate::task::{NewTask, Recurrence, Task, TaskPatch};
use crate::util::{ellipsize, format_date, format_due_relative, parse_due_input};

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Priority: low | medium | high.
        #[arg(long)]
        priority: Option<String>,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "friday" or "in Nd".
        #[arg(long)]
        due: Option<String>,
        /// Make this a subtask of the given task ID, prefix or title.
        #[arg(long)]
        parent: Option<String>,
        /// Repeat the task when completed.
        #[arg(long, value_enum)]
        every: Option<Frequency>,
        /// Number of periods between repeats.
        #[arg(long, default_value_t = 1)]
        interval: u32,
    },

    /// Add a subtask under an existing task.
    Subtask {
        /// Parent task ID, ID prefix or title.
        parent: String,
        /// Short title for the subtask.
        title: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks with optional filters.
    List {
        /// Filter by status. Remembered for the next listing.
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Filter by priority.
        #[arg(long, value_enum, default_value_t = PriorityFilter::All)]
        priority: PriorityFilter,
        /// Case-insensitive text search over title and description.
        #[arg(long, short)]
        search: Option<String>,
        /// Earliest due date (inclusive).
        #[arg(long)]
        from: Option<String>,
        /// Latest due date (inclusive).
        #[arg(long)]
        to: Option<String>,
        /// Only active tasks past their due date.
        #[arg(long)]
        overdue: bool,
        /// Require tag. May be repeated. Accepts comma-separated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Sort key. Remembered for the next listing.
        #[arg(long, value_enum)]
        sort: Option<SortKey>,
        /// Sort direction. Remembered for the next listing.
        #[arg(long, value_enum)]
        order: Option<SortOrder>,
        /// Print in groups.
        #[arg(long, value_enum)]
        group: Option<GroupBy>,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// View a single task by ID, ID prefix or title.
    View {
        id: String,
    },

    /// Update fields on a task.
    Update {
        /// Task ID, ID prefix or title.
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long)]
        due: Option<String>,
        /// Clear due date.
        #[arg(long)]
        clear_due: bool,
        /// Replace tags. May be repeated and comma-separated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Remove all tags.
        #[arg(long)]
        clear_tags: bool,
        /// Repeat the task when completed.
        #[arg(long, value_enum)]
        every: Option<Frequency>,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Stop repeating.
        #[arg(long)]
        no_repeat: bool,
    },

    /// Flip tasks between active and completed.
    Toggle {
        /// Task IDs, ID prefixes or titles.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete tasks by ID, ID prefix or title.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Move a task to a new position in the manual order.
    Move {
        id: String,
        /// Zero-based target position.
        position: usize,
    },

    /// Delete every completed task.
    ClearCompleted,

    /// Show dashboard statistics.
    Stats,

    /// Export all tasks to a JSON file.
    Export {
        /// Output directory (default: the configured export directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import tasks from a JSON export, skipping IDs that already exist.
    Import {
        input: PathBuf,
    },

    /// Create a timestamped backup of the store.
    Backup,

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Resolve a task identifier: exact ID, unique ID prefix or suffix (as
/// printed by `list`), or unique title.
pub fn resolve_task_identifier(identifier: &str, tasks: &[Task]) -> Result<String> {
    if let Some(t) = tasks.iter().find(|t| t.id == identifier) {
        return Ok(t.id.clone());
    }

    let by_id: Vec<&Task> = if identifier.len() >= 4 {
        tasks
            .iter()
            .filter(|t| t.id.starts_with(identifier) || t.id.ends_with(identifier))
            .collect()
    } else {
        Vec::new()
    };
    let matches = if by_id.is_empty() {
        let needle = identifier.to_lowercase();
        tasks.iter().filter(|t| t.title.to_lowercase() == needle).collect()
    } else {
        by_id
    };

    match matches.as_slice() {
        [] => Err(Error::NotFound(identifier.to_string())),
        [only] => Ok(only.id.clone()),
        many => {
            let mut msg = format!("'{identifier}' matches {} tasks:", many.len());
            for t in many {
                msg.push_str(&format!("\n  {}  {}", short_id(&t.id), t.title));
            }
            msg.push_str("\nPlease use a longer ID instead.");
            Err(Error::Validation(msg))
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(id.len().saturating_sub(8)..).unwrap_or(id)
}

/// Turn friendly due input into ISO text; unrecognised input is passed
/// through so the store reports it.
fn normalise_due(input: &str, today: NaiveDate) -> String {
    parse_due_input(input, today)
        .map(format_date)
        .unwrap_or_else(|| input.to_string())
}

/// Print tasks in a formatted table.
pub fn print_table(tasks: &[Task], today: NaiveDate) {
    println!("{:<9} {:<10} {:<7} {:<10} {}", "ID", "Status", "Pri", "Due", "Title [tags]");
    for t in tasks {
        let tags = if t.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", t.tags.join(","))
        };
        let indent = if t.is_subtask() { "  " } else { "" };
        let repeat = if t.recurring.is_some() { " ↻" } else { "" };
        println!(
            "{:<9} {:<10} {:<7} {:<10} {}{}{}{}",
            short_id(&t.id),
            format_status(t.status),
            format_priority(t.priority),
            format_due_relative(t.due_date, today),
            indent,
            ellipsize(&t.title, 60),
            tags,
            repeat
        );
    }
}

/// Add a new task, or a subtask when `parent` is given.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    store: &TaskStore,
    title: String,
    desc: Option<String>,
    priority: Option<String>,
    tags: Vec<String>,
    due: Option<String>,
    parent: Option<String>,
    every: Option<Frequency>,
    interval: u32,
) -> Result<()> {
    let today = Local::now().date_naive();
    let recurring = every.map(|f| Recurrence::new(f, interval)).transpose()?;
    let data = NewTask {
        title,
        description: desc,
        priority,
        tags,
        due_date: due.as_deref().map(|d| normalise_due(d, today)),
        recurring,
    };
    let task = match parent {
        Some(p) => {
            let parent_id = resolve_task_identifier(&p, &store.list()?)?;
            let child = store.create_subtask(&parent_id, data)?;
            store.update_parent_task_progress(&parent_id)?;
            child
        }
        None => store.create(data)?,
    };
    println!("Added task {}", short_id(&task.id));
    Ok(())
}

/// List tasks through the session built from saved settings and flags.
#[allow(clippy::too_many_arguments)]
pub fn cmd_list(
    store: &TaskStore,
    status: Option<StatusFilter>,
    priority: PriorityFilter,
    search: Option<String>,
    from: Option<String>,
    to: Option<String>,
    overdue: bool,
    tags: Vec<String>,
    sort: Option<SortKey>,
    order: Option<SortOrder>,
    group_by: Option<GroupBy>,
    limit: Option<usize>,
) -> Result<()> {
    let today = Local::now().date_naive();
    let saved = store.settings()?;
    let mut session = Session::from_settings(&saved);
    session.criteria = FilterCriteria {
        status: status.unwrap_or(saved.last_filter),
        priority,
        search,
        due_from: from.as_deref().map(|d| parse_required_due(d, today)).transpose()?,
        due_to: to.as_deref().map(|d| parse_required_due(d, today)).transpose()?,
        overdue_only: overdue,
        tags: crate::util::normalise_tags(&tags),
    };
    session.sort_by = sort.unwrap_or(saved.sort_by);
    session.sort_order = order.unwrap_or(saved.sort_order);

    if session.to_settings() != saved {
        store.save_settings(session.to_settings())?;
    }

    let mut tasks = session.apply(&store.list()?, today);
    if let Some(n) = limit {
        tasks.truncate(n);
    }

    match group_by {
        Some(by) => {
            for g in group(&tasks, by, today) {
                println!("== {} ({}) ==", g.label, g.tasks.len());
                print_table(&g.tasks, today);
                println!();
            }
        }
        None => print_table(&tasks, today),
    }
    Ok(())
}

fn parse_required_due(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    parse_due_input(input, today)
        .ok_or_else(|| Error::Validation(format!("invalid date '{input}'")))
}

/// View detailed information about a specific task.
pub fn cmd_view(store: &TaskStore, id: String) -> Result<()> {
    let tasks = store.list()?;
    let task_id = resolve_task_identifier(&id, &tasks)?;
    let task = store.get(&task_id)?;
    let today = Local::now().date_naive();

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", format_status(task.status));
    println!("Priority:     {}", format_priority(task.priority));
    println!(
        "Due:          {}",
        match task.due_date {
            Some(d) => format!("{} ({})", format_date(d), format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!(
        "Repeats:      {}",
        match task.recurring {
            Some(r) => format!("every {} x {}", r.interval, format_frequency(r.frequency)),
            None => "-".into(),
        }
    );
    println!("Parent:       {}", task.parent_id.as_deref().unwrap_or("-"));
    println!("Tags:         {}", if task.tags.is_empty() { "-".into() } else { task.tags.join(",") });
    println!("Created UTC:  {}", task.created_at.to_rfc3339());
    println!("Updated UTC:  {}", task.updated_at.to_rfc3339());
    if let Some(done) = task.completed_at {
        println!("Completed:    {}", done.to_rfc3339());
    }
    println!(
        "Description:\n{}\n",
        if task.description.is_empty() { "-" } else { task.description.as_str() }
    );

    let subtasks = store.get_subtasks(&task.id)?;
    if !subtasks.is_empty() {
        let stats = store.get_subtask_stats(&task.id)?;
        println!("Subtasks ({}/{} done, {}%):", stats.completed, stats.total, stats.percentage);
        for s in subtasks {
            println!("  - {} [{}] (#{})", s.title, format_status(s.status), short_id(&s.id));
        }
    }
    Ok(())
}

/// Update an existing task's fields.
#[allow(clippy::too_many_arguments)]
pub fn cmd_update(
    store: &TaskStore,
    id: String,
    title: Option<String>,
    desc: Option<String>,
    priority: Option<String>,
    status: Option<Status>,
    due: Option<String>,
    clear_due: bool,
    tags: Vec<String>,
    clear_tags: bool,
    every: Option<Frequency>,
    interval: u32,
    no_repeat: bool,
) -> Result<()> {
    let today = Local::now().date_naive();
    let task_id = resolve_task_identifier(&id, &store.list()?)?;

    let due_date = if clear_due {
        Some(None)
    } else {
        due.as_deref().map(|d| Some(normalise_due(d, today)))
    };
    let tags = if clear_tags {
        Some(Vec::new())
    } else if tags.is_empty() {
        None
    } else {
        Some(tags)
    };
    let recurring = if no_repeat {
        Some(None)
    } else {
        every.map(|f| Recurrence::new(f, interval).map(Some)).transpose()?
    };

    let task = store.update(
        &task_id,
        TaskPatch {
            title,
            description: desc,
            priority,
            status,
            tags,
            due_date,
            recurring,
        },
    )?;
    if status.is_some() {
        if let Some(parent) = &task.parent_id {
            store.update_parent_task_progress(parent)?;
        }
    }
    println!("Updated task {}", short_id(&task_id));
    Ok(())
}

/// Toggle tasks, spawning next occurrences and rolling up parents.
pub fn cmd_toggle(store: &TaskStore, ids: Vec<String>) -> Result<()> {
    for id in ids {
        let task_id = resolve_task_identifier(&id, &store.list()?)?;
        let outcome = store.toggle_status_with_recurrence(&task_id)?;
        let task = &outcome.updated_task;
        println!("{} is now {}", short_id(&task.id), format_status(task.status).to_lowercase());
        if let Some(next) = &outcome.next_task {
            println!(
                "Next occurrence {} due {}",
                short_id(&next.id),
                next.due_date.map(format_date).unwrap_or_default()
            );
        }
        if let Some(parent) = &task.parent_id {
            let p = store.update_parent_task_progress(parent)?;
            println!("Parent {} is {}", short_id(&p.id), format_status(p.status).to_lowercase());
        }
    }
    Ok(())
}

/// Delete one task, or several with per-item tolerance.
pub fn cmd_delete(store: &TaskStore, ids: Vec<String>) -> Result<()> {
    let tasks = store.list()?;
    if let [single] = ids.as_slice() {
        let task_id = resolve_task_identifier(single, &tasks)?;
        store.delete(&task_id)?;
        println!("Deleted {}", short_id(&task_id));
        return Ok(());
    }
    let resolved: Vec<String> = ids
        .iter()
        .filter_map(|id| match resolve_task_identifier(id, &tasks) {
            Ok(t) => Some(t),
            Err(e) => {
                eprintln!("Skipping {id}: {e}");
                None
            }
        })
        .collect();
    let deleted = store.bulk_delete(&resolved);
    println!("Deleted {}/{} task(s).", deleted, ids.len());
    Ok(())
}

pub fn cmd_move(store: &TaskStore, id: String, position: usize) -> Result<()> {
    let task_id = resolve_task_identifier(&id, &store.list()?)?;
    store.reorder(&task_id, position)?;
    println!("Moved {} to position {}", short_id(&task_id), position);
    Ok(())
}

pub fn cmd_clear_completed(store: &TaskStore) -> Result<()> {
    let removed = store.clear_completed()?;
    println!("Removed {removed} completed task(s).");
    Ok(())
}

/// Print the dashboard and secondary metrics.
pub fn cmd_stats(store: &TaskStore) -> Result<()> {
    let tasks = store.list()?;
    let now = Local::now();
    let today = now.date_naive();
    let s = calculate_statistics(&tasks, today);
    println!("Total:          {}", s.total);
    println!("Active:         {}", s.active);
    println!("Completed:      {} ({}%)", s.completed, s.completion_rate);
    println!("Overdue:        {}", s.overdue);
    println!("Due today:      {}", s.due_today);
    println!("Due soon:       {}", s.due_soon);
    println!("Due this week:  {}", s.due_this_week);
    println!("No due date:    {}", s.no_due_date);
    println!("Priority:       high {} / medium {} / low {}", s.high_priority, s.medium_priority, s.low_priority);

    let p = productivity_metrics(&tasks, &now);
    println!();
    println!("Created/completed today:   {}/{}", p.today.created, p.today.completed);
    println!("Created/completed 7 days:  {}/{}", p.last_7_days.created, p.last_7_days.completed);
    println!("Created/completed 30 days: {}/{}", p.last_30_days.created, p.last_30_days.completed);
    match p.average_completion_hours {
        Some(h) => println!("Average completion time:   {h:.1}h"),
        None => println!("Average completion time:   -"),
    }

    let ages = overdue_age_buckets(&tasks, today);
    if s.overdue > 0 {
        println!();
        println!(
            "Overdue by age: <1w {} / 1-2w {} / >2w {}",
            ages.less_than_week, ages.one_to_two_weeks, ages.more_than_two_weeks
        );
    }

    let tags = tag_counts(&tasks);
    if !tags.is_empty() {
        println!();
        for (tag, count) in tags {
            println!("{tag:<20} {count}");
        }
    }
    Ok(())
}

/// Export every task to `output`, or to the gateway's configured export directory.
pub fn cmd_export(store: &TaskStore, output: Option<PathBuf>) -> Result<()> {
    let dir = output
        .or_else(|| store.gateway().options().export_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let tasks = store.list()?;
    let path = export_tasks(&tasks, &dir, Local::now().date_naive())?;
    println!("Exported {} task(s) to {}", tasks.len(), path.display());
    Ok(())
}

pub fn cmd_import(store: &TaskStore, input: PathBuf) -> Result<()> {
    let text = fs::read_to_string(&input)?;
    let added = store.gateway().import_tasks(&text)?;
    println!("Import completed. {added} task(s) added.");
    Ok(())
}

pub fn cmd_backup(store: &TaskStore, config: &Config) -> Result<()> {
    let path = store.gateway().backup(&config.backup_dir())?;
    println!("Backup created: {}", path.display());
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "tt", &mut std::io::stdout());
}
