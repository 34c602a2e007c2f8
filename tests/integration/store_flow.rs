//! End-to-end flows through a file-backed store.
//!
//! Each test opens a `TaskStore` over a temporary directory, exercises a
//! user-level workflow, then reopens the directory to check what persisted.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, TimeZone, Utc};
use tasktrack::fields::{Frequency, SortKey, SortOrder, Status, StatusFilter};
use tasktrack::storage::{
    export_tasks, AppState, FileStore, Gateway, StorageOptions, STORAGE_KEY,
};
use tasktrack::store::TaskStore;
use tasktrack::task::{NewTask, Recurrence, Settings};
use tasktrack::Error;

fn open(dir: &Path) -> TaskStore {
    let gateway = Gateway::new(FileStore::new(dir), StorageOptions::default());
    TaskStore::new(gateway).with_clock(|| Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
}

#[test]
fn test_tasks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let parent = store
        .create(NewTask {
            priority: Some("high".into()),
            tags: vec!["Work, Urgent".into()],
            due_date: Some("2024-06-03".into()),
            ..NewTask::titled("Ship release")
        })
        .unwrap();
    let child = store.create_subtask(&parent.id, NewTask::titled("Tag build")).unwrap();
    store.toggle_status(&child.id).unwrap();
    store.update_parent_task_progress(&parent.id).unwrap();
    drop(store);

    let reopened = open(dir.path());
    let tasks = reopened.list().unwrap();
    assert_eq!(tasks.len(), 2);
    let parent = reopened.get(&parent.id).unwrap();
    assert_eq!(parent.tags, vec!["work", "urgent"]);
    assert_eq!(parent.subtasks, vec![child.id.clone()]);
    assert_eq!(parent.status, Status::Completed);
    assert_eq!(reopened.get_subtask_stats(&parent.id).unwrap().percentage, 100);
}

#[test]
fn test_recurring_completion_persists_next_occurrence() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let task = store
        .create(NewTask {
            due_date: Some("2024-06-01".into()),
            recurring: Some(Recurrence::new(Frequency::Weekly, 1).unwrap()),
            ..NewTask::titled("Water plants")
        })
        .unwrap();

    let outcome = store.toggle_status_with_recurrence(&task.id).unwrap();
    let next = outcome.next_task.expect("weekly task recurs");
    assert_eq!(next.due_date, NaiveDate::from_ymd_opt(2024, 6, 8));
    assert_eq!(next.status, Status::Active);

    let reopened = open(dir.path());
    assert_eq!(reopened.list().unwrap().len(), 2);
    assert!(reopened.get(&task.id).unwrap().is_completed());
}

#[test]
fn test_settings_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let settings = Settings {
        last_filter: StatusFilter::Active,
        sort_by: SortKey::Due,
        sort_order: SortOrder::Asc,
    };
    store.save_settings(settings).unwrap();
    assert_eq!(open(dir.path()).settings().unwrap(), settings);
}

#[test]
fn test_corrupt_blob_needs_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let path = FileStore::new(dir.path()).path_for(STORAGE_KEY);
    fs::write(&path, "{ not json").unwrap();

    let gateway = Gateway::new(FileStore::new(dir.path()), StorageOptions::default());
    assert!(matches!(gateway.load_or_reset(|_| false), Err(Error::Parse(_))));
    // Declining leaves the file untouched.
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");

    let state = gateway.load_or_reset(|_| true).unwrap();
    assert!(state.tasks.is_empty());
    assert!(gateway.load().is_ok());
}

#[test]
fn test_export_then_import_skips_existing() {
    let source_dir = tempfile::tempdir().unwrap();
    let source = open(source_dir.path());
    source.create(NewTask::titled("One")).unwrap();
    let two = source.create(NewTask::titled("Two")).unwrap();
    source.toggle_status(&two.id).unwrap();

    let export_dir = tempfile::tempdir().unwrap();
    let tasks = source.list().unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let path = export_tasks(&tasks, export_dir.path(), date).unwrap();
    assert!(path.ends_with("tasks-export-2024-06-01.json"));

    let target_dir = tempfile::tempdir().unwrap();
    let target = open(target_dir.path());
    target.create(NewTask::titled("Local")).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(target.gateway().import_tasks(&text).unwrap(), 2);
    assert_eq!(target.gateway().import_tasks(&text).unwrap(), 0);

    let imported = target.get(&two.id).unwrap();
    assert!(imported.is_completed());
    assert!(imported.completed_at.is_some());
    assert_eq!(target.list().unwrap().len(), 3);
}

#[test]
fn test_import_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.create(NewTask::titled("Keep me")).unwrap();
    assert!(matches!(store.gateway().import_tasks("[1, 2, 3]"), Err(Error::Parse(_))));
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_backup_is_a_readable_blob() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.create(NewTask::titled("Backed up")).unwrap();

    let backup_dir = dir.path().join("backup");
    let path = store.gateway().backup(&backup_dir).unwrap();
    assert!(path.starts_with(&backup_dir));
    let state: AppState = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.tasks[0].title, "Backed up");
}

#[test]
fn test_delete_parent_detaches_children_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let parent = store.create(NewTask::titled("Parent")).unwrap();
    let child = store.create_subtask(&parent.id, NewTask::titled("Child")).unwrap();
    assert!(store.delete(&parent.id).unwrap());

    let reopened = open(dir.path());
    assert!(matches!(reopened.get(&parent.id), Err(Error::NotFound(_))));
    assert_eq!(reopened.get(&child.id).unwrap().parent_id, None);
}
