//! Persistence gateway for the task collection.
//!
//! All application state (tasks and settings) lives in one JSON blob under a
//! single key of a [`KeyValueStore`]. The [`Gateway`] owns that blob: it
//! initialises and migrates it, enforces the capacity limit with a recovery
//! cascade, and exposes an atomic read-modify-write primitive used by the
//! task store. JSON export/import and timestamped backups also live here.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fields::Status;
use crate::task::{Settings, Task};
use crate::util::{clean_title, format_date, normalise_tags, sanitize, unescape_html};

/// Key under which the blob is stored.
pub const STORAGE_KEY: &str = "tasktrack";
/// Version stamped into every blob written by this build.
pub const SCHEMA_VERSION: &str = "1.0";
/// Default capacity, matching a typical browser local-storage quota.
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

const PROBE_KEY: &str = "__tasktrack_probe__";

/// Minimal string key-value backend.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Atomic-ish write via temp + rename.
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(value.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process backend with an optional total byte quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes pushing the total size past `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let size = others + key.len() + value.len();
            if size > limit {
                return Err(Error::StorageCapacity { size, limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub version: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            version: SCHEMA_VERSION.to_string(),
            tasks: Vec::new(),
            settings: Settings::default(),
            last_updated: None,
        }
    }
}

/// Tunables for the gateway.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Largest serialized blob accepted, in bytes.
    pub max_bytes: usize,
    /// Completed tasks older than this are the first to go on a capacity failure.
    pub prune_after_days: i64,
    /// Where the emergency export is written before completed tasks are dropped.
    pub export_dir: Option<PathBuf>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            max_bytes: DEFAULT_MAX_BYTES,
            prune_after_days: 30,
            export_dir: None,
        }
    }
}

/// Owner of the serialized blob.
pub struct Gateway {
    backend: Box<dyn KeyValueStore>,
    options: StorageOptions,
    // Held across load/modify/save so multi-entity updates commit together.
    lock: Mutex<()>,
}

impl Gateway {
    pub fn new(backend: impl KeyValueStore + 'static, options: StorageOptions) -> Self {
        Gateway {
            backend: Box::new(backend),
            options,
            lock: Mutex::new(()),
        }
    }

    /// Gateway over a fresh in-memory store; nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), StorageOptions::default())
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Check that the backend accepts writes at all.
    pub fn probe(&self) -> Result<()> {
        self.backend
            .set(PROBE_KEY, "ok")
            .and_then(|_| self.backend.remove(PROBE_KEY))
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    /// Read the current state, initialising or migrating the blob if needed.
    pub fn load(&self) -> Result<AppState> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Persist `state`, running the capacity recovery cascade if it does not fit.
    pub fn save(&self, state: &mut AppState) -> Result<()> {
        let _guard = self.lock.lock();
        self.save_unlocked(state)
    }

    /// Load, apply `f`, and save as one step. Nothing is written when `f` fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut AppState) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut state = self.load_unlocked()?;
        let value = f(&mut state)?;
        self.save_unlocked(&mut state)?;
        Ok(value)
    }

    /// Load, and on a corrupt blob let `confirm` decide whether to wipe it.
    pub fn load_or_reset(&self, confirm: impl FnOnce(&Error) -> bool) -> Result<AppState> {
        match self.load() {
            Err(e @ Error::Parse(_)) => {
                if confirm(&e) {
                    warn!(error = %e, "stored data is corrupt, resetting");
                    self.reset()
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    /// Replace whatever is stored with an empty default blob.
    pub fn reset(&self) -> Result<AppState> {
        let _guard = self.lock.lock();
        let mut state = AppState::default();
        self.write(&mut state)?;
        info!("storage reset to defaults");
        Ok(state)
    }

    /// Merge tasks from a JSON export, skipping ids that already exist.
    ///
    /// Accepts either a bare array of tasks or a full blob with a `tasks` field.
    /// Returns the number of tasks added.
    pub fn import_tasks(&self, text: &str) -> Result<usize> {
        let incoming = parse_import(text)?;
        let added = self.update(|state| {
            let mut known: HashSet<String> = state.tasks.iter().map(|t| t.id.clone()).collect();
            let mut added = 0;
            for task in incoming {
                if known.insert(task.id.clone()) {
                    state.tasks.push(task);
                    added += 1;
                } else {
                    debug!(id = %task.id, "import skipped existing task");
                }
            }
            Ok(added)
        })?;
        info!(added, "imported tasks");
        Ok(added)
    }

    /// Copy the current blob into `dir` under a timestamped name.
    pub fn backup(&self, dir: &Path) -> Result<PathBuf> {
        let state = self.load()?;
        fs::create_dir_all(dir)?;
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("{timestamp}_{STORAGE_KEY}.json"));
        fs::write(&path, serde_json::to_string_pretty(&state)?)?;
        Ok(path)
    }

    fn load_unlocked(&self) -> Result<AppState> {
        let Some(text) = self.backend.get(STORAGE_KEY)? else {
            debug!("no stored data, initialising");
            let mut state = AppState::default();
            self.save_unlocked(&mut state)?;
            return Ok(state);
        };
        let mut state: AppState = serde_json::from_str(&text)?;
        if state.version != SCHEMA_VERSION {
            migrate(&mut state);
            self.save_unlocked(&mut state)?;
        }
        Ok(state)
    }

    fn save_unlocked(&self, state: &mut AppState) -> Result<()> {
        match self.write(state) {
            Err(Error::StorageCapacity { size, limit }) => {
                warn!(size, limit, "storage capacity exceeded, recovering");
                self.recover(state)
            }
            other => other,
        }
    }

    fn write(&self, state: &mut AppState) -> Result<()> {
        state.last_updated = Some(Utc::now());
        let text = serde_json::to_string_pretty(state)?;
        if text.len() > self.options.max_bytes {
            return Err(Error::StorageCapacity {
                size: text.len(),
                limit: self.options.max_bytes,
            });
        }
        self.backend.set(STORAGE_KEY, &text)?;
        debug!(bytes = text.len(), tasks = state.tasks.len(), "state saved");
        Ok(())
    }

    fn recover(&self, state: &mut AppState) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(self.options.prune_after_days);
        let pruned = prune_completed_before(&mut state.tasks, cutoff);
        if pruned > 0 {
            info!(pruned, "dropped old completed tasks to free space");
            return self.write(state);
        }

        if let Some(dir) = &self.options.export_dir {
            match export_tasks(&state.tasks, dir, Local::now().date_naive()) {
                Ok(path) => info!(path = %path.display(), "emergency export written"),
                Err(e) => warn!(error = %e, "emergency export failed"),
            }
        }
        let before = state.tasks.len();
        state.tasks.retain(|t| t.status == Status::Active);
        warn!(dropped = before - state.tasks.len(), "dropped all completed tasks to free space");
        self.write(state)
    }
}

/// Bring an older blob up to the current version. No structural changes yet.
fn migrate(state: &mut AppState) {
    info!(from = %state.version, to = SCHEMA_VERSION, "migrating stored data");
    state.version = SCHEMA_VERSION.to_string();
}

/// Drop completed tasks whose completion predates `cutoff`; returns how many went.
pub fn prune_completed_before(tasks: &mut Vec<Task>, cutoff: DateTime<Utc>) -> usize {
    let before = tasks.len();
    tasks.retain(|t| !(t.is_completed() && t.completed_at.is_some_and(|c| c < cutoff)));
    before - tasks.len()
}

/// File name used for exports taken on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("tasks-export-{}.json", format_date(date))
}

/// Write `tasks` as pretty JSON to `dir/tasks-export-<date>.json`.
pub fn export_tasks(tasks: &[Task], dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(date));
    fs::write(&path, serde_json::to_string_pretty(tasks)?)?;
    Ok(path)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Tasks(Vec<Task>),
    Blob { tasks: Vec<Task> },
}

/// Parse and validate an import document.
///
/// Imported records get the same cleaning as newly created ones: titles and
/// descriptions are re-sanitised (already escaped text stays as it was),
/// tags are normalised and recurrence intervals must be at least 1.
pub fn parse_import(text: &str) -> Result<Vec<Task>> {
    let doc: ImportDocument = serde_json::from_str(text)
        .map_err(|e| Error::Parse(format!("invalid import file: {e}")))?;
    let mut tasks = match doc {
        ImportDocument::Tasks(t) | ImportDocument::Blob { tasks: t } => t,
    };
    for task in &mut tasks {
        if task.id.trim().is_empty() {
            return Err(Error::Parse("imported task without id".into()));
        }
        task.title = clean_title(&unescape_html(&task.title))
            .map_err(|_| Error::Parse(format!("imported task {} has no title", task.id)))?;
        task.description = sanitize(&unescape_html(&task.description));
        task.tags = normalise_tags(&task.tags);
        if let Some(rule) = &task.recurring {
            rule.validate()
                .map_err(|e| Error::Parse(format!("imported task {}: {e}", task.id)))?;
        }
        // Keep completed_at consistent with status.
        match task.status {
            Status::Completed if task.completed_at.is_none() => {
                task.completed_at = Some(task.updated_at)
            }
            Status::Active => task.completed_at = None,
            Status::Completed => {}
        }
    }
    Ok(tasks)
}
