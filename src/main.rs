//! # tt - personal task tracker
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a task due next Friday
//! tt add "Write quarterly report" --priority high --due friday --tag work
//!
//! # Add a subtask
//! tt add "Collect figures" --parent "Write quarterly report"
//!
//! # List active tasks sorted by due date, grouped by bucket
//! tt list --status active --sort due --order asc --group due
//!
//! # Complete a task (recurring tasks spawn their next occurrence)
//! tt toggle 3f9c2a1b
//!
//! # Dashboard
//! tt stats
//! ```
//!
//! Data is stored in the platform data directory (`~/.local/share/tasktrack`
//! on Linux) unless `--data-dir` or `TASKTRACK_DATA_DIR` says otherwise.
//! Filter and sort choices made with `tt list` are remembered between runs.

use clap::Parser;
use tracing::{debug, warn};

use tasktrack::cli::Cli;
use tasktrack::cmd::*;
use tasktrack::config::Config;
use tasktrack::storage::{FileStore, Gateway, MemoryStore};
use tasktrack::store::TaskStore;
use tasktrack::Error;

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.global) {
        Ok(config) => config,
        Err(e) if cli.global.config.is_some() => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Warning: {e}; ignoring config file");
            Config::resolve_defaults(&cli.global)
        }
    };

    init_logging(&config.log_level);
    debug!(data_dir = %config.data_dir.display(), "starting");

    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return;
    }

    let gateway = open_gateway(&config);
    let reset_corrupt = cli.global.reset_corrupt;
    if let Err(e) = gateway.load_or_reset(|_| reset_corrupt) {
        eprintln!("Failed to load tasks: {e}");
        if matches!(e, Error::Parse(_)) {
            eprintln!("Run again with --reset-corrupt to start over with an empty store.");
        }
        std::process::exit(1);
    }
    let store = TaskStore::new(gateway);

    let result = match cli.command {
        Commands::Add { title, desc, priority, tags, due, parent, every, interval } =>
            cmd_add(&store, title, desc, priority, tags, due, parent, every, interval),

        Commands::Subtask { parent, title, desc, priority, tags, due } =>
            cmd_add(&store, title, desc, priority, tags, due, Some(parent), None, 1),

        Commands::List {
            status, priority, search, from, to, overdue, tags, sort, order, group, limit,
        } => cmd_list(
            &store, status, priority, search, from, to, overdue, tags, sort, order, group, limit,
        ),

        Commands::View { id } => cmd_view(&store, id),

        Commands::Update {
            id, title, desc, priority, status, due, clear_due, tags, clear_tags,
            every, interval, no_repeat,
        } => cmd_update(
            &store, id, title, desc, priority, status, due, clear_due, tags, clear_tags,
            every, interval, no_repeat,
        ),

        Commands::Toggle { ids } => cmd_toggle(&store, ids),

        Commands::Delete { ids } => cmd_delete(&store, ids),

        Commands::Move { id, position } => cmd_move(&store, id, position),

        Commands::ClearCompleted => cmd_clear_completed(&store),

        Commands::Stats => cmd_stats(&store),

        Commands::Export { output } => cmd_export(&store, output),

        Commands::Import { input } => cmd_import(&store, input),

        Commands::Backup => cmd_backup(&store, &config),

        Commands::Completions { .. } => unreachable!("completions handled above"),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Route tracing output to stderr. `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Open the on-disk store, falling back to an in-memory one when the data
/// directory cannot be written. Changes are then lost on exit.
fn open_gateway(config: &Config) -> Gateway {
    let gateway = Gateway::new(FileStore::new(&config.data_dir), config.storage.clone());
    match gateway.probe() {
        Ok(()) => gateway,
        Err(e) => {
            warn!(error = %e, "storage unavailable, changes will not be saved");
            eprintln!("Warning: {e}; changes will not be saved");
            Gateway::new(MemoryStore::new(), config.storage.clone())
        }
    }
}
