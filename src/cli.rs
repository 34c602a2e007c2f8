use std::path::PathBuf;

use clap::{Args, Parser};

use crate::cmd::Commands;

/// Personal task tracker backed by a local JSON store.
/// Storage defaults to the platform data directory or a path passed via --data-dir.
#[derive(Parser)]
#[command(name = "tt", version, about = "Personal task tracker")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Directory holding the task store.
    #[arg(long, global = true, env = "TASKTRACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to config file (default: `~/.config/tasktrack/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "TASKTRACK_LOG")]
    pub log_level: Option<String>,

    /// Wipe and reinitialise the store if its contents are corrupt.
    #[arg(long, global = true)]
    pub reset_corrupt: bool,
}
