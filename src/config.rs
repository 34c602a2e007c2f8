//! Configuration for the `tt` binary.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments (and their environment variables)
//! 2. TOML config file (`~/.config/tasktrack/config.toml`)
//! 3. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::storage::StorageOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    storage: StorageFileConfig,
    log: LogFileConfig,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
    max_bytes: Option<usize>,
    prune_after_days: Option<i64>,
    export_dir: Option<PathBuf>,
}

/// `[log]` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the task store and backups.
    pub data_dir: PathBuf,
    /// Capacity and recovery settings for the gateway.
    pub storage: StorageOptions,
    /// Default tracing filter; `RUST_LOG` still wins.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("tasktrack"))
            .unwrap_or_else(|| PathBuf::from(".tasktrack"));
        Config {
            storage: StorageOptions {
                export_dir: Some(data_dir.join("exports")),
                ..StorageOptions::default()
            },
            data_dir,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration by merging CLI args and a TOML file.
    pub fn load(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(args.config.as_deref())?;
        Ok(Self::resolve(args, &file))
    }

    /// Parse a TOML document and merge it under `args`.
    pub fn from_toml(args: &GlobalArgs, text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(Self::resolve(args, &file))
    }

    /// CLI args over compiled defaults, for when the config file is unusable.
    pub fn resolve_defaults(args: &GlobalArgs) -> Self {
        Self::resolve(args, &ConfigFile::default())
    }

    fn resolve(args: &GlobalArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| file.storage.data_dir.clone())
            .unwrap_or(defaults.data_dir);
        let export_dir = file
            .storage
            .export_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("exports"));

        Config {
            storage: StorageOptions {
                max_bytes: file.storage.max_bytes.unwrap_or(defaults.storage.max_bytes),
                prune_after_days: file
                    .storage
                    .prune_after_days
                    .unwrap_or(defaults.storage.prune_after_days),
                export_dir: Some(export_dir),
            },
            data_dir,
            log_level: args
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup")
    }
}

fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = match explicit_path {
        Some(p) => {
            let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
                path: p.to_path_buf(),
                source: e,
            })?;
            return Ok(toml::from_str(&contents)?);
        }
        None => {
            let Some(config_dir) = dirs::config_dir() else {
                return Ok(ConfigFile::default());
            };
            config_dir.join("tasktrack").join("config.toml")
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_MAX_BYTES;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml(&GlobalArgs::default(), "").unwrap();
        assert_eq!(config.storage.max_bytes, DEFAULT_MAX_BYTES);
        assert_eq!(config.storage.prune_after_days, 30);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.storage.export_dir, Some(config.data_dir.join("exports")));
    }

    #[test]
    fn test_file_values() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/tt-data"
max_bytes = 1024
prune_after_days = 7
export_dir = "/tmp/tt-exports"

[log]
level = "debug"
"#;
        let config = Config::from_toml(&GlobalArgs::default(), toml_str).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tt-data"));
        assert_eq!(config.storage.max_bytes, 1024);
        assert_eq!(config.storage.prune_after_days, 7);
        assert_eq!(config.storage.export_dir, Some(PathBuf::from("/tmp/tt-exports")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backup_dir(), PathBuf::from("/tmp/tt-data/backup"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = GlobalArgs {
            data_dir: Some(PathBuf::from("/srv/tasks")),
            log_level: Some("trace".into()),
            ..Default::default()
        };
        let config = Config::from_toml(&args, "[storage]\ndata_dir = \"/ignored\"\n[log]\nlevel = \"info\"\n").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/tasks"));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_toml() {
        let res = Config::from_toml(&GlobalArgs::default(), "[storage]\nmax_bytes = \"big\"\n");
        assert!(matches!(res, Err(ConfigError::ParseToml(_))));
    }

    #[test]
    fn test_cli_args_survive_config_error() {
        let args = GlobalArgs {
            data_dir: Some(PathBuf::from("/tmp/tt-flagged")),
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        assert!(Config::load(&args).is_err());

        let config = Config::resolve_defaults(&args);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tt-flagged"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.export_dir, Some(PathBuf::from("/tmp/tt-flagged/exports")));
        assert_eq!(config.storage.max_bytes, DEFAULT_MAX_BYTES);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let res = load_config_file(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(res, Err(ConfigError::ReadFile { .. })));
    }
}
