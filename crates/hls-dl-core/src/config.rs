//! YAML configuration: XDG default path, write-default-if-missing,
//! generalized to an explicit `-config <path>` override, with field set
//! and defaults matching the original engine's `task.Config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadConfig {
    #[serde(default = "default_conn_timeout")]
    pub conn_timeout: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Max transport retries; `-1` means retry forever.
    #[serde(default = "default_retry_count")]
    pub retry_count: i64,
    #[serde(default = "default_thread_size")]
    pub thread_size: usize,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_conn_timeout() -> u64 {
    10
}
fn default_chunk_size() -> u64 {
    1_048_576
}
fn default_retry_count() -> i64 {
    10
}
fn default_thread_size() -> usize {
    10
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            conn_timeout: default_conn_timeout(),
            chunk_size: default_chunk_size(),
            retry_count: default_retry_count(),
            thread_size: default_thread_size(),
            headers: HashMap::new(),
        }
    }
}

/// Logging sink configuration; out of scope for the core engine itself,
/// consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub max: u32,
    #[serde(default)]
    pub age: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Metrics HTTP endpoint port; empty disables it. Starting the actual
    /// endpoint is out of scope here (see SPEC_FULL.md non-goals).
    #[serde(default)]
    pub metric: String,
    #[serde(default = "default_debug")]
    pub debug: bool,
}

fn default_debug() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            log: LogConfig::default(),
            metric: String::new(),
            debug: default_debug(),
        }
    }
}

impl Config {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hls-dl")?;
    Ok(xdg_dirs.place_config_file("config.yaml")?)
}

/// Loads configuration from an explicit `-config <path>` file. No
/// environment overrides are applied once a config file is given.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    Config::from_yaml(&data).with_context(|| format!("parsing config file {}", path.display()))
}

/// Loads configuration from the XDG default path, writing a default file
/// if none exists yet. Applies the `THREAD_SIZE` environment override,
/// matching the original CLI's behavior when no `-config` flag is given.
pub fn load_or_init() -> Result<Config> {
    let path = default_config_path()?;
    let mut cfg = if !path.exists() {
        let default_cfg = Config::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, default_cfg.to_yaml()?)?;
        tracing::info!(path = %path.display(), "created default config");
        default_cfg
    } else {
        load_from_path(&path)?
    };

    if let Ok(thread_size) = std::env::var("THREAD_SIZE") {
        if let Ok(n) = thread_size.parse::<usize>() {
            cfg.download.thread_size = n;
        }
    }
    Ok(cfg)
}
