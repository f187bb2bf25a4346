//! Archiver configuration.
//!
//! A TOML file with `GRAVA_*` environment overrides on top. Every field has
//! a default, so an empty file and no file at all are both valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::SessionConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where temporary clones live.
    pub scratch_dir: PathBuf,
    /// Where rooted repositories live.
    pub rooted_dir: PathBuf,
    /// Where in-flight rooted transactions stage.
    pub staging_dir: PathBuf,
    /// Where repository records live (filesystem store only).
    pub store_dir: PathBuf,
    /// Root lock lease TTL in milliseconds.
    pub lock_ttl_ms: u64,
    /// Archive worker threads.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("/var/lib/grava/scratch"),
            rooted_dir: PathBuf::from("/var/lib/grava/rooted"),
            staging_dir: PathBuf::from("/var/lib/grava/staging"),
            store_dir: PathBuf::from("/var/lib/grava/repositories"),
            lock_ttl_ms: 10_000,
            workers: 4,
        }
    }
}

impl Config {
    pub fn lock_session(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_millis(self.lock_ttl_ms),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load a config file, then apply environment overrides. A missing file is
/// the default config.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut config = if path.exists() {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Like [`load`], but fall back to defaults (with a warning) instead of
/// failing on a broken file.
pub fn load_or_default(path: &Path) -> Config {
    match load(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("config load failed, using defaults: {err}");
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            config
        }
    }
}

pub fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .ok_or_else(|| write_err(std::io::Error::other("config path has no parent")))?;
    fs::create_dir_all(dir).map_err(write_err)?;

    let contents = toml::to_string_pretty(config)
        .map_err(|e| write_err(std::io::Error::other(e.to_string())))?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    fs::write(temp.path(), contents.as_bytes()).map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

/// Override plumbing, parameterized over the variable source so it can be
/// exercised without touching the process environment.
fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    let path = |name: &str| var(name).filter(|s| !s.trim().is_empty()).map(PathBuf::from);

    if let Some(dir) = path("GRAVA_SCRATCH_DIR") {
        config.scratch_dir = dir;
    }
    if let Some(dir) = path("GRAVA_ROOTED_DIR") {
        config.rooted_dir = dir;
    }
    if let Some(dir) = path("GRAVA_STAGING_DIR") {
        config.staging_dir = dir;
    }
    if let Some(dir) = path("GRAVA_STORE_DIR") {
        config.store_dir = dir;
    }
    if let Some(raw) = var("GRAVA_LOCK_TTL_MS") {
        match raw.trim().parse() {
            Ok(ttl) => config.lock_ttl_ms = ttl,
            Err(err) => tracing::warn!("invalid GRAVA_LOCK_TTL_MS, ignoring: {err}"),
        }
    }
    if let Some(raw) = var("GRAVA_WORKERS") {
        match raw.trim().parse() {
            Ok(workers) => config.workers = workers,
            Err(err) => tracing::warn!("invalid GRAVA_WORKERS, ignoring: {err}"),
        }
    }
}
