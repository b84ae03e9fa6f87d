//! Optional config from .fanjoinrc or ~/.fanjoinrc (JSON). Env overrides file.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = ".fanjoinrc";
pub const DEFAULT_MIN_FORK_SIZE: usize = 10_000;
/// Tasks per available CPU when no task count is configured.
pub const DEFAULT_TASK_RATIO: usize = 2;
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "fanjoin-worker";

/// Tuning for the convenience entry points in [`crate::parallel`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelConfig {
    /// Explicit worker count; `None` means CPUs * [`DEFAULT_TASK_RATIO`].
    pub task_count: Option<usize>,
    /// Inputs shorter than this are visited serially on the caller's thread.
    pub min_fork_size: usize,
    /// Derive the task count as `len / batch_size` instead.
    pub batch_size: Option<usize>,
    /// Threads in the default pool; `None` means one per CPU.
    pub pool_threads: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            task_count: None,
            min_fork_size: DEFAULT_MIN_FORK_SIZE,
            batch_size: None,
            pool_threads: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl ParallelConfig {
    pub fn with_task_count(mut self, task_count: usize) -> Self {
        self.task_count = Some(task_count);
        self
    }

    pub fn with_min_fork_size(mut self, min_fork_size: usize) -> Self {
        self.min_fork_size = min_fork_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn pool_threads(&self) -> usize {
        self.pool_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Number of tasks to use for an input of `len` elements.
    pub fn task_count_for(&self, len: usize) -> usize {
        match (self.task_count, self.batch_size) {
            (Some(n), _) => n,
            (None, Some(batch)) => crate::parallel::calculate_task_count(len, batch),
            (None, None) => crate::parallel::default_task_count(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_count == Some(0) {
            return Err(Error::config("taskCount", "must be at least 1"));
        }
        if self.batch_size == Some(0) {
            return Err(Error::config("batchSize", "must be at least 1"));
        }
        if self.pool_threads == Some(0) {
            return Err(Error::config("poolThreads", "must be at least 1"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("threadNamePrefix", "must not be empty"));
        }
        Ok(())
    }

    /// Apply `FANJOIN_TASKS` and `FANJOIN_MIN_FORK_SIZE` if set.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(n) = env_usize("FANJOIN_TASKS", "taskCount")? {
            self.task_count = Some(n);
        }
        if let Some(n) = env_usize("FANJOIN_MIN_FORK_SIZE", "minForkSize")? {
            self.min_fork_size = n;
        }
        Ok(())
    }
}

fn env_usize(var: &str, key: &str) -> Result<Option<usize>> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::config(key, format!("{} is not a number: {:?}", var, v))),
        _ => Ok(None),
    }
}

/// Read one config file. Unknown keys are ignored.
pub fn read_config(path: &Path) -> Result<ParallelConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg: ParallelConfig = serde_json::from_str(&s).map_err(|e| Error::Config {
        message: format!("{}: {}", path.display(), e),
        key: None,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config from .fanjoinrc in `dir`, then ~/.fanjoinrc, then env.
/// The first file found wins; no file means defaults.
pub fn load_config(dir: &Path) -> Result<ParallelConfig> {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    let mut cfg = match candidates.iter().find(|p| p.is_file()) {
        Some(path) => read_config(path)?,
        None => ParallelConfig::default(),
    };
    cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}
