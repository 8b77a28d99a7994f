use std::str::FromStr;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::frequency::Frequency;
use crate::path_filter::PathFilter;
use crate::worker_pool::WorkerPoolConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub state_path: PathBuf,
    pub queue_name: String,
    pub frequency: Frequency,
    pub max_task_queue_size: usize,
    pub nibble_batch_size: usize,
    pub path_inclusions: Vec<String>,
    pub path_exclusions: Vec<String>,
    pub max_workers: usize,
    pub visibility_timeout_secs: u64,
    pub min_take_wait_ms: u64,
    pub max_take_wait_ms: u64,
    pub saturation_backoff_ms: u64,
    pub status_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    state_path: PathBuf,
    queue_name: String,
    frequency: String,
    max_task_queue_size: usize,
    nibble_batch_size: usize,
    #[serde(default)]
    path_inclusions: Vec<String>,
    #[serde(default)]
    path_exclusions: Vec<String>,
    max_workers: usize,
    visibility_timeout_secs: u64,
    min_take_wait_ms: u64,
    max_take_wait_ms: u64,
    saturation_backoff_ms: u64,
    status_interval_secs: u64,
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            let raw = fs::read_to_string(path)?;
            Config::from_raw(toml::from_str::<RawConfig>(&raw)?)?
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                let raw = fs::read_to_string(&default_path)?;
                Config::from_raw(toml::from_str::<RawConfig>(&raw)?)?
            } else {
                Self::default_from_env()?
            }
        };

        if let Ok(v) = env::var("STATE_PATH") {
            cfg.state_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("QUEUE_NAME") {
            cfg.queue_name = v;
        }
        if let Ok(v) = env::var("FREQUENCY") {
            cfg.frequency = Frequency::from_str(&v).context("parsing FREQUENCY")?;
        }
        maybe_env_usize(&mut cfg.max_task_queue_size, "MAX_TASK_QUEUE_SIZE");
        maybe_env_usize(&mut cfg.nibble_batch_size, "NIBBLE_BATCH_SIZE");
        if let Ok(v) = env::var("PATH_INCLUSIONS") {
            cfg.path_inclusions = split_patterns(&v);
        }
        if let Ok(v) = env::var("PATH_EXCLUSIONS") {
            cfg.path_exclusions = split_patterns(&v);
        }
        maybe_env_usize(&mut cfg.max_workers, "MAX_WORKERS");
        maybe_env_u64(&mut cfg.visibility_timeout_secs, "VISIBILITY_TIMEOUT_SECS");
        maybe_env_u64(&mut cfg.min_take_wait_ms, "MIN_TAKE_WAIT_MS");
        maybe_env_u64(&mut cfg.max_take_wait_ms, "MAX_TAKE_WAIT_MS");
        maybe_env_u64(&mut cfg.saturation_backoff_ms, "SATURATION_BACKOFF_MS");
        maybe_env_u64(&mut cfg.status_interval_secs, "STATUS_INTERVAL_SECS");

        validate_required(&cfg)?;
        Ok(cfg)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let frequency = Frequency::from_str(&raw.frequency).context("parsing frequency")?;
        Ok(Self {
            state_path: raw.state_path,
            queue_name: raw.queue_name,
            frequency,
            max_task_queue_size: raw.max_task_queue_size,
            nibble_batch_size: raw.nibble_batch_size,
            path_inclusions: raw.path_inclusions,
            path_exclusions: raw.path_exclusions,
            max_workers: raw.max_workers,
            visibility_timeout_secs: raw.visibility_timeout_secs,
            min_take_wait_ms: raw.min_take_wait_ms,
            max_take_wait_ms: raw.max_take_wait_ms,
            saturation_backoff_ms: raw.saturation_backoff_ms,
            status_interval_secs: raw.status_interval_secs,
        })
    }

    fn default_from_env() -> Result<Self> {
        let state_path = default_state_dir().join("producer-state.json");
        let frequency_raw = env::var("FREQUENCY").unwrap_or_else(|_| "1d".into());
        Ok(Self {
            state_path,
            queue_name: env::var("QUEUE_NAME").unwrap_or_else(|_| "maintenance".into()),
            frequency: Frequency::from_str(&frequency_raw).context("parsing FREQUENCY")?,
            max_task_queue_size: env_usize("MAX_TASK_QUEUE_SIZE", 1000),
            nibble_batch_size: env_usize("NIBBLE_BATCH_SIZE", 1000),
            path_inclusions: Vec::new(),
            path_exclusions: Vec::new(),
            max_workers: env_usize("MAX_WORKERS", 5),
            visibility_timeout_secs: env_u64("VISIBILITY_TIMEOUT_SECS", 300),
            min_take_wait_ms: env_u64("MIN_TAKE_WAIT_MS", 1000),
            max_take_wait_ms: env_u64("MAX_TAKE_WAIT_MS", 30_000),
            saturation_backoff_ms: env_u64("SATURATION_BACKOFF_MS", 1000),
            status_interval_secs: env_u64("STATUS_INTERVAL_SECS", 300),
        })
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.path_inclusions, &self.path_exclusions)
            .context("parsing path filter patterns")
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_workers: self.max_workers,
            min_take_wait: Duration::from_millis(self.min_take_wait_ms),
            max_take_wait: Duration::from_millis(self.max_take_wait_ms),
            saturation_backoff: Duration::from_millis(self.saturation_backoff_ms),
            status_interval: Duration::from_secs(self.status_interval_secs),
        }
    }
}

fn default_config_path() -> PathBuf {
    default_state_dir().join("config.toml")
}

fn default_state_dir() -> PathBuf {
    ProjectDirs::from("org", "taskmill", "taskmill")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".taskmill"))
}

fn validate_required(cfg: &Config) -> Result<()> {
    if cfg.queue_name.trim().is_empty() {
        anyhow::bail!("QUEUE_NAME is required (set via env or config)");
    }
    if cfg.max_workers == 0 {
        anyhow::bail!("MAX_WORKERS must be at least 1");
    }
    if cfg.max_task_queue_size == 0 {
        anyhow::bail!("MAX_TASK_QUEUE_SIZE must be at least 1");
    }
    if cfg.nibble_batch_size == 0 {
        anyhow::bail!("NIBBLE_BATCH_SIZE must be at least 1");
    }
    // malformed filter patterns are a startup error, not a skipped filter
    cfg.path_filter()?;
    Ok(())
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn maybe_env_usize(val: &mut usize, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<usize>() {
            *val = n;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
