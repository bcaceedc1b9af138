//! Scheduler, backend and group configuration structures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::group::{validate_group_name, GroupConfig};
use crate::core::scheduler::SchedulerLimits;
use crate::core::task::DEFAULT_TIMEOUT_SECS;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "SCHEDULER_CONFIG";
/// Environment variable overriding `poll_interval_ms`.
pub const POLL_INTERVAL_ENV: &str = "SCHEDULER_POLL_INTERVAL_MS";

/// Task store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// JSON lines journal under a directory.
    File {
        /// Directory holding the journal.
        path: PathBuf,
    },
}

/// Log store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogBackendConfig {
    /// In-memory logs.
    #[default]
    InMemory,
    /// One file per task under a directory.
    File {
        /// Root directory for log files.
        path: PathBuf,
    },
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Longest the scheduling loop sleeps without a wake event.
    pub poll_interval_ms: u64,
    /// Timeout applied to tasks that do not set one.
    pub default_timeout_secs: u64,
    /// Largest timeout a task may ask for.
    pub max_timeout_secs: u64,
    /// Largest delay or retry delay a task may ask for.
    pub max_delay_secs: u64,
    /// Largest retry budget a task may ask for.
    pub max_retries_limit: u32,
    /// Listing page size when the client does not pick one.
    pub default_page_size: usize,
    /// Upper bound on listing page size.
    pub max_page_size: usize,
    /// Task store backend.
    pub store: StoreBackendConfig,
    /// Log store backend.
    pub logs: LogBackendConfig,
    /// Groups seeded at startup.
    pub groups: BTreeMap<String, GroupConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: 86_400,
            max_delay_secs: 604_800,
            max_retries_limit: 25,
            default_page_size: 30,
            max_page_size: 100,
            store: StoreBackendConfig::default(),
            logs: LogBackendConfig::default(),
            groups: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Validate limits and every seeded group.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.default_timeout_secs == 0 || self.max_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".into());
        }
        if self.default_timeout_secs > self.max_timeout_secs {
            return Err("default_timeout_secs must not exceed max_timeout_secs".into());
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err("page sizes must be greater than 0".into());
        }
        if self.default_page_size > self.max_page_size {
            return Err("default_page_size must not exceed max_page_size".into());
        }
        for (name, group) in &self.groups {
            validate_group_name(name).map_err(|e| e.to_string())?;
            group
                .validate()
                .map_err(|e| format!("group `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&input)
    }

    /// Load configuration from the environment, honouring a `.env` file.
    ///
    /// Starts from the file named by `SCHEDULER_CONFIG` (or defaults) and
    /// applies `SCHEDULER_POLL_INTERVAL_MS` on top.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            cfg.poll_interval_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("{POLL_INTERVAL_ENV}: {e}"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Scheduler limits derived from this configuration.
    pub const fn limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            default_timeout_secs: self.default_timeout_secs,
            max_timeout_secs: self.max_timeout_secs,
            max_delay_secs: self.max_delay_secs,
            max_retries: self.max_retries_limit,
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}
