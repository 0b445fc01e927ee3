//! fleetflow configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via --config or FLEETFLOW_CONFIG)
//! 3. Environment variables

use chrono::NaiveDate;
use fleetflow_core::{Clock, FixedClock, SystemClock};
use fleetflow_storage::{CompactionPolicy, StorageConfig as StoreConfig};
use fleetflow_wal::FsyncPolicy as JournalFsync;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Compaction configuration.
    pub compaction: CompactionConfig,
    /// Clock configuration.
    pub clock: ClockConfig,
}

impl Config {
    /// Loads configuration from `path` (if any), then applies environment
    /// variable overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Applies overrides looked up by environment variable name.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.storage.apply_overrides(&lookup)?;
        self.compaction.apply_overrides(&lookup)?;
        self.clock.apply_overrides(&lookup)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_journal_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "storage.max_journal_size_mb must be at least 1".to_string(),
            ));
        }
        if let FsyncPolicy::EveryN(0) = self.storage.fsync_policy {
            return Err(ConfigError::ValidationError(
                "storage.fsync_policy every_n needs a count of at least 1".to_string(),
            ));
        }
        if self.compaction.enabled && self.compaction.commits_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "compaction.commits_threshold must be at least 1 when compaction is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the storage layer configuration.
    pub fn storage_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(&self.storage.data_dir);
        config.journal = config
            .journal
            .with_max_size(self.storage.max_journal_size())
            .with_fsync_policy(self.storage.fsync_policy.into());
        config.compaction = if self.compaction.enabled {
            CompactionPolicy::EveryNCommits(self.compaction.commits_threshold)
        } else {
            CompactionPolicy::Never
        };
        config
    }

    /// Returns the clock the engine should use.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self.clock.today {
            Some(date) => Arc::new(FixedClock::on(date)),
            None => Arc::new(SystemClock),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
    /// Journal size in megabytes that triggers compaction.
    pub max_journal_size_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_policy: FsyncPolicy::EveryWrite,
            max_journal_size_mb: 64,
        }
    }
}

impl StorageConfig {
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("FLEETFLOW_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup("FLEETFLOW_FSYNC_POLICY") {
            self.fsync_policy = policy.parse().map_err(ConfigError::ValidationError)?;
        }
        Ok(())
    }

    /// Returns the journal size limit in bytes.
    pub fn max_journal_size(&self) -> u64 {
        self.max_journal_size_mb * 1024 * 1024
    }
}

/// Fsync policy for journal writes.
///
/// Written as `every_write`, `never` or `every_n:<count>` in YAML and in
/// FLEETFLOW_FSYNC_POLICY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FsyncPolicy {
    /// Fsync after every commit (safest, slowest).
    EveryWrite,
    /// Fsync after N commits.
    EveryN(u32),
    /// Never fsync, rely on OS (fastest, least safe).
    Never,
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "every_write" | "everywrite" => Ok(FsyncPolicy::EveryWrite),
            "never" => Ok(FsyncPolicy::Never),
            other => match other.strip_prefix("every_n:") {
                Some(n) => n
                    .parse()
                    .map(FsyncPolicy::EveryN)
                    .map_err(|_| format!("invalid fsync count '{}'", n)),
                None => Err(format!(
                    "unknown fsync policy '{}' (expected every_write, never or every_n:<count>)",
                    s
                )),
            },
        }
    }
}

impl TryFrom<String> for FsyncPolicy {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FsyncPolicy> for String {
    fn from(policy: FsyncPolicy) -> Self {
        match policy {
            FsyncPolicy::EveryWrite => "every_write".to_string(),
            FsyncPolicy::EveryN(n) => format!("every_n:{}", n),
            FsyncPolicy::Never => "never".to_string(),
        }
    }
}

impl From<FsyncPolicy> for JournalFsync {
    fn from(policy: FsyncPolicy) -> Self {
        match policy {
            FsyncPolicy::EveryWrite => JournalFsync::EveryWrite,
            FsyncPolicy::EveryN(n) => JournalFsync::EveryN(n),
            FsyncPolicy::Never => JournalFsync::Never,
        }
    }
}

/// Compaction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Enable automatic compaction.
    pub enabled: bool,
    /// Compact after this many commits.
    pub commits_threshold: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commits_threshold: 1000,
        }
    }
}

impl CompactionConfig {
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(enabled) = lookup("FLEETFLOW_COMPACT_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Some(commits) = lookup("FLEETFLOW_COMPACT_COMMITS") {
            self.commits_threshold = commits.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FLEETFLOW_COMPACT_COMMITS must be a number (got '{}')",
                    commits
                ))
            })?;
        }
        Ok(())
    }
}

/// Clock configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Fixed date used for license checks and timestamps. Unset means the
    /// system clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<NaiveDate>,
}

impl ClockConfig {
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(today) = lookup("FLEETFLOW_TODAY") {
            let date = today.trim().parse().map_err(|e| {
                ConfigError::ValidationError(format!("FLEETFLOW_TODAY '{}': {}", today, e))
            })?;
            self.today = Some(date);
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
