use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::stats::MIN_SAMPLE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub robot: RobotConfig,
}

/// Environment lookup, swappable in tests.
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Config {
    /// Layered load: defaults, then the global and project files (or only
    /// the explicit file when one is given), then `SPLITLAB_*` variables.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let global = dirs::config_dir().map(|dir| dir.join("splitlab/config.toml"));
        Self::load_layers(
            explicit_path,
            root,
            global.as_deref(),
            &|key| std::env::var(key).ok(),
        )
    }

    fn load_layers(
        explicit_path: Option<&Path>,
        root: &Path,
        global_path: Option<&Path>,
        env: EnvLookup<'_>,
    ) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env("SPLITLAB_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?.ok_or_else(|| {
                SplitError::MissingConfig(format!("config file {} not found", path.display()))
            })?;
            config.merge_patch(patch);
        } else {
            if let Some(global) = global_path {
                if let Some(patch) = Self::load_patch(global)? {
                    config.merge_patch(patch);
                }
            }
            if let Some(project) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides(env)?;
        config.validate()?;

        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| SplitError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| SplitError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.tracking {
            self.tracking.merge(patch);
        }
        if let Some(patch) = patch.lifecycle {
            self.lifecycle.merge(patch);
        }
        if let Some(patch) = patch.robot {
            self.robot.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self, env: EnvLookup<'_>) -> Result<()> {
        if let Some(value) = env_bool(env, "SPLITLAB_ROBOT_METADATA") {
            self.robot.include_metadata = value;
        }
        if let Some(value) = env("SPLITLAB_DB_FILE") {
            self.storage.db_file = value;
        }
        if let Some(value) = env_u64(env, "SPLITLAB_BUSY_TIMEOUT_MS")? {
            self.storage.busy_timeout_ms = value;
        }
        if let Some(value) = env_u32(env, "SPLITLAB_MAX_WRITE_ATTEMPTS")? {
            self.tracking.max_write_attempts = value;
        }
        if let Some(value) = env_u64(env, "SPLITLAB_RETRY_BACKOFF_MS")? {
            self.tracking.retry_backoff_ms = value;
        }
        if let Some(value) = env_u32(env, "SPLITLAB_PARALLELISM")? {
            self.lifecycle.parallelism = value;
        }
        if let Some(value) = env_u64(env, "SPLITLAB_MIN_SAMPLE")? {
            self.lifecycle.min_sample = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.db_file.trim().is_empty() {
            return Err(SplitError::Config("storage.db_file cannot be empty".to_string()));
        }
        if self.tracking.max_write_attempts == 0 {
            return Err(SplitError::Config(
                "tracking.max_write_attempts must be at least 1".to_string(),
            ));
        }
        if self.lifecycle.min_sample == 0 {
            return Err(SplitError::Config(
                "lifecycle.min_sample must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file name, relative to the data root
    #[serde(default)]
    pub db_file: String,
    #[serde(default)]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "splitlab.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.db_file {
            self.db_file = value;
        }
        if let Some(value) = patch.busy_timeout_ms {
            self.busy_timeout_ms = value;
        }
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(&self.db_file)
    }

    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Total attempts per event write, including the first
    #[serde(default)]
    pub max_write_attempts: u32,
    /// Linear backoff step between attempts
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl TrackingConfig {
    fn merge(&mut self, patch: TrackingPatch) {
        if let Some(value) = patch.max_write_attempts {
            self.max_write_attempts = value;
        }
        if let Some(value) = patch.retry_backoff_ms {
            self.retry_backoff_ms = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Worker threads per run; 0 uses one per core
    #[serde(default)]
    pub parallelism: u32,
    #[serde(default)]
    pub min_sample: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            min_sample: MIN_SAMPLE,
        }
    }
}

impl LifecycleConfig {
    fn merge(&mut self, patch: LifecyclePatch) {
        if let Some(value) = patch.parallelism {
            self.parallelism = value;
        }
        if let Some(value) = patch.min_sample {
            self.min_sample = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub format: String,
    /// Attach `version` and `generated_at` to robot payloads
    #[serde(default)]
    pub include_metadata: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            include_metadata: true,
        }
    }
}

impl RobotConfig {
    fn merge(&mut self, patch: RobotPatch) {
        if let Some(value) = patch.format {
            self.format = value;
        }
        if let Some(value) = patch.include_metadata {
            self.include_metadata = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub tracking: Option<TrackingPatch>,
    pub lifecycle: Option<LifecyclePatch>,
    pub robot: Option<RobotPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub db_file: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TrackingPatch {
    pub max_write_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LifecyclePatch {
    pub parallelism: Option<u32>,
    pub min_sample: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RobotPatch {
    pub format: Option<String>,
    pub include_metadata: Option<bool>,
}

fn env_bool(env: EnvLookup<'_>, key: &str) -> Option<bool> {
    env(key).map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u32(env: EnvLookup<'_>, key: &str) -> Result<Option<u32>> {
    match env(key) {
        Some(value) => value.trim().parse::<u32>().map(Some).map_err(|err| {
            SplitError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}

fn env_u64(env: EnvLookup<'_>, key: &str) -> Result<Option<u64>> {
    match env(key) {
        Some(value) => value.trim().parse::<u64>().map(Some).map_err(|err| {
            SplitError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}
