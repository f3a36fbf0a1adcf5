use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pipeline::{Stage, DEFAULT_HISTORY_DEPTH};

/// Main configuration structure for shopflow.
///
/// Layered load: built-in defaults <- `shopflow.toml` <- `SHOPFLOW_*`
/// environment variables (double underscore separates nesting, e.g.
/// `SHOPFLOW_SYNC__REMOTE_DIR`).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShopflowConfig {
    /// Watched/target stages for the VIN monitor
    pub pipeline: PipelineConfig,
    /// Undo/redo history settings
    pub history: HistoryConfig,
    /// Remote-store batch sync settings
    pub sync: SyncConfig,
    /// Fire-and-forget backup dispatch
    pub backup: BackupConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Session state file and lock
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stage the VIN monitor re-evaluates after every mutation
    pub watched_stage: Stage,
    /// Stage fully-arrived VIN groups are promoted to
    pub target_stage: Stage,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watched_stage: Stage::Pending,
            target_stage: Stage::Call,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum retained undo snapshots; the oldest is dropped beyond this
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root directory of the file-backed remote store
    pub remote_dir: String,
    /// Write pacing against the remote store's connection budget
    pub writes_per_second: u32,
    /// Burst capacity for the write limiter
    pub burst_capacity: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_dir: ".shopflow/remote".to_string(),
            writes_per_second: 5,
            burst_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    /// Trigger an external backup command after mutating actions
    pub enabled: bool,
    /// Program to spawn (not awaited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the session state (stages + history) is persisted between runs
    pub state_file: String,
    /// Advisory lock enforcing the single-active-session assumption
    pub lock_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_file: ".shopflow/session.json".to_string(),
            lock_file: ".shopflow/session.lock".to_string(),
        }
    }
}

impl ShopflowConfig {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("shopflow").required(false))
            .add_source(Environment::with_prefix("SHOPFLOW").separator("__"))
            .build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Write a starter `shopflow.toml` with the built-in defaults.
    pub fn write_starter(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        let body = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_pipeline() {
        let config = ShopflowConfig::default();
        assert_eq!(config.pipeline.watched_stage, Stage::Pending);
        assert_eq!(config.pipeline.target_stage, Stage::Call);
        assert_eq!(config.history.max_depth, DEFAULT_HISTORY_DEPTH);
        assert!(!config.backup.enabled);
    }

    #[test]
    fn test_starter_config_round_trips_through_toml() {
        let body = toml::to_string_pretty(&ShopflowConfig::default()).unwrap();
        let restored: ShopflowConfig = toml::from_str(&body).unwrap();
        assert_eq!(restored.sync.remote_dir, ".shopflow/remote");
        assert_eq!(restored.session.state_file, ".shopflow/session.json");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let restored: ShopflowConfig = toml::from_str("[history]\nmax_depth = 7\n").unwrap();
        assert_eq!(restored.history.max_depth, 7);
        assert_eq!(restored.pipeline.target_stage, Stage::Call);
    }
}
