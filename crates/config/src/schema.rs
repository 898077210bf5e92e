//! Config schema: skills root, mirrors, logging.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default seconds between background mirror syncs.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    pub skills: SkillsConfig,
    pub mirrors: MirrorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Skills root. Falls back to the platform data directory when unset.
    pub dir: Option<PathBuf>,
}

impl SkillsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::loader::default_skills_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorsConfig {
    /// Git URLs added to the mirror list on startup if missing.
    pub urls: Vec<String>,
    pub sync_interval_secs: u64,
    /// Sync every enabled mirror once before the periodic loop starts.
    pub sync_on_start: bool,
}

impl Default for MirrorsConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sync_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
