//! Runtime configuration.
//!
//! [`RuntimeConfig`] collects the knobs the embedding application wires the
//! runtime with: where team inboxes and the shared board live on disk, how
//! the idle phase paces itself, and when context compaction kicks in.
//! Everything is defaulted; a TOML file overrides only what it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compaction::CompactionConfig;
use crate::error::{AgentError, Result};

/// Idle-phase pacing for the teammate loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Number of poll ticks per idle phase.
    pub ticks: u32,
    /// Sleep between ticks, in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        // 30 ticks of 2 seconds: roughly one minute of quiet polling
        // before the outer loop re-checks.
        Self {
            ticks: 30,
            tick_interval_ms: 2_000,
        }
    }
}

impl IdleConfig {
    /// The tick sleep as a [`Duration`].
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory that per-teammate inbox files live under
    /// (`<teams_dir>/<team>/<name>.jsonl`).
    pub teams_dir: PathBuf,
    /// Directory holding the shared task board database.
    pub board_dir: PathBuf,
    /// Idle-phase pacing.
    pub idle: IdleConfig,
    /// Context compaction thresholds.
    pub compaction: CompactionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            teams_dir: PathBuf::from(".cohort/teams"),
            board_dir: PathBuf::from(".cohort/board"),
            idle: IdleConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned with a
    /// warning, so a fresh checkout runs without any setup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = toml::from_str(&content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

        info!(path = %path.display(), "runtime config loaded");
        Ok(config)
    }

    /// Save the configuration as pretty-printed TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| AgentError::Config {
            reason: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(path, content).map_err(|e| AgentError::Config {
            reason: format!("failed to write {}: {e}", path.display()),
        })?;

        info!(path = %path.display(), "runtime config saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
