//! Engine configuration.
//!
//! The source of the retry, backoff and failure-threshold defaults is the
//! execution engine's operating envelope; they are deliberately explicit
//! configuration rather than inline constants so tests and operators can
//! adjust them.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default system-wide cap on concurrently running tasks.
pub const DEFAULT_MAX_CONCURRENT_AGENTS: usize = 4;
/// Default retry attempts after the initial execution.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default exponential backoff base.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);
/// Default error-rate threshold above which new batch starts pause.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.3;
/// Default interval of the metrics monitoring loop.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(500);
/// Default cooldown after which a paused engine resumes dispatch.
pub const DEFAULT_PAUSE_COOLDOWN: Duration = Duration::from_secs(2);

/// Runtime configuration for the parallel execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// System-wide cap on concurrently running tasks, regardless of
    /// batch size.
    pub max_concurrent_agents: usize,
    /// Retry attempts per task after the initial execution.
    pub max_retries: u32,
    /// Exponential backoff base; attempt `n` waits `retry_base * 2^n`.
    #[serde(with = "duration_secs")]
    pub retry_base: Duration,
    /// Error rate (0-1) above which new batch starts are paused.
    pub failure_threshold: f64,
    /// Interval at which the monitoring loop recomputes metrics.
    #[serde(with = "duration_secs")]
    pub monitor_interval: Duration,
    /// How long a paused engine waits before resuming dispatch.
    #[serde(with = "duration_secs")]
    pub pause_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: DEFAULT_MAX_CONCURRENT_AGENTS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            pause_cooldown: DEFAULT_PAUSE_COOLDOWN,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Backoff delay before retry attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Serialize durations as fractional seconds so config files read
/// naturally (`retry_base = 1.0`).
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
