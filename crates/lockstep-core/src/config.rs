//! Orchestrator configuration
//!
//! Timeouts, retry budget and checkpoint retention. Loadable from YAML;
//! every field has a default so partial documents are accepted.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long checkpoints are kept during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointRetention {
    /// Keep every checkpoint until the run commits
    #[default]
    FullHistory,
    /// Release checkpoint i once stage i+1 commits. Rolling back past a
    /// released checkpoint relies on the stage's own rollback output.
    SingleStep,
}

/// Default per-stage action and rollback timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-stage action timeout. `None` disables it.
    pub stage_timeout_ms: Option<u64>,

    /// Per-stage rollback timeout. `None` disables it.
    pub rollback_timeout_ms: Option<u64>,

    /// Attempts per action, including the first (minimum 1)
    pub max_attempts: u32,

    pub checkpoint_retention: CheckpointRetention,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            rollback_timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            max_attempts: 1,
            checkpoint_retention: CheckpointRetention::FullHistory,
        }
    }
}

impl OrchestratorConfig {
    /// Load config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.stage_timeout_ms == Some(0) || self.rollback_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sub-millisecond remainders round up, so only `Duration::ZERO`
    /// yields a zero timeout (rejected by `validate`)
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_ms = Some(millis_ceil(timeout));
        self
    }

    pub fn with_rollback_timeout(mut self, timeout: Duration) -> Self {
        self.rollback_timeout_ms = Some(millis_ceil(timeout));
        self
    }

    /// Run without action or rollback timeouts
    pub fn without_timeouts(mut self) -> Self {
        self.stage_timeout_ms = None;
        self.rollback_timeout_ms = None;
        self
    }

    /// Clamp both timeouts to `ceiling`; an unset timeout becomes `ceiling`
    pub fn capped(mut self, ceiling: Duration) -> Self {
        let ceiling = millis_ceil(ceiling);
        let cap = |current: Option<u64>| Some(current.map_or(ceiling, |ms| ms.min(ceiling)));
        self.stage_timeout_ms = cap(self.stage_timeout_ms);
        self.rollback_timeout_ms = cap(self.rollback_timeout_ms);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retention(mut self, retention: CheckpointRetention) -> Self {
        self.checkpoint_retention = retention;
        self
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    pub fn rollback_timeout(&self) -> Option<Duration> {
        self.rollback_timeout_ms.map(Duration::from_millis)
    }
}

fn millis_ceil(duration: Duration) -> u64 {
    let mut ms = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }
    u64::try_from(ms).unwrap_or(u64::MAX)
}
