//! Unified Error Model
use crate::audit::TransitionRecord;
use crate::checkpoint::CheckpointHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry construction errors, detected before any run starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("REGISTRY/DUPLICATE_INDEX: stage index {index} already registered")]
    DuplicateIndex { index: usize },

    #[error("REGISTRY/GAP: expected stage index {expected}, found {found}")]
    GapInSequence { expected: usize, found: usize },
}

/// Error raised from inside a stage's action or rollback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl StageError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Why a run left the forward path. Every variant triggers rollback of the
/// stages committed before `stage_index`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    #[error("STAGE/PRECONDITION: stage {stage_index} precondition failed")]
    PreconditionFailed {
        stage_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },

    #[error("STAGE/ACTION: stage {stage_index} action failed: {reason}")]
    ActionFailed { stage_index: usize, reason: String },

    #[error("STAGE/POSTCONDITION: stage {stage_index} postcondition failed")]
    PostconditionFailed {
        stage_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },

    #[error("STAGE/CANCELLED: run cancelled before stage {stage_index}")]
    Cancelled { stage_index: usize },
}

impl StageFailure {
    pub fn stage_index(&self) -> usize {
        match self {
            Self::PreconditionFailed { stage_index, .. }
            | Self::ActionFailed { stage_index, .. }
            | Self::PostconditionFailed { stage_index, .. }
            | Self::Cancelled { stage_index } => *stage_index,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("CHECKPOINT/UNKNOWN: no live checkpoint for handle {0}")]
    UnknownHandle(CheckpointHandle),
}

/// Unrecoverable run errors. The caller must intervene manually.
#[derive(Error, Debug)]
pub enum RunError {
    /// A compensation step failed; the session may be left inconsistent.
    #[error("RUN/ROLLBACK_FAILED: rollback of stage {stage_index} failed: {reason} (after {cause})")]
    RollbackFailed {
        stage_index: usize,
        reason: String,
        /// The forward failure that started the rollback
        cause: StageFailure,
        transitions: Vec<TransitionRecord>,
    },

    #[error("RUN/CHECKPOINT: {0}")]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/PARSE: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("CONFIG/INVALID: {0}")]
    Invalid(String),
}

/// Errors building an orchestrator from a registry and config
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
