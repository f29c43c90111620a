//! Checkpoint Manager: snapshots of session state taken before each stage
use crate::error::CheckpointError;
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle to a live checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointHandle(u64);

impl fmt::Display for CheckpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cp#{}", self.0)
    }
}

/// Immutable deep copy of the state, tagged with the stage it precedes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage_index: usize,
    pub state: SessionState,
    pub digest: String,
    pub taken_at: DateTime<Utc>,
}

/// Owns the checkpoint chain of a single run.
///
/// Restoring is pure: it hands back a copy of the captured state and leaves
/// the checkpoint live, so restoring the same handle twice yields equal
/// states. External resources are undone by the stages' own rollback.
#[derive(Debug, Default)]
pub struct CheckpointManager {
    next_id: u64,
    live: BTreeMap<CheckpointHandle, Checkpoint>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `state` before stage `stage_index` runs
    pub fn snapshot(&mut self, stage_index: usize, state: &SessionState) -> CheckpointHandle {
        let handle = CheckpointHandle(self.next_id);
        self.next_id += 1;

        let checkpoint = Checkpoint {
            stage_index,
            state: state.clone(),
            digest: state.digest(),
            taken_at: Utc::now(),
        };
        tracing::debug!(
            %handle,
            stage_index,
            digest = %checkpoint.digest,
            "checkpoint taken"
        );
        self.live.insert(handle, checkpoint);
        handle
    }

    /// Return exactly the state captured under `handle`
    pub fn restore(&self, handle: CheckpointHandle) -> Result<SessionState, CheckpointError> {
        self.live
            .get(&handle)
            .map(|cp| cp.state.clone())
            .ok_or(CheckpointError::UnknownHandle(handle))
    }

    /// Discard a checkpoint that is no longer needed for rollback
    pub fn release(&mut self, handle: CheckpointHandle) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = self
            .live
            .remove(&handle)
            .ok_or(CheckpointError::UnknownHandle(handle))?;
        tracing::debug!(%handle, stage_index = checkpoint.stage_index, "checkpoint released");
        Ok(checkpoint)
    }

    /// Release every live checkpoint, returning how many were dropped
    pub fn release_all(&mut self) -> usize {
        let count = self.live.len();
        self.live.clear();
        count
    }

    pub fn get(&self, handle: CheckpointHandle) -> Option<&Checkpoint> {
        self.live.get(&handle)
    }

    pub fn is_live(&self, handle: CheckpointHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
